// Engine configuration loading and validation (engine.toml).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::Position;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything the engine needs beyond the data snapshot itself.
///
/// Every section falls back to its default when absent from the file, so a
/// partial engine.toml only has to name the values it changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub squad: SquadRules,
    pub projection: ProjectionConfig,
    pub fixtures: FixtureConfig,
    pub positions: PositionTable,
    pub solver: SolverConfig,
    pub backtest: BacktestConfig,
    pub calibration: CalibrationConfig,
}

impl EngineConfig {
    pub fn position(&self, pos: Position) -> &PositionParams {
        self.positions.get(pos)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text).map_err(|e| ConfigError::ParseError {
            path: origin.to_path_buf(),
            source: e,
        })?;
        validate(&config)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Squad-level constraints shared by every solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquadRules {
    /// Total budget in price minor units (1000 = 100.0m).
    pub budget: u32,
    pub max_per_club: usize,
}

impl Default for SquadRules {
    fn default() -> Self {
        SquadRules {
            budget: 1000,
            max_per_club: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Number of gameweeks projected after the cutoff.
    pub horizon: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        ProjectionConfig { horizon: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Goals-per-match scale that maps a rate sum onto the 0-1 potential.
    pub scale_k: f64,
    /// Per-venue goal rate assumed for clubs without matches at that venue.
    pub default_goal_rate: f64,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        FixtureConfig {
            scale_k: 4.0,
            default_goal_rate: 1.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Ceiling on budget-repair swaps before the squad is declared infeasible.
    pub max_repair_iterations: usize,
    /// How many of the worst value-per-cost players are tried before the
    /// most-expensive fallback.
    pub repair_candidates: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_repair_iterations: 200,
            repair_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub iterations: usize,
    /// Replacement proposals are drawn from this many top players per position.
    pub top_k: usize,
    pub seed: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            iterations: 50_000,
            top_k: 50,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Step of the blend-weight grid over [0, 1].
    pub blend_step: f64,
    pub decay_grid: Vec<f64>,
    /// Reliability taus searched, in minutes.
    pub tau_grid: Vec<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            blend_step: 0.05,
            decay_grid: vec![0.1, 0.3, 0.5, 1.0],
            tau_grid: vec![450.0, 900.0, 1800.0],
        }
    }
}

// ---------------------------------------------------------------------------
// Per-position parameter table
// ---------------------------------------------------------------------------

/// Weights over the four rolling features. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub minutes: f64,
    pub points: f64,
    pub stat: f64,
    pub economy: f64,
}

impl FeatureWeights {
    pub fn sum(&self) -> f64 {
        self.minutes + self.points + self.stat + self.economy
    }
}

/// Scoring parameters for one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionParams {
    /// Exponential decay rate per match of age.
    pub decay: f64,
    /// Minutes scale of the reliability bonus `1 - exp(-minutes / tau)`.
    pub reliability_tau: f64,
    pub weights: FeatureWeights,
    /// Share of Smart Value in the projection blend; the rest is fixture potential.
    pub blend_smart_value: f64,
    pub points_intercept: f64,
    pub points_slope: f64,
    /// Cheapest price a player at this position plausibly costs.
    pub min_price: u32,
}

impl PositionParams {
    pub fn default_for(pos: Position) -> Self {
        match pos {
            Position::Gk => PositionParams {
                decay: 0.1,
                reliability_tau: 900.0,
                weights: FeatureWeights {
                    minutes: 0.3,
                    points: 0.3,
                    stat: 0.2,
                    economy: 0.2,
                },
                blend_smart_value: 0.80,
                points_intercept: 0.0,
                points_slope: 7.0,
                min_price: 40,
            },
            Position::Def => PositionParams {
                decay: 0.1,
                reliability_tau: 900.0,
                weights: FeatureWeights {
                    minutes: 0.4,
                    points: 0.25,
                    stat: 0.2,
                    economy: 0.15,
                },
                blend_smart_value: 0.85,
                points_intercept: 0.0,
                points_slope: 7.0,
                min_price: 40,
            },
            Position::Mid => PositionParams {
                decay: 0.3,
                reliability_tau: 450.0,
                weights: FeatureWeights {
                    minutes: 0.2,
                    points: 0.4,
                    stat: 0.25,
                    economy: 0.15,
                },
                blend_smart_value: 0.85,
                points_intercept: 0.0,
                points_slope: 7.0,
                min_price: 45,
            },
            Position::Fwd => PositionParams {
                decay: 0.3,
                reliability_tau: 450.0,
                weights: FeatureWeights {
                    minutes: 0.2,
                    points: 0.4,
                    stat: 0.25,
                    economy: 0.15,
                },
                blend_smart_value: 0.85,
                points_intercept: 0.0,
                points_slope: 7.0,
                min_price: 45,
            },
        }
    }
}

/// `[positions.GK]` .. `[positions.FWD]` tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTable {
    #[serde(rename = "GK", default = "default_gk")]
    pub gk: PositionParams,
    #[serde(rename = "DEF", default = "default_def")]
    pub def: PositionParams,
    #[serde(rename = "MID", default = "default_mid")]
    pub mid: PositionParams,
    #[serde(rename = "FWD", default = "default_fwd")]
    pub fwd: PositionParams,
}

fn default_gk() -> PositionParams {
    PositionParams::default_for(Position::Gk)
}

fn default_def() -> PositionParams {
    PositionParams::default_for(Position::Def)
}

fn default_mid() -> PositionParams {
    PositionParams::default_for(Position::Mid)
}

fn default_fwd() -> PositionParams {
    PositionParams::default_for(Position::Fwd)
}

impl Default for PositionTable {
    fn default() -> Self {
        PositionTable {
            gk: default_gk(),
            def: default_def(),
            mid: default_mid(),
            fwd: default_fwd(),
        }
    }
}

impl PositionTable {
    pub fn get(&self, pos: Position) -> &PositionParams {
        match pos {
            Position::Gk => &self.gk,
            Position::Def => &self.def,
            Position::Mid => &self.mid,
            Position::Fwd => &self.fwd,
        }
    }

    pub fn get_mut(&mut self, pos: Position) -> &mut PositionParams {
        match pos {
            Position::Gk => &mut self.gk,
            Position::Def => &mut self.def,
            Position::Mid => &mut self.mid,
            Position::Fwd => &mut self.fwd,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

const CONFIG_FILE: &str = "engine.toml";

/// Load and validate `config/engine.toml` relative to `base_dir`.
///
/// This does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    EngineConfig::from_toml_str(&text, &path)
}

/// Ensure every file under `defaults/` has a counterpart in `config/`,
/// copying the missing ones. Returns the list of files copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&path, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {} to {}: {e}", path.display(), target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Load config relative to `base_dir`, copying defaults first.
pub fn load_config(base_dir: &Path) -> Result<EngineConfig, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.squad.budget == 0 {
        return Err(invalid("squad.budget", "must be greater than 0".into()));
    }
    if config.squad.max_per_club == 0 {
        return Err(invalid("squad.max_per_club", "must be greater than 0".into()));
    }
    if config.projection.horizon == 0 {
        return Err(invalid("projection.horizon", "must be greater than 0".into()));
    }

    let fx = &config.fixtures;
    if !(fx.scale_k.is_finite() && fx.scale_k > 0.0) {
        return Err(invalid("fixtures.scale_k", format!("must be > 0, got {}", fx.scale_k)));
    }
    if !(fx.default_goal_rate.is_finite() && fx.default_goal_rate > 0.0) {
        return Err(invalid(
            "fixtures.default_goal_rate",
            format!("must be > 0, got {}", fx.default_goal_rate),
        ));
    }

    for pos in Position::ALL {
        let p = config.position(pos);
        let prefix = format!("positions.{}", pos.display_str());

        if !(p.decay.is_finite() && p.decay >= 0.0) {
            return Err(invalid(&format!("{prefix}.decay"), format!("must be >= 0, got {}", p.decay)));
        }
        if !(p.reliability_tau.is_finite() && p.reliability_tau > 0.0) {
            return Err(invalid(
                &format!("{prefix}.reliability_tau"),
                format!("must be > 0, got {}", p.reliability_tau),
            ));
        }
        let w = &p.weights;
        let weight_fields: &[(&str, f64)] = &[
            ("minutes", w.minutes),
            ("points", w.points),
            ("stat", w.stat),
            ("economy", w.economy),
        ];
        for (name, val) in weight_fields {
            if !(val.is_finite() && *val >= 0.0) {
                return Err(invalid(
                    &format!("{prefix}.weights.{name}"),
                    format!("must be >= 0, got {val}"),
                ));
            }
        }
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(
                &format!("{prefix}.weights"),
                format!("must sum to 1.0, got {}", w.sum()),
            ));
        }
        if !(0.0..=1.0).contains(&p.blend_smart_value) {
            return Err(invalid(
                &format!("{prefix}.blend_smart_value"),
                format!("must be between 0.0 and 1.0 inclusive, got {}", p.blend_smart_value),
            ));
        }
        if !(p.points_intercept.is_finite() && p.points_slope.is_finite()) {
            return Err(invalid(
                &format!("{prefix}.points_slope"),
                "points mapping must be finite".into(),
            ));
        }
    }

    if config.backtest.top_k == 0 {
        return Err(invalid("backtest.top_k", "must be greater than 0".into()));
    }
    let step = config.calibration.blend_step;
    if !(step > 0.0 && step <= 1.0) {
        return Err(invalid(
            "calibration.blend_step",
            format!("must be in (0, 1], got {step}"),
        ));
    }

    Ok(())
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
