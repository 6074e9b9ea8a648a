// Calibration of the per-position parameter table against past rounds.
//
// Every cutoff W in a range yields one sample per player with minutes and a
// fixture in W+1: the Smart Value and fixture potential as of W, and the
// points the player actually scored in W+1.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::smart_values_at;
use crate::fixtures::{fixture_potential, TeamForm};
use crate::model::{Cutoff, Position};
use crate::projection::{blend, FixtureSchedule};
use crate::snapshot::Snapshot;

/// Fewest pairs a correlation or fit is computed from.
pub const MIN_SAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("empty cutoff range {from}..={to}")]
    EmptyRange { from: u32, to: u32 },

    #[error("no calibration samples in cutoff range {from}..={to}")]
    NoSamples { from: u32, to: u32 },
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation of two equal-length series.
///
/// `None` for fewer than five pairs, mismatched lengths, non-finite input or
/// a series with zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < MIN_SAMPLES {
        return None;
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx <= f64::EPSILON || vy <= f64::EPSILON {
        return None;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Ordinary least squares `y = intercept + slope * x`.
///
/// `None` under the same conditions as [`pearson`].
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    pearson(x, y)?;
    let (mx, my) = (mean(x), mean(y));
    let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let var: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
    let slope = cov / var;
    Some((my - slope * mx, slope))
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub cutoff: u32,
    pub position: Position,
    pub smart_value: f64,
    /// Mean potential over the player's fixtures in the next round.
    pub potential: f64,
    /// Points scored in the next round, summed over a double gameweek.
    pub realized: f64,
}

/// Collect one sample per eligible player and cutoff in `from..=to`, within
/// `season` (the latest season tag when `None`).
///
/// Players with no minutes by the cutoff or no fixture in the next round
/// are skipped: they project zero regardless of the parameters.
pub fn collect_samples(
    snapshot: &Snapshot,
    from: u32,
    to: u32,
    season: Option<&str>,
    config: &EngineConfig,
) -> Vec<Sample> {
    let season = season.or_else(|| snapshot.latest_season());
    let schedule = FixtureSchedule::build(&snapshot.fixtures);
    let mut samples = Vec::new();
    for w in from..=to {
        let Some(next_round) = w.checked_add(1) else {
            break;
        };
        let cutoff = Cutoff::with_season(w, season);
        let next = Cutoff::with_season(next_round, season);
        let smart_values = smart_values_at(snapshot, &cutoff, config);
        let form = TeamForm::from_fixtures(&snapshot.fixtures, Some(w), &config.fixtures);
        let before = samples.len();

        for (player, smart) in snapshot.players.iter().zip(&smart_values) {
            if smart.features.cumulative_minutes <= 0.0 {
                continue;
            }
            let fixtures = schedule.fixtures_for(player.club, next_round);
            if fixtures.is_empty() {
                continue;
            }
            let potential = fixtures
                .iter()
                .map(|f| fixture_potential(&form, player.position, player.club, f.opponent, f.venue, &config.fixtures))
                .sum::<f64>()
                / fixtures.len() as f64;
            samples.push(Sample {
                cutoff: w,
                position: player.position,
                smart_value: smart.value,
                potential,
                realized: snapshot.realized_points(player.id, &next),
            });
        }
        debug!(cutoff = w, samples = samples.len() - before, "calibration samples collected");
    }
    samples
}

// ---------------------------------------------------------------------------
// Searches
// ---------------------------------------------------------------------------

/// Blend weights `0, step, 2*step, ..., 1`.
pub fn blend_grid(step: f64) -> Vec<f64> {
    if !(step > 0.0 && step <= 1.0) {
        return vec![0.0, 1.0];
    }
    let n = (1.0 / step).round() as usize;
    (0..=n).map(|i| (i as f64 * step).min(1.0)).collect()
}

/// The blend weight maximizing Pearson between blended score and realized
/// points, with its correlation. Earlier weights win ties.
pub fn best_blend_weight(samples: &[&Sample], grid: &[f64]) -> Option<(f64, f64)> {
    let realized: Vec<f64> = samples.iter().map(|s| s.realized).collect();
    let mut best: Option<(f64, f64)> = None;
    for &w in grid {
        let blended: Vec<f64> = samples.iter().map(|s| blend(s.smart_value, s.potential, w)).collect();
        if let Some(r) = pearson(&blended, &realized) {
            if best.map_or(true, |(_, top)| r > top) {
                best = Some((w, r));
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionCalibration {
    pub position: Position,
    pub samples: usize,
    pub decay: f64,
    pub reliability_tau: f64,
    /// Pearson of Smart Value against next-round points at the chosen decay/tau.
    pub smart_value_correlation: Option<f64>,
    pub blend_smart_value: f64,
    pub blend_correlation: Option<f64>,
    pub points_intercept: f64,
    pub points_slope: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub from: u32,
    pub to: u32,
    pub positions: Vec<PositionCalibration>,
}

impl CalibrationReport {
    /// A copy of `config` with the calibrated parameters written into the
    /// position table.
    pub fn apply(&self, config: &EngineConfig) -> EngineConfig {
        let mut calibrated = config.clone();
        for pc in &self.positions {
            let params = calibrated.positions.get_mut(pc.position);
            params.decay = pc.decay;
            params.reliability_tau = pc.reliability_tau;
            params.blend_smart_value = pc.blend_smart_value;
            params.points_intercept = pc.points_intercept;
            params.points_slope = pc.points_slope;
        }
        calibrated
    }
}

fn with_decay_tau(config: &EngineConfig, decay: f64, tau: f64) -> EngineConfig {
    let mut trial = config.clone();
    for pos in Position::ALL {
        let params = trial.positions.get_mut(pos);
        params.decay = decay;
        params.reliability_tau = tau;
    }
    trial
}

fn smart_value_fit(samples: &[Sample], position: Position) -> Option<f64> {
    let (sv, realized): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .filter(|s| s.position == position)
        .map(|s| (s.smart_value, s.realized))
        .unzip();
    pearson(&sv, &realized)
}

/// Calibrate every position over cutoffs `from..=to` of `season` (the
/// latest season tag when `None`).
///
/// 1. Decay/tau: for each grid pair, collect samples and keep, per position,
///    the pair whose Smart Values best correlate with next-round points.
/// 2. Blend weight: grid search on samples taken with the chosen decay/tau.
/// 3. Points mapping: least squares of realized points on the blended score.
///
/// A position with too few samples, or whose fit would map a better blend to
/// fewer points, keeps its configured values for that step.
pub fn calibrate(
    snapshot: &Snapshot,
    from: u32,
    to: u32,
    season: Option<&str>,
    config: &EngineConfig,
) -> Result<CalibrationReport, CalibrationError> {
    if from > to {
        return Err(CalibrationError::EmptyRange { from, to });
    }
    let cal = &config.calibration;

    // Step 1: decay / tau.
    let mut chosen: [(f64, f64, Option<f64>); 4] = Position::ALL.map(|pos| {
        let p = config.position(pos);
        (p.decay, p.reliability_tau, None)
    });
    for &decay in &cal.decay_grid {
        for &tau in &cal.tau_grid {
            let trial = with_decay_tau(config, decay, tau);
            let samples = collect_samples(snapshot, from, to, season, &trial);
            for pos in Position::ALL {
                let Some(r) = smart_value_fit(&samples, pos) else {
                    continue;
                };
                let slot = &mut chosen[pos.index()];
                if slot.2.map_or(true, |best| r > best) {
                    *slot = (decay, tau, Some(r));
                }
            }
        }
    }

    let mut tuned = config.clone();
    for pos in Position::ALL {
        let (decay, tau, _) = chosen[pos.index()];
        let params = tuned.positions.get_mut(pos);
        params.decay = decay;
        params.reliability_tau = tau;
    }

    // Steps 2 and 3 on samples from the tuned table.
    let samples = collect_samples(snapshot, from, to, season, &tuned);
    if samples.is_empty() {
        return Err(CalibrationError::NoSamples { from, to });
    }
    let grid = blend_grid(cal.blend_step);

    let positions = Position::ALL
        .iter()
        .map(|&pos| {
            let params = tuned.position(pos);
            let group: Vec<&Sample> = samples.iter().filter(|s| s.position == pos).collect();
            let (decay, reliability_tau, smart_value_correlation) = chosen[pos.index()];

            let (blend_smart_value, blend_correlation) = match best_blend_weight(&group, &grid) {
                Some((w, r)) => (w, Some(r)),
                None => {
                    warn!(position = %pos, samples = group.len(), "too few samples to fit blend weight");
                    (params.blend_smart_value, None)
                }
            };

            let blended: Vec<f64> = group
                .iter()
                .map(|s| blend(s.smart_value, s.potential, blend_smart_value))
                .collect();
            let realized: Vec<f64> = group.iter().map(|s| s.realized).collect();
            let (points_intercept, points_slope) = match least_squares(&blended, &realized) {
                Some((intercept, slope)) if slope > 0.0 => (intercept, slope),
                _ => (params.points_intercept, params.points_slope),
            };

            PositionCalibration {
                position: pos,
                samples: group.len(),
                decay,
                reliability_tau,
                smart_value_correlation,
                blend_smart_value,
                blend_correlation,
                points_intercept,
                points_slope,
            }
        })
        .collect();

    info!(from, to, samples = samples.len(), "calibration complete");
    Ok(CalibrationReport { from, to, positions })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
