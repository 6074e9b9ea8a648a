// Input snapshot and CSV loaders (FPL column names).
//
// A snapshot is immutable for the duration of a scoring pass. Numeric fields
// are parsed leniently: an empty, unparseable or non-finite value becomes 0
// (or None for optional fields) instead of failing the whole file.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::model::{Cutoff, Fixture, MatchPerformance, PlayerId, PlayerRecord, Position};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Players, their match history and the fixture list, as of one load.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub players: Vec<PlayerRecord>,
    /// Per-player rows sorted by (season, round, fixture id).
    history: HashMap<PlayerId, Vec<MatchPerformance>>,
    pub fixtures: Vec<Fixture>,
}

impl Snapshot {
    pub fn new(players: Vec<PlayerRecord>, rows: Vec<MatchPerformance>, fixtures: Vec<Fixture>) -> Self {
        let mut history: HashMap<PlayerId, Vec<MatchPerformance>> = HashMap::new();
        for row in rows {
            history.entry(row.player_id).or_default().push(row);
        }
        for rows in history.values_mut() {
            rows.sort_by(|a, b| {
                a.season
                    .cmp(&b.season)
                    .then(a.round.cmp(&b.round))
                    .then(a.fixture_id.cmp(&b.fixture_id))
            });
        }
        Snapshot {
            players,
            history,
            fixtures,
        }
    }

    /// Load `players.csv`, `history.csv` and `fixtures.csv` from `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, SnapshotError> {
        let players = load_players(&dir.join("players.csv"))?;
        let rows = load_history(&dir.join("history.csv"))?;
        let fixtures = load_fixtures(&dir.join("fixtures.csv"))?;
        if players.is_empty() {
            return Err(SnapshotError::Validation("players CSV produced zero valid rows".into()));
        }
        info!(
            players = players.len(),
            history_rows = rows.len(),
            fixtures = fixtures.len(),
            "snapshot loaded"
        );
        Ok(Snapshot::new(players, rows, fixtures))
    }

    /// A player's rows, oldest first. Empty when the player has no history.
    pub fn history_for(&self, player: PlayerId) -> &[MatchPerformance] {
        self.history.get(&player).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.id == id)
    }

    /// The greatest non-empty season tag in the history, if any row has one.
    ///
    /// Tags are compared as strings, so "2425" follows "2324".
    pub fn latest_season(&self) -> Option<&str> {
        self.history
            .values()
            .flatten()
            .map(|r| r.season.as_str())
            .filter(|s| !s.is_empty())
            .max()
    }

    /// A cutoff at `round` in `season`, defaulting to the latest season tag.
    ///
    /// Untagged history yields an unrestricted cutoff.
    pub fn cutoff(&self, round: u32, season: Option<&str>) -> Cutoff {
        Cutoff::with_season(round, season.or_else(|| self.latest_season()))
    }

    /// Points actually scored in round `at.round` of `at`'s season, summed
    /// over a double gameweek.
    pub fn realized_points(&self, player: PlayerId, at: &Cutoff) -> f64 {
        self.history_for(player)
            .iter()
            .filter(|r| r.round == at.round && at.same_season(r))
            .map(|r| r.points)
            .filter(|p| p.is_finite())
            .sum()
    }

    /// Price at the latest match visible at `cutoff`, if recorded.
    pub fn price_at(&self, player: PlayerId, cutoff: &Cutoff) -> Option<u32> {
        self.history_for(player)
            .iter()
            .rev()
            .find(|r| cutoff.admits(r))
            .map(|r| r.price)
            .filter(|price| *price > 0)
    }
}

// ---------------------------------------------------------------------------
// Lenient field parsing
// ---------------------------------------------------------------------------

fn parse_f64(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn parse_opt_u32(raw: Option<&str>) -> Option<u32> {
    let v = raw.and_then(|s| s.trim().parse::<f64>().ok())?;
    if v.is_finite() && v >= 0.0 && v <= f64::from(u32::MAX) {
        Some(v.round() as u32)
    } else {
        None
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(parse_f64(raw.as_deref()))
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(parse_opt_u32(raw.as_deref()).unwrap_or(0))
}

fn lenient_opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(parse_opt_u32(raw.as_deref()))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(matches!(
        raw.as_deref().map(|s| s.trim().to_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    ))
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPlayer {
    id: PlayerId,
    #[serde(default, alias = "name")]
    web_name: String,
    #[serde(alias = "position")]
    element_type: String,
    team: u32,
    #[serde(alias = "price", deserialize_with = "lenient_u32")]
    now_cost: u32,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    chance_of_playing_next_round: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    #[serde(alias = "player_id")]
    element: PlayerId,
    fixture: u32,
    round: u32,
    #[serde(default)]
    season: String,
    #[serde(deserialize_with = "lenient_f64")]
    minutes: f64,
    #[serde(alias = "points", deserialize_with = "lenient_f64")]
    total_points: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    saves: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    influence: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    creativity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    threat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    ict_index: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    expected_goals_conceded: f64,
    #[serde(default, alias = "price", deserialize_with = "lenient_u32")]
    value: u32,
}

#[derive(Debug, Deserialize)]
struct RawFixture {
    id: u32,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    event: Option<u32>,
    #[serde(default)]
    kickoff_time: Option<String>,
    team_h: u32,
    team_a: u32,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    team_h_score: Option<u32>,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    team_a_score: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    finished: bool,
}

fn parse_kickoff(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

// ---------------------------------------------------------------------------
// Reader-based loaders (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerRecord>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayer>() {
        match result {
            Ok(raw) => {
                let Some(position) = Position::from_str_pos(&raw.element_type) else {
                    warn!("skipping player {}: unknown position '{}'", raw.id, raw.element_type);
                    continue;
                };
                players.push(PlayerRecord {
                    id: raw.id,
                    name: raw.web_name.trim().to_string(),
                    position,
                    club: raw.team,
                    price: raw.now_cost,
                    chance_of_playing: raw.chance_of_playing_next_round.map(|c| c.min(100) as u8),
                });
            }
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
            }
        }
    }
    Ok(players)
}

fn load_history_from_reader<R: Read>(rdr: R) -> Result<Vec<MatchPerformance>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawHistory>() {
        match result {
            Ok(raw) => rows.push(MatchPerformance {
                player_id: raw.element,
                fixture_id: raw.fixture,
                round: raw.round,
                season: raw.season.trim().to_string(),
                minutes: raw.minutes,
                points: raw.total_points,
                saves: raw.saves,
                influence: raw.influence,
                creativity: raw.creativity,
                threat: raw.threat,
                ict_index: raw.ict_index,
                expected_goals_conceded: raw.expected_goals_conceded,
                price: raw.value,
            }),
            Err(e) => {
                warn!("skipping malformed history row: {}", e);
            }
        }
    }
    Ok(rows)
}

fn load_fixtures_from_reader<R: Read>(rdr: R) -> Result<Vec<Fixture>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut fixtures = Vec::new();
    for result in reader.deserialize::<RawFixture>() {
        match result {
            Ok(raw) => {
                if raw.team_h == raw.team_a {
                    warn!("skipping fixture {}: club {} plays itself", raw.id, raw.team_h);
                    continue;
                }
                fixtures.push(Fixture {
                    id: raw.id,
                    round: raw.event,
                    kickoff: parse_kickoff(raw.kickoff_time.as_deref()),
                    home: raw.team_h,
                    away: raw.team_a,
                    home_score: raw.team_h_score,
                    away_score: raw.team_a_score,
                    finished: raw.finished,
                });
            }
            Err(e) => {
                warn!("skipping malformed fixture row: {}", e);
            }
        }
    }
    Ok(fixtures)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, SnapshotError> {
    std::fs::File::open(path).map_err(|e| SnapshotError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> SnapshotError + '_ {
    move |e| SnapshotError::Csv {
        path: path.display().to_string(),
        source: e,
    }
}

/// Load players from an FPL `elements`-style CSV.
pub fn load_players(path: &Path) -> Result<Vec<PlayerRecord>, SnapshotError> {
    load_players_from_reader(open(path)?).map_err(csv_error(path))
}

/// Load per-match history rows from an FPL `element-summary` history CSV.
pub fn load_history(path: &Path) -> Result<Vec<MatchPerformance>, SnapshotError> {
    load_history_from_reader(open(path)?).map_err(csv_error(path))
}

/// Load the fixture list from an FPL `fixtures` CSV.
pub fn load_fixtures(path: &Path) -> Result<Vec<Fixture>, SnapshotError> {
    load_fixtures_from_reader(open(path)?).map_err(csv_error(path))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
