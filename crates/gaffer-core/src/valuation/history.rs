// Exponentially time-weighted rolling features from match history.
//
// Rows are aged from the most recent match visible at the cutoff (age 0)
// backwards, and each feature is averaged with weight exp(-decay * age).

use serde::{Deserialize, Serialize};

use crate::config::PositionParams;
use crate::model::{Cutoff, MatchPerformance, Position};

// ---------------------------------------------------------------------------
// Rolling features
// ---------------------------------------------------------------------------

/// Time-weighted per-match averages for one player as of a cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingFeatures {
    pub minutes: f64,
    pub points: f64,
    /// Saves (GK), influence (DEF/MID) or threat (FWD).
    pub position_stat: f64,
    /// ICT index per million of price.
    pub economy: f64,
    /// Unweighted minutes total across the window, for the reliability bonus.
    pub cumulative_minutes: f64,
    pub appearances: usize,
}

impl RollingFeatures {
    pub fn is_empty(&self) -> bool {
        self.appearances == 0
    }
}

/// Replace NaN and infinities with 0 so one bad row cannot poison a pass.
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// The stat each position is judged on.
pub fn position_stat(row: &MatchPerformance, position: Position) -> f64 {
    let raw = match position {
        Position::Gk => row.saves,
        Position::Def | Position::Mid => row.influence,
        Position::Fwd => row.threat,
    };
    finite_or_zero(raw)
}

/// ICT index per million of price at the match (prices are in tenths of a
/// million). Zero when the price is unknown.
pub fn economy(row: &MatchPerformance) -> f64 {
    if row.price == 0 {
        return 0.0;
    }
    finite_or_zero(row.ict_index) / (f64::from(row.price) / 10.0)
}

/// Weighted average of `values`, ordered oldest first, where the last
/// element has age 0 and weight 1.
///
/// Returns 0.0 for an empty slice.
pub fn exponential_average(values: &[f64], decay: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len();
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, v) in values.iter().enumerate() {
        let age = (n - 1 - i) as f64;
        let weight = (-decay * age).exp();
        numerator += finite_or_zero(*v) * weight;
        denominator += weight;
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Rows visible at `cutoff`, in chronological order (season, round, then
/// fixture id).
pub fn rows_until<'a>(rows: &'a [MatchPerformance], cutoff: &Cutoff) -> Vec<&'a MatchPerformance> {
    let mut visible: Vec<&MatchPerformance> = rows.iter().filter(|r| cutoff.admits(r)).collect();
    visible.sort_by(|a, b| {
        a.season
            .cmp(&b.season)
            .then(a.round.cmp(&b.round))
            .then(a.fixture_id.cmp(&b.fixture_id))
    });
    visible
}

/// Compute rolling features for one player.
///
/// `rows` may be unsorted and may extend past the cutoff; only rows admitted
/// by `cutoff` contribute. A player without visible rows gets all-zero
/// features.
pub fn aggregate(
    rows: &[MatchPerformance],
    position: Position,
    cutoff: &Cutoff,
    params: &PositionParams,
) -> RollingFeatures {
    let visible = rows_until(rows, cutoff);
    if visible.is_empty() {
        return RollingFeatures::default();
    }

    let minutes: Vec<f64> = visible.iter().map(|r| finite_or_zero(r.minutes)).collect();
    let points: Vec<f64> = visible.iter().map(|r| finite_or_zero(r.points)).collect();
    let stats: Vec<f64> = visible.iter().map(|r| position_stat(r, position)).collect();
    let econ: Vec<f64> = visible.iter().map(|r| economy(r)).collect();

    RollingFeatures {
        minutes: exponential_average(&minutes, params.decay),
        points: exponential_average(&points, params.decay),
        position_stat: exponential_average(&stats, params.decay),
        economy: exponential_average(&econ, params.decay),
        cumulative_minutes: minutes.iter().map(|m| m.max(0.0)).sum(),
        appearances: visible.len(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
