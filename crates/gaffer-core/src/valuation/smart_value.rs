// Position-relative Smart Value with a small-sample reliability discount.
//
// Two passes over an immutable population: pass 1 collects per-position
// feature maxima, pass 2 normalizes, weights, discounts and rescales so the
// best player of each position sits at 100.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, FeatureWeights};
use crate::model::{PlayerId, Position};
use crate::valuation::history::{finite_or_zero, RollingFeatures};

/// Ceiling of the Smart Value scale.
pub const SMART_VALUE_MAX: f64 = 100.0;

// ---------------------------------------------------------------------------
// Pass 1: feature maxima
// ---------------------------------------------------------------------------

/// Largest value of each feature among one position's players, each floored
/// at 1 so normalization never divides by zero or inflates tiny samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMaxima {
    pub minutes: f64,
    pub points: f64,
    pub position_stat: f64,
    pub economy: f64,
}

impl Default for FeatureMaxima {
    fn default() -> Self {
        FeatureMaxima {
            minutes: 1.0,
            points: 1.0,
            position_stat: 1.0,
            economy: 1.0,
        }
    }
}

impl FeatureMaxima {
    fn absorb(&mut self, features: &RollingFeatures) {
        self.minutes = self.minutes.max(finite_or_zero(features.minutes));
        self.points = self.points.max(finite_or_zero(features.points));
        self.position_stat = self.position_stat.max(finite_or_zero(features.position_stat));
        self.economy = self.economy.max(finite_or_zero(features.economy));
    }
}

/// Feature maxima for all four positions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PopulationMaxima {
    by_position: [FeatureMaxima; 4],
}

impl PopulationMaxima {
    pub fn get(&self, position: Position) -> &FeatureMaxima {
        &self.by_position[position.index()]
    }
}

/// Pass 1: scan the population once and record per-position maxima.
pub fn compute_maxima(population: &[(Position, RollingFeatures)]) -> PopulationMaxima {
    let mut maxima = PopulationMaxima::default();
    for (position, features) in population {
        maxima.by_position[position.index()].absorb(features);
    }
    maxima
}

// ---------------------------------------------------------------------------
// Pass 2: normalization
// ---------------------------------------------------------------------------

fn unit(value: f64, max: f64) -> f64 {
    (finite_or_zero(value) / max).clamp(0.0, 1.0)
}

/// Weighted sum of the four normalized features, in [0, 1] when the weights
/// sum to 1.
pub fn raw_score(features: &RollingFeatures, maxima: &FeatureMaxima, weights: &FeatureWeights) -> f64 {
    weights.minutes * unit(features.minutes, maxima.minutes)
        + weights.points * unit(features.points, maxima.points)
        + weights.stat * unit(features.position_stat, maxima.position_stat)
        + weights.economy * unit(features.economy, maxima.economy)
}

/// `1 - e^(-minutes / tau)`: near 0 for a handful of cameo minutes, near 1
/// for a regular starter.
pub fn reliability_bonus(cumulative_minutes: f64, tau: f64) -> f64 {
    let minutes = finite_or_zero(cumulative_minutes).max(0.0);
    if tau <= 0.0 || !tau.is_finite() {
        return if minutes > 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - (-minutes / tau).exp()
}

/// A player's Smart Value and the features it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartValue {
    pub player_id: PlayerId,
    pub position: Position,
    /// 0-100, position-relative.
    pub value: f64,
    pub features: RollingFeatures,
}

/// Input row for [`normalize`].
#[derive(Debug, Clone, Copy)]
pub struct PlayerFeatures {
    pub player_id: PlayerId,
    pub position: Position,
    pub features: RollingFeatures,
}

/// Run both passes over a population and return one Smart Value per input,
/// in input order.
///
/// 1. Per-position feature maxima (floored at 1).
/// 2. Discounted score = weighted normalized features x reliability bonus.
/// 3. Per-position maximum discounted score.
/// 4. Value = 100 x score / position max, clamped to [0, 100]; a position
///    whose max is 0 gets 0 throughout.
pub fn normalize(population: &[PlayerFeatures], config: &EngineConfig) -> Vec<SmartValue> {
    let pairs: Vec<(Position, RollingFeatures)> =
        population.iter().map(|p| (p.position, p.features)).collect();
    let maxima = compute_maxima(&pairs);

    let discounted: Vec<f64> = population
        .par_iter()
        .map(|p| {
            let params = config.position(p.position);
            let score = raw_score(&p.features, maxima.get(p.position), &params.weights)
                * reliability_bonus(p.features.cumulative_minutes, params.reliability_tau);
            finite_or_zero(score).max(0.0)
        })
        .collect();

    let mut top = [0.0f64; 4];
    for (p, score) in population.iter().zip(&discounted) {
        let slot = &mut top[p.position.index()];
        *slot = slot.max(*score);
    }

    population
        .iter()
        .zip(discounted)
        .map(|(p, score)| {
            let max = top[p.position.index()];
            let value = if max > 0.0 {
                (SMART_VALUE_MAX * score / max).clamp(0.0, SMART_VALUE_MAX)
            } else {
                0.0
            };
            SmartValue {
                player_id: p.player_id,
                position: p.position,
                value: finite_or_zero(value),
                features: p.features,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
