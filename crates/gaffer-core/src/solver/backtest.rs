// Stochastic squad search used to validate projections against history.
//
// A hill climber behind the `SquadSearch` trait, and the runner that replays
// it over past rounds and compares its picks with realized points.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calibration::pearson;
use crate::config::{BacktestConfig, EngineConfig, SquadRules};
use crate::engine::{score_snapshot, to_candidates};
use crate::model::{Cutoff, PlayerId, Position};
use crate::snapshot::Snapshot;
use crate::solver::lineup::{select_lineup, Formation};
use crate::solver::{by_forecast_desc, quota, total_cost, Candidate, ClubCounts, SolverError};

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Score of a candidate squad. Any feasible squad outranks any infeasible
/// one; infeasible squads rank by how far they are from feasibility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Evaluation {
    /// Best-formation XI forecast.
    Feasible(f64),
    /// Budget overage plus players over the club cap.
    Infeasible { violation: f64 },
}

impl Evaluation {
    pub fn is_feasible(&self) -> bool {
        matches!(self, Evaluation::Feasible(_))
    }

    /// Strict improvement: equal evaluations do not count.
    pub fn is_better_than(&self, other: &Evaluation) -> bool {
        match (self, other) {
            (Evaluation::Feasible(a), Evaluation::Feasible(b)) => a > b,
            (Evaluation::Feasible(_), Evaluation::Infeasible { .. }) => true,
            (Evaluation::Infeasible { .. }, Evaluation::Feasible(_)) => false,
            (Evaluation::Infeasible { violation: a }, Evaluation::Infeasible { violation: b }) => a < b,
        }
    }
}

/// A squad search strategy: propose a neighbor, evaluate a squad.
///
/// The hill climber is one implementation; an exact solver could be another.
pub trait SquadSearch {
    fn propose(&mut self, squad: &[Candidate]) -> Vec<Candidate>;
    fn evaluate(&self, squad: &[Candidate]) -> Evaluation;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub squad: Vec<Candidate>,
    pub evaluation: Evaluation,
    /// Proposals accepted.
    pub accepted: usize,
}

/// Always-improve local search from `seed` for `iterations` proposals.
pub fn search<S: SquadSearch>(strategy: &mut S, seed: Vec<Candidate>, iterations: usize) -> SearchOutcome {
    let mut current = seed;
    let mut current_eval = strategy.evaluate(&current);
    let mut accepted = 0;
    for _ in 0..iterations {
        let proposal = strategy.propose(&current);
        let eval = strategy.evaluate(&proposal);
        if eval.is_better_than(&current_eval) {
            current = proposal;
            current_eval = eval;
            accepted += 1;
        }
    }
    SearchOutcome {
        squad: current,
        evaluation: current_eval,
        accepted,
    }
}

// ---------------------------------------------------------------------------
// Hill climber
// ---------------------------------------------------------------------------

/// Random single-slot swaps drawn from the top-K players of each position.
pub struct HillClimber {
    /// Top-K by forecast, per position.
    pools: [Vec<Candidate>; 4],
    /// Everyone by forecast, per position, for seeding.
    ranked: [Vec<Candidate>; 4],
    rules: SquadRules,
    rng: StdRng,
}

impl HillClimber {
    pub fn new(candidates: &[Candidate], rules: &SquadRules, config: &BacktestConfig, seed: u64) -> Self {
        let mut ranked: [Vec<Candidate>; 4] = Default::default();
        for c in candidates {
            ranked[c.position.index()].push(c.clone());
        }
        for group in ranked.iter_mut() {
            group.sort_by(by_forecast_desc);
            group.dedup_by_key(|c| c.player_id);
        }
        let pools = ranked.clone().map(|mut group| {
            group.truncate(config.top_k);
            group
        });
        HillClimber {
            pools,
            ranked,
            rules: rules.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Top-forecast players for every slot, ignoring budget and club cap.
    pub fn seed_squad(&self) -> Result<Vec<Candidate>, SolverError> {
        let mut squad = Vec::with_capacity(15);
        for position in Position::ALL {
            let needed = quota(position);
            let group = &self.ranked[position.index()];
            if group.len() < needed {
                return Err(SolverError::BucketUnfillable {
                    position,
                    needed,
                    found: group.len(),
                });
            }
            squad.extend(group.iter().take(needed).cloned());
        }
        Ok(squad)
    }

    fn violation(&self, squad: &[Candidate]) -> f64 {
        let overage = total_cost(squad).saturating_sub(self.rules.budget);
        let excess = ClubCounts::from_players(squad).excess(self.rules.max_per_club);
        f64::from(overage) + excess as f64
    }
}

impl SquadSearch for HillClimber {
    /// Replace one random slot with a random top-K player of the same
    /// position. Drawing someone already in the squad yields the squad
    /// unchanged, which never counts as an improvement.
    fn propose(&mut self, squad: &[Candidate]) -> Vec<Candidate> {
        let mut next = squad.to_vec();
        if next.is_empty() {
            return next;
        }
        let slot = self.rng.gen_range(0..next.len());
        let pool = &self.pools[next[slot].position.index()];
        if pool.is_empty() {
            return next;
        }
        let incoming = &pool[self.rng.gen_range(0..pool.len())];
        if !squad.iter().any(|p| p.player_id == incoming.player_id) {
            next[slot] = incoming.clone();
        }
        next
    }

    fn evaluate(&self, squad: &[Candidate]) -> Evaluation {
        let violation = self.violation(squad);
        if violation > 0.0 {
            return Evaluation::Infeasible { violation };
        }
        match select_lineup(squad) {
            Ok(lineup) => Evaluation::Feasible(lineup.xi_forecast),
            Err(_) => Evaluation::Infeasible {
                violation: f64::INFINITY,
            },
        }
    }
}

/// Seed and run the hill climber with the configured iteration count.
pub fn hill_climb(
    candidates: &[Candidate],
    rules: &SquadRules,
    config: &BacktestConfig,
    seed: u64,
) -> Result<SearchOutcome, SolverError> {
    let mut climber = HillClimber::new(candidates, rules, config, seed);
    let start = climber.seed_squad()?;
    let outcome = search(&mut climber, start, config.iterations);
    debug!(
        accepted = outcome.accepted,
        feasible = outcome.evaluation.is_feasible(),
        "hill climb finished"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Backtest runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRound {
    pub round: u32,
    pub formation: Formation,
    pub predicted_points: f64,
    pub realized_points: f64,
    pub squad_cost: u32,
    pub starters: Vec<PlayerId>,
    pub captain: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub rounds: Vec<BacktestRound>,
    pub total_predicted: f64,
    pub total_realized: f64,
    /// Pearson correlation of per-player forecast and realized points across
    /// every replayed round. `None` with too few samples.
    pub correlation: Option<f64>,
    pub samples: usize,
}

/// Replay rounds `from ..= to` of `season` (the latest season tag when
/// `None`): for each round R, value the snapshot as of R - 1 with a
/// one-gameweek horizon, pick a squad with the hill climber and score its XI
/// against what actually happened in R.
///
/// Rounds where no feasible squad is found are logged and skipped.
pub fn run_backtest(
    snapshot: &Snapshot,
    from: u32,
    to: u32,
    season: Option<&str>,
    config: &EngineConfig,
) -> BacktestReport {
    let season = season.or_else(|| snapshot.latest_season());
    let mut one_week = config.clone();
    one_week.projection.horizon = 1;

    let mut rounds = Vec::new();
    let mut forecasts = Vec::new();
    let mut realized = Vec::new();

    for round in from.max(1)..=to {
        let cutoff = Cutoff::with_season(round - 1, season);
        let target = Cutoff::with_season(round, season);
        let pass = score_snapshot(snapshot, &cutoff, &one_week);

        let mut candidates = to_candidates(&pass.projections);
        for c in candidates.iter_mut() {
            if let Some(price) = snapshot.price_at(c.player_id, &cutoff) {
                c.cost = price;
            }
        }
        for p in &pass.projections {
            forecasts.push(p.total_forecast);
            realized.push(snapshot.realized_points(p.player_id, &target));
        }

        let seed = config.backtest.seed.wrapping_add(u64::from(round));
        let outcome = match hill_climb(&candidates, &config.squad, &config.backtest, seed) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(round, error = %err, "backtest round skipped");
                continue;
            }
        };
        if !outcome.evaluation.is_feasible() {
            warn!(round, "no feasible squad found, round skipped");
            continue;
        }
        let lineup = match select_lineup(&outcome.squad) {
            Ok(lineup) => lineup,
            Err(err) => {
                warn!(round, error = %err, "backtest round skipped");
                continue;
            }
        };

        let realized_points = lineup
            .starters
            .iter()
            .map(|p| snapshot.realized_points(p.player_id, &target))
            .sum();
        info!(
            round,
            predicted = lineup.xi_forecast,
            realized = realized_points,
            "backtest round"
        );
        rounds.push(BacktestRound {
            round,
            formation: lineup.formation,
            predicted_points: lineup.xi_forecast,
            realized_points,
            squad_cost: lineup.total_cost,
            starters: lineup.starters.iter().map(|p| p.player_id).collect(),
            captain: lineup.captain,
        });
    }

    let total_predicted = rounds.iter().map(|r| r.predicted_points).sum();
    let total_realized = rounds.iter().map(|r| r.realized_points).sum();
    BacktestReport {
        rounds,
        total_predicted,
        total_realized,
        correlation: pearson(&forecasts, &realized),
        samples: forecasts.len(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::check_squad;
    use crate::solver::test_support::candidate;

    fn rules(budget: u32) -> SquadRules {
        SquadRules {
            budget,
            max_per_club: 3,
        }
    }

    fn config(iterations: usize) -> BacktestConfig {
        BacktestConfig {
            iterations,
            top_k: 50,
            seed: 7,
        }
    }

    /// Eight players per position spread over many clubs, forecasts and
    /// prices both rising with the index.
    fn pool() -> Vec<Candidate> {
        let mut pool = Vec::new();
        let mut id = 1;
        for position in Position::ALL {
            for i in 0..8u32 {
                let club = id % 20 + 1;
                pool.push(candidate(id, position, club, 40 + i * 10, 2.0 + f64::from(i)));
                id += 1;
            }
        }
        pool
    }

    #[test]
    fn evaluation_ordering() {
        let good = Evaluation::Feasible(50.0);
        let better = Evaluation::Feasible(60.0);
        let near = Evaluation::Infeasible { violation: 5.0 };
        let far = Evaluation::Infeasible { violation: 50.0 };
        assert!(better.is_better_than(&good));
        assert!(!good.is_better_than(&good));
        assert!(good.is_better_than(&near));
        assert!(!near.is_better_than(&good));
        assert!(near.is_better_than(&far));
        assert!(!far.is_better_than(&near));
    }

    #[test]
    fn seed_ignores_budget() {
        let climber = HillClimber::new(&pool(), &rules(100), &config(0), 1);
        let seed = climber.seed_squad().unwrap();
        assert_eq!(seed.len(), 15);
        assert!(total_cost(&seed) > 100);
        assert!(!climber.evaluate(&seed).is_feasible());
    }

    #[test]
    fn infeasible_seed_is_repaired() {
        // The seed costs 1410; the cheapest possible squad costs 840.
        let outcome = hill_climb(&pool(), &rules(900), &config(20_000), 11).unwrap();
        assert!(outcome.evaluation.is_feasible(), "{:?}", outcome.evaluation);
        assert_eq!(check_squad(&outcome.squad, &rules(900)), Ok(()));
    }

    #[test]
    fn overwhelming_candidate_is_kept() {
        let mut candidates = pool();
        candidates.push(candidate(500, Position::Mid, 99, 40, 1000.0));
        let outcome = hill_climb(&candidates, &rules(900), &config(20_000), 3).unwrap();
        assert!(outcome.evaluation.is_feasible());
        assert!(outcome.squad.iter().any(|p| p.player_id == 500));
    }

    #[test]
    fn same_seed_same_result() {
        let a = hill_climb(&pool(), &rules(900), &config(2_000), 42).unwrap();
        let b = hill_climb(&pool(), &rules(900), &config(2_000), 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn search_never_accepts_worse() {
        struct Worse;
        impl SquadSearch for Worse {
            fn propose(&mut self, squad: &[Candidate]) -> Vec<Candidate> {
                squad.iter().map(|c| Candidate { forecast: c.forecast - 1.0, ..c.clone() }).collect()
            }
            fn evaluate(&self, squad: &[Candidate]) -> Evaluation {
                Evaluation::Feasible(squad.iter().map(|c| c.forecast).sum())
            }
        }
        let seed = vec![candidate(1, Position::Gk, 1, 40, 5.0)];
        let outcome = search(&mut Worse, seed.clone(), 100);
        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.squad, seed);
    }

    #[test]
    fn thin_pool_cannot_seed() {
        let candidates: Vec<Candidate> = pool().into_iter().filter(|c| c.position != Position::Gk).collect();
        let err = hill_climb(&candidates, &rules(1000), &config(10), 1).unwrap_err();
        assert!(matches!(err, SolverError::BucketUnfillable { position: Position::Gk, .. }));
    }
}
