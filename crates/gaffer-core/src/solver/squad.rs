// Deterministic squad builder: greedy fill by forecast, then budget repair.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{SolverConfig, SquadRules};
use crate::model::{PlayerId, Position};
use crate::solver::{by_forecast_desc, quota, total_cost, total_forecast, Candidate, ClubCounts, SolverError};

/// A legal 15-player squad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadSelection {
    pub players: Vec<Candidate>,
    pub total_cost: u32,
    pub total_forecast: f64,
    /// Budget-repair swaps made after the greedy fill.
    pub repair_swaps: usize,
}

/// Build the highest-forecast squad the greedy+repair heuristic can find.
///
/// 1. Sort candidates by forecast (ties by player id) and fill each position
///    bucket in order, skipping anyone who would breach the club cap.
/// 2. While over budget, rank the squad by forecast-per-cost ascending and
///    try the first `repair_candidates` players: the first one with a cheaper
///    same-position replacement is swapped for the cheapest such player.
/// 3. If none of them can be swapped, swap the most expensive player instead.
/// 4. Give up with an error when no swap exists or the iteration ceiling is
///    reached.
pub fn build_squad(
    pool: &[Candidate],
    rules: &SquadRules,
    solver: &SolverConfig,
) -> Result<SquadSelection, SolverError> {
    let mut sorted: Vec<&Candidate> = pool.iter().collect();
    sorted.sort_by(|a, b| by_forecast_desc(a, b));
    let mut seen: HashSet<PlayerId> = HashSet::new();
    sorted.retain(|c| seen.insert(c.player_id));

    let mut squad: Vec<Candidate> = Vec::with_capacity(15);
    let mut clubs = ClubCounts::default();
    for position in Position::ALL {
        let needed = quota(position);
        let mut found = 0;
        for c in sorted.iter().filter(|c| c.position == position) {
            if found == needed {
                break;
            }
            if clubs.can_add(c.club, rules.max_per_club) {
                clubs.add(c.club);
                squad.push((*c).clone());
                found += 1;
            }
        }
        if found < needed {
            return Err(SolverError::BucketUnfillable {
                position,
                needed,
                found,
            });
        }
    }
    debug!(cost = total_cost(&squad), budget = rules.budget, "greedy fill complete");

    let swaps = repair_budget(&mut squad, &sorted, &mut clubs, rules, solver)?;
    let selection = SquadSelection {
        total_cost: total_cost(&squad),
        total_forecast: total_forecast(&squad),
        players: squad,
        repair_swaps: swaps,
    };
    info!(
        cost = selection.total_cost,
        forecast = selection.total_forecast,
        swaps,
        "squad built"
    );
    Ok(selection)
}

/// Forecast per unit of cost; free players rank as infinitely efficient.
fn efficiency(c: &Candidate) -> f64 {
    if c.cost == 0 {
        f64::INFINITY
    } else {
        c.forecast / f64::from(c.cost)
    }
}

/// Cheapest unselected same-position player strictly cheaper than `outgoing`
/// whose club still has room once `outgoing` leaves. Ties go to the higher
/// forecast, which `sorted` already orders first.
fn cheaper_replacement<'a>(
    outgoing: &Candidate,
    sorted: &[&'a Candidate],
    squad: &[Candidate],
    clubs: &ClubCounts,
    cap: usize,
) -> Option<&'a Candidate> {
    sorted
        .iter()
        .copied()
        .filter(|c| {
            c.position == outgoing.position
                && c.cost < outgoing.cost
                && !squad.iter().any(|s| s.player_id == c.player_id)
                && clubs.can_swap(outgoing.club, c.club, cap)
        })
        .min_by_key(|c| c.cost)
}

fn repair_budget(
    squad: &mut [Candidate],
    sorted: &[&Candidate],
    clubs: &mut ClubCounts,
    rules: &SquadRules,
    solver: &SolverConfig,
) -> Result<usize, SolverError> {
    let mut swaps = 0;
    while total_cost(squad) > rules.budget {
        if swaps >= solver.max_repair_iterations {
            return Err(SolverError::BudgetRepairExhausted {
                swaps,
                cost: total_cost(squad),
                budget: rules.budget,
            });
        }

        let mut order: Vec<usize> = (0..squad.len()).collect();
        order.sort_by(|&a, &b| {
            efficiency(&squad[a])
                .total_cmp(&efficiency(&squad[b]))
                .then(squad[a].player_id.cmp(&squad[b].player_id))
        });

        let mut swap: Option<(usize, Candidate)> = order
            .iter()
            .take(solver.repair_candidates)
            .find_map(|&i| {
                cheaper_replacement(&squad[i], sorted, squad, clubs, rules.max_per_club)
                    .map(|c| (i, c.clone()))
            });

        if swap.is_none() {
            let most_expensive = (0..squad.len()).max_by(|&a, &b| {
                squad[a]
                    .cost
                    .cmp(&squad[b].cost)
                    .then(squad[b].forecast.total_cmp(&squad[a].forecast))
            });
            swap = most_expensive.and_then(|i| {
                cheaper_replacement(&squad[i], sorted, squad, clubs, rules.max_per_club)
                    .map(|c| (i, c.clone()))
            });
        }

        let Some((index, incoming)) = swap else {
            return Err(SolverError::BudgetRepairExhausted {
                swaps,
                cost: total_cost(squad),
                budget: rules.budget,
            });
        };
        debug!(
            out = squad[index].player_id,
            incoming = incoming.player_id,
            saving = squad[index].cost - incoming.cost,
            "repair swap"
        );
        clubs.remove(squad[index].club);
        clubs.add(incoming.club);
        squad[index] = incoming;
        swaps += 1;
    }
    Ok(swaps)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::check_squad;
    use crate::solver::test_support::{candidate, full_budget_squad};
    use proptest::prelude::*;

    fn rules(budget: u32) -> SquadRules {
        SquadRules {
            budget,
            max_per_club: 3,
        }
    }

    #[test]
    fn exact_pool_is_selected_whole() {
        let pool = full_budget_squad();
        let selection = build_squad(&pool, &rules(725), &SolverConfig::default()).unwrap();
        assert_eq!(selection.total_cost, 725);
        assert_eq!(selection.repair_swaps, 0);
        let mut ids: Vec<PlayerId> = selection.players.iter().map(|p| p.player_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn greedy_respects_club_cap() {
        let mut pool = full_budget_squad();
        // Four strong defenders from club 50: only three may be picked.
        for (i, id) in (100..104).enumerate() {
            pool.push(candidate(id, Position::Def, 50, 45, 20.0 - i as f64));
        }
        let selection = build_squad(&pool, &rules(1000), &SolverConfig::default()).unwrap();
        let from_50 = selection.players.iter().filter(|p| p.club == 50).count();
        assert_eq!(from_50, 3);
        assert!(selection.players.iter().any(|p| p.player_id == 100));
        assert!(!selection.players.iter().any(|p| p.player_id == 103));
        assert_eq!(check_squad(&selection.players, &rules(1000)), Ok(()));
    }

    #[test]
    fn unfillable_bucket_is_reported() {
        let pool: Vec<Candidate> = full_budget_squad()
            .into_iter()
            .filter(|p| p.position != Position::Fwd || p.player_id != 15)
            .collect();
        let err = build_squad(&pool, &rules(1000), &SolverConfig::default()).unwrap_err();
        assert_eq!(
            err,
            SolverError::BucketUnfillable {
                position: Position::Fwd,
                needed: 3,
                found: 2
            }
        );
    }

    #[test]
    fn repair_swaps_down_to_budget() {
        let mut pool = full_budget_squad();
        // A premium forward pushes the greedy squad over budget.
        pool.push(candidate(20, Position::Fwd, 20, 130, 15.0));
        let selection = build_squad(&pool, &rules(725), &SolverConfig::default()).unwrap();
        assert!(selection.total_cost <= 725);
        assert!(selection.repair_swaps >= 1);
        assert_eq!(check_squad(&selection.players, &rules(725)), Ok(()));
    }

    #[test]
    fn impossible_budget_is_infeasible_not_a_panic() {
        let pool = full_budget_squad();
        let err = build_squad(&pool, &rules(500), &SolverConfig::default()).unwrap_err();
        assert!(matches!(err, SolverError::BudgetRepairExhausted { .. }));
    }

    #[test]
    fn iteration_ceiling_is_honored() {
        let mut pool = full_budget_squad();
        pool.push(candidate(20, Position::Fwd, 20, 130, 15.0));
        let solver = SolverConfig {
            max_repair_iterations: 0,
            ..SolverConfig::default()
        };
        let err = build_squad(&pool, &rules(725), &solver).unwrap_err();
        assert_eq!(
            err,
            SolverError::BudgetRepairExhausted {
                swaps: 0,
                cost: 800,
                budget: 725
            }
        );
    }

    fn arb_pool() -> impl Strategy<Value = Vec<Candidate>> {
        // 3-8 players per position with random prices, clubs and forecasts.
        let player = (1u32..=8, 40u32..=130, 0.0f64..15.0);
        let bucket = |pos: Position, min: usize| {
            prop::collection::vec(player.clone(), min..=8).prop_map(move |rows| (pos, rows))
        };
        (
            bucket(Position::Gk, 2),
            bucket(Position::Def, 5),
            bucket(Position::Mid, 5),
            bucket(Position::Fwd, 3),
        )
            .prop_map(|(gk, def, mid, fwd)| {
                let mut pool = Vec::new();
                let mut id = 1;
                for (pos, rows) in [gk, def, mid, fwd] {
                    for (club, cost, forecast) in rows {
                        pool.push(candidate(id, pos, club, cost, forecast));
                        id += 1;
                    }
                }
                pool
            })
    }

    proptest! {
        #[test]
        fn squad_is_legal_or_reported_infeasible(pool in arb_pool(), budget in 600u32..1100) {
            let rules = rules(budget);
            match build_squad(&pool, &rules, &SolverConfig::default()) {
                Ok(selection) => {
                    prop_assert_eq!(check_squad(&selection.players, &rules), Ok(()));
                    prop_assert_eq!(selection.total_cost, total_cost(&selection.players));
                }
                Err(err) => {
                    let expected_kind = matches!(
                        err,
                        SolverError::BucketUnfillable { .. } | SolverError::BudgetRepairExhausted { .. }
                    );
                    prop_assert!(expected_kind);
                }
            }
        }
    }
}
