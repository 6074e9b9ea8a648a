// Transfer planning: fill vacated squad slots under a shared cash budget.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{PositionTable, SquadRules};
use crate::model::PlayerId;
use crate::solver::lineup::{select_lineup, Lineup};
use crate::solver::{by_forecast_desc, total_cost, Candidate, ClubCounts, SolverError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub outgoing: Candidate,
    pub incoming: Candidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// In removal order.
    pub transfers: Vec<Transfer>,
    /// The squad after the transfers; each incoming player takes the
    /// outgoing player's slot.
    pub squad: Vec<Candidate>,
    pub lineup: Lineup,
    /// Bank plus the sale value of the outgoing players.
    pub budget: u32,
    /// Spent on incoming players.
    pub spent: u32,
    /// Cash left over.
    pub bank_after: u32,
}

/// Replace the players in `remove` with the best affordable candidates.
///
/// 1. Budget = `bank` + cost of every removed player.
/// 2. Vacancies are filled in removal order. Each vacancy may spend the
///    remaining budget minus the minimum price of every other open vacancy.
/// 3. Within that cap, take the highest-forecast same-position candidate
///    who is not in the squad, not already incoming and whose club has room.
/// 4. Otherwise take the cheapest such candidate the remaining budget
///    covers. If there is none, the vacancy is unfillable.
/// 5. Re-select the lineup for the final squad.
pub fn plan_transfers(
    squad: &[Candidate],
    remove: &[PlayerId],
    bank: u32,
    pool: &[Candidate],
    rules: &SquadRules,
    positions: &PositionTable,
) -> Result<TransferPlan, SolverError> {
    let mut slots: Vec<usize> = Vec::with_capacity(remove.len());
    for id in remove {
        let slot = squad
            .iter()
            .position(|p| p.player_id == *id)
            .ok_or(SolverError::UnknownPlayer(*id))?;
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }

    let removed_cost: u32 = slots.iter().map(|&i| squad[i].cost).sum();
    let budget = bank.saturating_add(removed_cost);

    let mut result: Vec<Candidate> = squad.to_vec();
    let mut clubs = ClubCounts::from_players(
        squad
            .iter()
            .enumerate()
            .filter(|(i, _)| !slots.contains(i))
            .map(|(_, p)| p),
    );
    // Ids that may not come in: the current squad, including outgoing players.
    let mut taken: HashSet<PlayerId> = squad.iter().map(|p| p.player_id).collect();

    let mut sorted: Vec<&Candidate> = pool.iter().collect();
    sorted.sort_by(|a, b| by_forecast_desc(a, b));

    let mut remaining = budget;
    let mut transfers = Vec::with_capacity(slots.len());
    for (n, &slot) in slots.iter().enumerate() {
        let outgoing = &squad[slot];
        let reserved: u32 = slots[n + 1..]
            .iter()
            .map(|&i| positions.get(squad[i].position).min_price)
            .sum();
        let cap = remaining.saturating_sub(reserved);

        let eligible = |c: &&&Candidate| {
            c.position == outgoing.position
                && !taken.contains(&c.player_id)
                && clubs.can_add(c.club, rules.max_per_club)
        };
        let incoming = sorted
            .iter()
            .filter(eligible)
            .find(|c| c.cost <= cap)
            .or_else(|| {
                sorted
                    .iter()
                    .filter(eligible)
                    .filter(|c| c.cost <= remaining)
                    .min_by_key(|c| c.cost)
            })
            .map(|c| (*c).clone())
            .ok_or(SolverError::VacancyUnfillable {
                outgoing: outgoing.player_id,
                position: outgoing.position,
            })?;

        debug!(
            out = outgoing.player_id,
            incoming = incoming.player_id,
            cost = incoming.cost,
            cap,
            "vacancy filled"
        );
        remaining -= incoming.cost;
        clubs.add(incoming.club);
        taken.insert(incoming.player_id);
        result[slot] = incoming.clone();
        transfers.push(Transfer {
            outgoing: outgoing.clone(),
            incoming,
        });
    }

    let lineup = select_lineup(&result)?;
    let spent = budget - remaining;
    if !transfers.is_empty() {
        info!(
            transfers = transfers.len(),
            spent,
            bank_after = remaining,
            cost = total_cost(&result),
            "transfer plan ready"
        );
    }
    Ok(TransferPlan {
        transfers,
        squad: result,
        lineup,
        budget,
        spent,
        bank_after: remaining,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Position;
    use crate::solver::test_support::{candidate, full_budget_squad};

    fn rules() -> SquadRules {
        SquadRules {
            budget: 1000,
            max_per_club: 3,
        }
    }

    #[test]
    fn zero_removals_return_squad_unchanged() {
        let squad = full_budget_squad();
        let pool = vec![candidate(99, Position::Fwd, 99, 40, 50.0)];
        let plan = plan_transfers(&squad, &[], 5, &pool, &rules(), &PositionTable::default()).unwrap();
        assert!(plan.transfers.is_empty());
        assert_eq!(plan.squad, squad);
        assert_eq!(plan.bank_after, 5);
        assert_eq!(plan.spent, 0);
    }

    #[test]
    fn equal_cost_outfield_replacements_keep_total_cost() {
        let squad = full_budget_squad();
        let outfield: Vec<&Candidate> = squad.iter().filter(|p| p.position != Position::Gk).collect();
        let remove: Vec<PlayerId> = outfield.iter().map(|p| p.player_id).collect();
        let pool: Vec<Candidate> = outfield
            .iter()
            .map(|p| candidate(p.player_id + 100, p.position, p.club + 100, p.cost, p.forecast + 1.0))
            .collect();

        let plan = plan_transfers(&squad, &remove, 0, &pool, &rules(), &PositionTable::default()).unwrap();
        assert_eq!(plan.transfers.len(), 13);
        assert_eq!(total_cost(&plan.squad), total_cost(&squad));
        assert_eq!(plan.bank_after, 0);
        assert!(plan.squad.iter().all(|p| p.position == Position::Gk || p.player_id > 100));
    }

    #[test]
    fn reserve_keeps_money_for_later_vacancies() {
        let squad = full_budget_squad();
        // Sell a 45 DEF and a 50 MID with 20 in the bank: 115 to spend.
        let pool = vec![
            candidate(101, Position::Def, 40, 80, 20.0),
            candidate(102, Position::Def, 41, 60, 10.0),
            candidate(103, Position::Mid, 42, 45, 3.0),
            candidate(104, Position::Mid, 43, 70, 9.0),
        ];
        let plan = plan_transfers(&squad, &[3, 8], 20, &pool, &rules(), &PositionTable::default()).unwrap();
        // The DEF slot may spend 115 - 45 (the MID minimum) = 70, so 101 is out.
        assert_eq!(plan.transfers[0].incoming.player_id, 102);
        // 55 left for the MID slot: 104 is too dear, 103 fits.
        assert_eq!(plan.transfers[1].incoming.player_id, 103);
        assert_eq!(plan.spent, 105);
        assert_eq!(plan.bank_after, 10);
    }

    #[test]
    fn fallback_takes_cheapest_within_remaining_budget() {
        let squad = full_budget_squad();
        let mut positions = PositionTable::default();
        positions.get_mut(Position::Def).min_price = 60;
        let pool = vec![
            candidate(101, Position::Def, 40, 45, 5.0),
            candidate(102, Position::Mid, 41, 55, 8.0),
            candidate(103, Position::Mid, 42, 70, 9.0),
        ];
        // Budget 50 + 45 + 10 = 105. The MID slot goes first with a cap of
        // 105 - 60 = 45, which no MID meets, so the cheapest MID the full
        // remaining budget covers is taken instead.
        let plan = plan_transfers(&squad, &[8, 3], 10, &pool, &rules(), &positions).unwrap();
        assert_eq!(plan.transfers[0].incoming.player_id, 102);
        assert_eq!(plan.transfers[1].incoming.player_id, 101);
        assert_eq!(plan.bank_after, 5);
    }

    #[test]
    fn club_cap_blocks_candidates() {
        let mut squad = full_budget_squad();
        // Two more players join player 7 at club 7, filling its quota.
        squad[0].club = 7;
        squad[2].club = 7;
        let pool = vec![
            candidate(101, Position::Def, 7, 45, 30.0),
            candidate(102, Position::Def, 8, 45, 2.0),
        ];
        let plan = plan_transfers(&squad, &[4], 0, &pool, &rules(), &PositionTable::default()).unwrap();
        assert_eq!(plan.transfers[0].incoming.player_id, 102);
    }

    #[test]
    fn unfillable_vacancy_names_outgoing_player() {
        let squad = full_budget_squad();
        let pool = vec![candidate(101, Position::Fwd, 40, 90, 10.0)];
        let err = plan_transfers(&squad, &[13], 0, &pool, &rules(), &PositionTable::default()).unwrap_err();
        assert_eq!(
            err,
            SolverError::VacancyUnfillable {
                outgoing: 13,
                position: Position::Fwd
            }
        );
    }

    #[test]
    fn unknown_removal_is_an_error() {
        let squad = full_budget_squad();
        let err = plan_transfers(&squad, &[999], 0, &[], &rules(), &PositionTable::default()).unwrap_err();
        assert_eq!(err, SolverError::UnknownPlayer(999));
    }

    #[test]
    fn huge_bank_saturates() {
        let squad = full_budget_squad();
        let pool = vec![candidate(101, Position::Fwd, 40, 55, 1.0)];
        let plan = plan_transfers(&squad, &[13], u32::MAX, &pool, &rules(), &PositionTable::default()).unwrap();
        assert_eq!(plan.budget, u32::MAX);
        assert_eq!(plan.spent, 55);
        assert_eq!(plan.bank_after, u32::MAX - 55);
    }

    #[test]
    fn outgoing_player_cannot_return() {
        let squad = full_budget_squad();
        let pool = vec![squad[12].clone(), candidate(101, Position::Fwd, 40, 55, 1.0)];
        let plan = plan_transfers(&squad, &[13], 0, &pool, &rules(), &PositionTable::default()).unwrap();
        assert_eq!(plan.transfers[0].incoming.player_id, 101);
    }
}
