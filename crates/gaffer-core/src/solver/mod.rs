// Squad, lineup and transfer optimization over projected candidates.

pub mod backtest;
pub mod lineup;
pub mod squad;
pub mod transfers;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SquadRules;
use crate::model::{ClubId, PlayerId, Position};
use crate::projection::Projection;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("cannot fill {position} bucket: need {needed}, found {found} eligible")]
    BucketUnfillable {
        position: Position,
        needed: usize,
        found: usize,
    },

    #[error("budget repair gave up after {swaps} swaps: squad costs {cost}, budget is {budget}")]
    BudgetRepairExhausted { swaps: usize, cost: u32, budget: u32 },

    #[error("no legal replacement for outgoing player {outgoing} ({position})")]
    VacancyUnfillable { outgoing: PlayerId, position: Position },

    #[error("player {0} is not in the squad")]
    UnknownPlayer(PlayerId),

    #[error("invalid lineup input: {0}")]
    InvalidLineup(String),
}

// ---------------------------------------------------------------------------
// Squad shape
// ---------------------------------------------------------------------------

pub const SQUAD_SIZE: usize = 15;

/// Required squad composition: 2 GK, 5 DEF, 5 MID, 3 FWD.
pub const SQUAD_SHAPE: [(Position, usize); 4] = [
    (Position::Gk, 2),
    (Position::Def, 5),
    (Position::Mid, 5),
    (Position::Fwd, 3),
];

pub fn quota(position: Position) -> usize {
    SQUAD_SHAPE[position.index()].1
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A player as the solvers see one: position, club, price and a single
/// forecast number to maximize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub player_id: PlayerId,
    #[serde(default)]
    pub name: String,
    pub position: Position,
    pub club: ClubId,
    pub cost: u32,
    pub forecast: f64,
}

impl From<&Projection> for Candidate {
    fn from(p: &Projection) -> Self {
        Candidate {
            player_id: p.player_id,
            name: p.name.clone(),
            position: p.position,
            club: p.club,
            cost: p.cost,
            forecast: p.total_forecast,
        }
    }
}

/// Forecast descending, then player id ascending.
pub(crate) fn by_forecast_desc(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.forecast
        .total_cmp(&a.forecast)
        .then(a.player_id.cmp(&b.player_id))
}

pub fn total_cost(players: &[Candidate]) -> u32 {
    players.iter().map(|p| p.cost).sum()
}

pub fn total_forecast(players: &[Candidate]) -> f64 {
    players.iter().map(|p| p.forecast).sum()
}

// ---------------------------------------------------------------------------
// Club counts
// ---------------------------------------------------------------------------

/// Players per club within a squad under construction.
#[derive(Debug, Clone, Default)]
pub struct ClubCounts {
    counts: HashMap<ClubId, usize>,
}

impl ClubCounts {
    pub fn from_players<'a>(players: impl IntoIterator<Item = &'a Candidate>) -> Self {
        let mut counts = ClubCounts::default();
        for p in players {
            counts.add(p.club);
        }
        counts
    }

    pub fn get(&self, club: ClubId) -> usize {
        self.counts.get(&club).copied().unwrap_or(0)
    }

    pub fn add(&mut self, club: ClubId) {
        *self.counts.entry(club).or_insert(0) += 1;
    }

    pub fn remove(&mut self, club: ClubId) {
        if let Some(n) = self.counts.get_mut(&club) {
            *n = n.saturating_sub(1);
        }
    }

    pub fn can_add(&self, club: ClubId, cap: usize) -> bool {
        self.get(club) < cap
    }

    /// Whether `incoming` can replace `outgoing` without breaching the cap.
    pub fn can_swap(&self, outgoing: ClubId, incoming: ClubId, cap: usize) -> bool {
        outgoing == incoming || self.can_add(incoming, cap)
    }

    /// Players over the cap, summed across clubs.
    pub fn excess(&self, cap: usize) -> usize {
        self.counts.values().map(|n| n.saturating_sub(cap)).sum()
    }
}

// ---------------------------------------------------------------------------
// Legality
// ---------------------------------------------------------------------------

/// Check every squad invariant: 15 distinct players in the 2/5/5/3 shape,
/// within budget and the club cap. Returns the first violation found.
pub fn check_squad(players: &[Candidate], rules: &SquadRules) -> Result<(), String> {
    if players.len() != SQUAD_SIZE {
        return Err(format!("squad has {} players, expected {SQUAD_SIZE}", players.len()));
    }
    let ids: HashSet<PlayerId> = players.iter().map(|p| p.player_id).collect();
    if ids.len() != players.len() {
        return Err("squad contains duplicate players".into());
    }
    for (position, needed) in SQUAD_SHAPE {
        let found = players.iter().filter(|p| p.position == position).count();
        if found != needed {
            return Err(format!("squad has {found} {position}, expected {needed}"));
        }
    }
    let cost = total_cost(players);
    if cost > rules.budget {
        return Err(format!("squad costs {cost}, budget is {}", rules.budget));
    }
    let clubs = ClubCounts::from_players(players);
    if clubs.excess(rules.max_per_club) > 0 {
        return Err(format!("more than {} players from one club", rules.max_per_club));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn full_budget_squad_is_legal_at_725() {
        let squad = full_budget_squad();
        assert_eq!(total_cost(&squad), 725);
        let rules = SquadRules {
            budget: 725,
            max_per_club: 3,
        };
        assert_eq!(check_squad(&squad, &rules), Ok(()));
        let tight = SquadRules {
            budget: 724,
            max_per_club: 3,
        };
        assert!(check_squad(&squad, &tight).is_err());
    }

    #[test]
    fn check_squad_flags_club_cap_and_duplicates() {
        let rules = SquadRules::default();
        let mut squad = full_budget_squad();
        for p in squad.iter_mut().take(4) {
            p.club = 1;
        }
        assert!(check_squad(&squad, &rules).unwrap_err().contains("club"));

        let mut dup = full_budget_squad();
        dup[14].player_id = 1;
        assert!(check_squad(&dup, &rules).unwrap_err().contains("duplicate"));
    }

    #[test]
    fn club_counts_swap_rules() {
        let squad = full_budget_squad();
        let mut counts = ClubCounts::from_players(&squad);
        assert_eq!(counts.get(1), 1);
        counts.add(1);
        counts.add(1);
        assert!(!counts.can_add(1, 3));
        // Swapping within the same club never changes the count.
        assert!(counts.can_swap(1, 1, 3));
        assert!(!counts.can_swap(2, 1, 3));
        counts.add(1);
        assert_eq!(counts.excess(3), 1);
        counts.remove(1);
        assert_eq!(counts.excess(3), 0);
    }

    #[test]
    fn quota_matches_shape() {
        let total: usize = Position::ALL.iter().map(|p| quota(*p)).sum();
        assert_eq!(total, SQUAD_SIZE);
        assert_eq!(quota(Position::Fwd), 3);
    }
}
