// Starting XI selection: best of the legal formations, bench order, armbands.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{PlayerId, Position};
use crate::solver::{by_forecast_desc, total_cost, Candidate, SolverError, SQUAD_SIZE};

// ---------------------------------------------------------------------------
// Formations
// ---------------------------------------------------------------------------

/// Outfield counts behind a single goalkeeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formation {
    pub def: usize,
    pub mid: usize,
    pub fwd: usize,
}

impl Formation {
    const fn new(def: usize, mid: usize, fwd: usize) -> Self {
        Formation { def, mid, fwd }
    }

    /// Starters required at `position`.
    pub fn count(&self, position: Position) -> usize {
        match position {
            Position::Gk => 1,
            Position::Def => self.def,
            Position::Mid => self.mid,
            Position::Fwd => self.fwd,
        }
    }
}

impl fmt::Display for Formation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.def, self.mid, self.fwd)
    }
}

/// Legal formations in evaluation order. Earlier entries win ties.
pub const FORMATIONS: [Formation; 8] = [
    Formation::new(3, 5, 2),
    Formation::new(3, 4, 3),
    Formation::new(4, 4, 2),
    Formation::new(4, 3, 3),
    Formation::new(4, 5, 1),
    Formation::new(5, 3, 2),
    Formation::new(5, 4, 1),
    Formation::new(5, 2, 3),
];

// ---------------------------------------------------------------------------
// Lineup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineup {
    pub formation: Formation,
    /// Eleven starters grouped by position, best first within a position.
    pub starters: Vec<Candidate>,
    /// Four substitutes: goalkeepers first, then outfielders by forecast.
    pub bench: Vec<Candidate>,
    pub captain: PlayerId,
    pub vice_captain: PlayerId,
    pub total_cost: u32,
    /// Summed forecast of the starters.
    pub xi_forecast: f64,
}

/// Pick the best XI from a 15-player squad.
///
/// For each formation the top players per position fill the quota; the
/// formation with the highest summed forecast wins. Returns an error for a
/// squad that is not 15 distinct players, has no goalkeeper, or cannot field
/// any formation.
pub fn select_lineup(squad: &[Candidate]) -> Result<Lineup, SolverError> {
    if squad.len() != SQUAD_SIZE {
        return Err(SolverError::InvalidLineup(format!(
            "expected {SQUAD_SIZE} players, got {}",
            squad.len()
        )));
    }
    let ids: HashSet<PlayerId> = squad.iter().map(|p| p.player_id).collect();
    if ids.len() != squad.len() {
        return Err(SolverError::InvalidLineup("duplicate players in squad".into()));
    }

    let mut by_position: [Vec<&Candidate>; 4] = Default::default();
    for p in squad {
        by_position[p.position.index()].push(p);
    }
    for group in by_position.iter_mut() {
        group.sort_by(|a, b| by_forecast_desc(a, b));
    }
    if by_position[Position::Gk.index()].is_empty() {
        return Err(SolverError::InvalidLineup("squad has no goalkeeper".into()));
    }

    let mut best: Option<(Formation, f64)> = None;
    for formation in FORMATIONS {
        let fillable = Position::ALL
            .iter()
            .all(|pos| by_position[pos.index()].len() >= formation.count(*pos));
        if !fillable {
            continue;
        }
        let xi_forecast: f64 = Position::ALL
            .iter()
            .flat_map(|pos| by_position[pos.index()].iter().take(formation.count(*pos)))
            .map(|p| p.forecast)
            .sum();
        if best.map_or(true, |(_, score)| xi_forecast > score) {
            best = Some((formation, xi_forecast));
        }
    }
    let Some((formation, xi_forecast)) = best else {
        return Err(SolverError::InvalidLineup("no legal formation can be fielded".into()));
    };

    let mut starters: Vec<Candidate> = Vec::with_capacity(11);
    let mut bench_keepers: Vec<Candidate> = Vec::new();
    let mut bench_outfield: Vec<Candidate> = Vec::new();
    for pos in Position::ALL {
        let n = formation.count(pos);
        for (i, p) in by_position[pos.index()].iter().enumerate() {
            if i < n {
                starters.push((*p).clone());
            } else if pos == Position::Gk {
                bench_keepers.push((*p).clone());
            } else {
                bench_outfield.push((*p).clone());
            }
        }
    }
    bench_outfield.sort_by(by_forecast_desc);
    let mut bench = bench_keepers;
    bench.extend(bench_outfield);

    let mut ranked: Vec<&Candidate> = starters.iter().collect();
    ranked.sort_by(|a, b| by_forecast_desc(a, b));
    let captain = ranked[0].player_id;
    let vice_captain = ranked[1].player_id;

    Ok(Lineup {
        formation,
        total_cost: total_cost(squad),
        starters,
        bench,
        captain,
        vice_captain,
        xi_forecast,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
