// Scoring pass orchestration: history -> Smart Values -> fixture form ->
// per-player projections, all as of a single cutoff.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::fixtures::TeamForm;
use crate::model::{Cutoff, Fixture};
use crate::projection::{project_player, FixtureSchedule, Projection, ProjectionContext};
use crate::snapshot::Snapshot;
use crate::solver::Candidate;
use crate::valuation::history::aggregate;
use crate::valuation::smart_value::{normalize, PlayerFeatures, SmartValue};

/// Everything one pass produces. Projections are sorted by total forecast,
/// best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPass {
    pub cutoff: Cutoff,
    /// One per snapshot player, in snapshot order.
    pub smart_values: Vec<SmartValue>,
    pub projections: Vec<Projection>,
}

/// Smart Values for every snapshot player as of `cutoff`, in snapshot order.
pub fn smart_values_at(snapshot: &Snapshot, cutoff: &Cutoff, config: &EngineConfig) -> Vec<SmartValue> {
    let features: Vec<PlayerFeatures> = snapshot
        .players
        .par_iter()
        .map(|player| PlayerFeatures {
            player_id: player.id,
            position: player.position,
            features: aggregate(
                snapshot.history_for(player.id),
                player.position,
                cutoff,
                config.position(player.position),
            ),
        })
        .collect();
    normalize(&features, config)
}

/// Run a full scoring pass.
///
/// 1. Aggregate each player's visible history and normalize to Smart Values.
/// 2. Build club form from fixtures finished by the cutoff round.
/// 3. Project every player over the rounds after the cutoff.
pub fn score_snapshot(snapshot: &Snapshot, cutoff: &Cutoff, config: &EngineConfig) -> ScoringPass {
    let smart_values = smart_values_at(snapshot, cutoff, config);
    debug!(players = smart_values.len(), round = cutoff.round, "smart values computed");

    let form = TeamForm::from_fixtures(&snapshot.fixtures, Some(cutoff.round), &config.fixtures);
    let schedule = FixtureSchedule::build(&snapshot.fixtures);
    let ctx = ProjectionContext::new(&form, &schedule, config, cutoff.round);

    let mut projections: Vec<Projection> = snapshot
        .players
        .par_iter()
        .zip(smart_values.par_iter())
        .map(|(player, smart)| project_player(player, smart, &ctx))
        .collect();
    projections.sort_by(|a, b| {
        b.total_forecast
            .total_cmp(&a.total_forecast)
            .then(a.player_id.cmp(&b.player_id))
    });

    info!(
        round = cutoff.round,
        players = projections.len(),
        horizon = ctx.rounds.len(),
        "scoring pass complete"
    );
    ScoringPass {
        cutoff: cutoff.clone(),
        smart_values,
        projections,
    }
}

/// Solver inputs from projections; the forecast is the horizon total.
pub fn to_candidates(projections: &[Projection]) -> Vec<Candidate> {
    projections.iter().map(Candidate::from).collect()
}

/// The latest round whose fixtures have all finished, or 0 before the
/// season starts. Fixtures without a round are ignored.
pub fn current_round(fixtures: &[Fixture]) -> u32 {
    let mut rounds: BTreeMap<u32, bool> = BTreeMap::new();
    for f in fixtures {
        if let Some(round) = f.round {
            let done = rounds.entry(round).or_insert(true);
            *done &= f.finished;
        }
    }
    rounds
        .into_iter()
        .filter(|(_, done)| *done)
        .map(|(round, _)| round)
        .max()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchPerformance, PlayerRecord, Position};

    fn fixture(id: u32, round: u32, home: u32, away: u32, score: Option<(u32, u32)>) -> Fixture {
        Fixture {
            id,
            round: Some(round),
            kickoff: None,
            home,
            away,
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            finished: score.is_some(),
        }
    }

    fn player(id: u32, position: Position, club: u32) -> PlayerRecord {
        PlayerRecord {
            id,
            name: format!("P{id}"),
            position,
            club,
            price: 50,
            chance_of_playing: None,
        }
    }

    fn row(player_id: u32, round: u32, minutes: f64, points: f64) -> MatchPerformance {
        MatchPerformance {
            player_id,
            fixture_id: round,
            round,
            minutes,
            points,
            influence: points * 5.0,
            threat: points * 4.0,
            ict_index: points,
            price: 50,
            ..Default::default()
        }
    }

    fn snapshot() -> Snapshot {
        let players = vec![
            player(1, Position::Mid, 1),
            player(2, Position::Mid, 2),
            player(3, Position::Fwd, 1),
            player(4, Position::Def, 2),
        ];
        let mut rows = Vec::new();
        for round in 1..=3 {
            rows.push(row(1, round, 90.0, 8.0));
            rows.push(row(2, round, 90.0, 2.0));
            rows.push(row(4, round, 60.0, 3.0));
        }
        let fixtures = vec![
            fixture(1, 1, 1, 2, Some((2, 1))),
            fixture(2, 2, 2, 1, Some((0, 0))),
            fixture(3, 3, 1, 2, Some((3, 1))),
            fixture(4, 4, 2, 1, None),
            fixture(5, 5, 1, 2, None),
        ];
        Snapshot::new(players, rows, fixtures)
    }

    #[test]
    fn pass_projects_every_player_over_the_horizon() {
        let config = EngineConfig::default();
        let pass = score_snapshot(&snapshot(), &Cutoff::round(3), &config);
        assert_eq!(pass.smart_values.len(), 4);
        assert_eq!(pass.projections.len(), 4);
        for p in &pass.projections {
            assert_eq!(p.expected_points().len(), config.projection.horizon);
        }
        let forecasts: Vec<f64> = pass.projections.iter().map(|p| p.total_forecast).collect();
        assert!(forecasts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn stronger_history_ranks_higher() {
        let pass = score_snapshot(&snapshot(), &Cutoff::round(3), &EngineConfig::default());
        let sv = |id| {
            pass.smart_values
                .iter()
                .find(|s| s.player_id == id)
                .map(|s| s.value)
                .unwrap()
        };
        assert!((sv(1) - 100.0).abs() < 1e-9);
        assert!(sv(2) < sv(1));
    }

    #[test]
    fn player_without_history_projects_zero() {
        let pass = score_snapshot(&snapshot(), &Cutoff::round(3), &EngineConfig::default());
        let fwd = pass.projections.iter().find(|p| p.player_id == 3).unwrap();
        assert_eq!(fwd.smart_value, 0.0);
        assert_eq!(fwd.total_forecast, 0.0);
        assert!(fwd.expected_points().iter().all(|p| *p == 0.0));
    }

    #[test]
    fn cutoff_hides_later_rows() {
        let config = EngineConfig::default();
        let early = score_snapshot(&snapshot(), &Cutoff::round(0), &config);
        assert!(early.smart_values.iter().all(|s| s.value == 0.0));
        assert!(early.projections.iter().all(|p| p.total_forecast == 0.0));
    }

    #[test]
    fn previous_season_does_not_leak_into_forecasts() {
        let mut base = snapshot();
        base.players.push(player(5, Position::Mid, 1));
        let mut rows: Vec<MatchPerformance> = Vec::new();
        for p in &base.players {
            rows.extend(base.history_for(p.id).iter().cloned().map(|r| MatchPerformance {
                season: "2425".into(),
                ..r
            }));
        }
        for round in 1..=38 {
            rows.push(MatchPerformance {
                season: "2324".into(),
                fixture_id: 100 + round,
                ..row(5, round, 90.0, 10.0)
            });
        }
        for round in 1..=3 {
            rows.push(MatchPerformance {
                season: "2425".into(),
                ..row(5, round, 0.0, 0.0)
            });
        }
        let snapshot = Snapshot::new(base.players, rows, base.fixtures);

        let cutoff = snapshot.cutoff(3, None);
        assert_eq!(cutoff.season.as_deref(), Some("2425"));
        let pass = score_snapshot(&snapshot, &cutoff, &EngineConfig::default());
        let benched = pass.projections.iter().find(|p| p.player_id == 5).unwrap();
        assert_eq!(benched.smart_value, 0.0);
        assert_eq!(benched.total_forecast, 0.0);
    }

    #[test]
    fn candidates_carry_forecast_and_cost() {
        let pass = score_snapshot(&snapshot(), &Cutoff::round(3), &EngineConfig::default());
        let candidates = to_candidates(&pass.projections);
        assert_eq!(candidates.len(), pass.projections.len());
        for (c, p) in candidates.iter().zip(&pass.projections) {
            assert_eq!(c.player_id, p.player_id);
            assert_eq!(c.cost, p.cost);
            assert_eq!(c.forecast, p.total_forecast);
        }
    }

    #[test]
    fn current_round_is_latest_fully_finished() {
        let mut fixtures = snapshot().fixtures;
        assert_eq!(current_round(&fixtures), 3);
        fixtures.push(fixture(6, 3, 3, 4, None));
        assert_eq!(current_round(&fixtures), 2);
        assert_eq!(current_round(&[]), 0);
    }
}
