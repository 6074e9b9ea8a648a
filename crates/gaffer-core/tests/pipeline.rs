// End-to-end tests over a generated ten-club league.
//
// The league is written out as FPL-style CSV files, loaded back through the
// snapshot loaders and pushed through scoring, squad building, transfers,
// calibration and the backtest.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use gaffer_core::calibration::calibrate;
use gaffer_core::config::{validate, EngineConfig};
use gaffer_core::engine::{current_round, score_snapshot, to_candidates};
use gaffer_core::fixtures::{fixture_ticker, TeamForm, TickerMetric};
use gaffer_core::model::{Cutoff, Position};
use gaffer_core::snapshot::Snapshot;
use gaffer_core::solver::backtest::run_backtest;
use gaffer_core::solver::lineup::select_lineup;
use gaffer_core::solver::squad::build_squad;
use gaffer_core::solver::transfers::plan_transfers;
use gaffer_core::solver::{check_squad, SQUAD_SHAPE};

// ===========================================================================
// League generator
// ===========================================================================

const CLUBS: u32 = 10;
const PLAYED_ROUNDS: u32 = 6;
const SCHEDULED_ROUNDS: u32 = 8;

fn quality(id: u32) -> f64 {
    f64::from((id * 37) % 11)
}

fn position_of(slot: u32) -> Position {
    match slot {
        0..=1 => Position::Gk,
        2..=6 => Position::Def,
        7..=11 => Position::Mid,
        _ => Position::Fwd,
    }
}

fn price_of(id: u32, position: Position) -> u32 {
    let base = match position {
        Position::Gk | Position::Def => 40,
        Position::Mid => 45,
        Position::Fwd => 50,
    };
    base + 3 * quality(id) as u32
}

/// Circle-method round robin; home and away alternate by round.
fn pairings(round: u32) -> Vec<(u32, u32)> {
    let mut rest: Vec<u32> = (2..=CLUBS).collect();
    let len = rest.len();
    rest.rotate_right(round as usize % len);
    let teams: Vec<u32> = std::iter::once(1).chain(rest).collect();
    let n = teams.len();
    (0..n / 2)
        .map(|i| {
            let (a, b) = (teams[i], teams[n - 1 - i]);
            if round % 2 == 0 {
                (a, b)
            } else {
                (b, a)
            }
        })
        .collect()
}

/// Write players.csv, history.csv and fixtures.csv into a fresh directory.
fn write_league(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gaffer_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let mut players = String::from("id,web_name,element_type,team,now_cost,chance_of_playing_next_round\n");
    let mut club_of: HashMap<u32, u32> = HashMap::new();
    for club in 1..=CLUBS {
        for slot in 0..15 {
            let id = (club - 1) * 15 + slot + 1;
            let position = position_of(slot);
            let chance = if id % 13 == 0 { "50" } else { "" };
            writeln!(
                players,
                "{id},Player {id},{},{club},{},{chance}",
                position.display_str(),
                price_of(id, position)
            )
            .unwrap();
            club_of.insert(id, club);
        }
    }

    let mut fixtures = String::from("id,event,kickoff_time,team_h,team_a,team_h_score,team_a_score,finished\n");
    let mut history = String::from(
        "element,fixture,round,minutes,total_points,saves,influence,creativity,threat,ict_index,expected_goals_conceded,value\n",
    );
    let mut fixture_id = 1;
    for round in 1..=SCHEDULED_ROUNDS {
        for (home, away) in pairings(round) {
            let played = round <= PLAYED_ROUNDS;
            let (hs, as_) = if played {
                (((home + round) % 4).to_string(), ((away * round) % 3).to_string())
            } else {
                (String::new(), String::new())
            };
            writeln!(
                fixtures,
                "{fixture_id},{round},2024-08-{:02}T15:00:00Z,{home},{away},{hs},{as_},{}",
                round + 9,
                if played { "True" } else { "False" }
            )
            .unwrap();

            if played {
                for (&id, &club) in &club_of {
                    if club != home && club != away {
                        continue;
                    }
                    // Each club's backup goalkeeper never plays.
                    if (id - 1) % 15 == 1 {
                        continue;
                    }
                    let q = quality(id);
                    let minutes = if q > 2.0 { 90 } else { 30 };
                    let points = 1.0 + 0.6 * q + f64::from((id + round) % 3);
                    let position = position_of((id - 1) % 15);
                    writeln!(
                        history,
                        "{id},{fixture_id},{round},{minutes},{points},{},{},{},{},{},1.1,{}",
                        0.5 * q,
                        4.0 * q,
                        2.0 * q,
                        3.0 * q,
                        1.2 * q,
                        price_of(id, position)
                    )
                    .unwrap();
                }
            }
            fixture_id += 1;
        }
    }

    std::fs::write(dir.join("players.csv"), players).unwrap();
    std::fs::write(dir.join("history.csv"), history).unwrap();
    std::fs::write(dir.join("fixtures.csv"), fixtures).unwrap();
    dir
}

fn load_league(name: &str) -> Snapshot {
    let dir = write_league(name);
    let snapshot = Snapshot::load_dir(&dir).expect("generated league should load");
    let _ = std::fs::remove_dir_all(&dir);
    snapshot
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn snapshot_loads_generated_league() {
    let snapshot = load_league("load");
    assert_eq!(snapshot.players.len(), 150);
    assert_eq!(snapshot.fixtures.len(), (SCHEDULED_ROUNDS * CLUBS / 2) as usize);
    assert_eq!(current_round(&snapshot.fixtures), PLAYED_ROUNDS);
    assert_eq!(snapshot.history_for(1).len(), PLAYED_ROUNDS as usize);
    assert!(snapshot.history_for(2).is_empty());
    assert_eq!(snapshot.player(13).and_then(|p| p.chance_of_playing), Some(50));
}

#[test]
fn scoring_pass_respects_value_bounds() {
    let snapshot = load_league("score");
    let config = EngineConfig::default();
    let pass = score_snapshot(&snapshot, &Cutoff::round(PLAYED_ROUNDS), &config);

    for pos in Position::ALL {
        let values: Vec<f64> = pass
            .smart_values
            .iter()
            .filter(|s| s.position == pos)
            .map(|s| s.value)
            .collect();
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
        let top = values.iter().cloned().fold(0.0, f64::max);
        assert!((top - 100.0).abs() < 1e-9, "{pos} top value {top}");
    }

    for p in &pass.projections {
        let points = p.expected_points();
        assert_eq!(points.len(), config.projection.horizon);
        assert!(points.iter().all(|v| v.is_finite() && *v >= 0.0));
        // Only rounds 7 and 8 are scheduled.
        assert!(points[2..].iter().all(|v| *v == 0.0));
    }

    let backup_keeper = pass.projections.iter().find(|p| p.player_id == 2).unwrap();
    assert_eq!(backup_keeper.total_forecast, 0.0);
}

#[test]
fn squad_and_lineup_are_legal() {
    let snapshot = load_league("squad");
    let config = EngineConfig::default();
    let pass = score_snapshot(&snapshot, &Cutoff::round(PLAYED_ROUNDS), &config);
    let candidates = to_candidates(&pass.projections);

    let selection = build_squad(&candidates, &config.squad, &config.solver).unwrap();
    assert_eq!(check_squad(&selection.players, &config.squad), Ok(()));
    for (pos, n) in SQUAD_SHAPE {
        assert_eq!(selection.players.iter().filter(|p| p.position == pos).count(), n);
    }

    let lineup = select_lineup(&selection.players).unwrap();
    assert_eq!(lineup.starters.len(), 11);
    assert_eq!(lineup.bench.len(), 4);
    assert_ne!(lineup.captain, lineup.vice_captain);
    assert_eq!(lineup.total_cost, selection.total_cost);
}

#[test]
fn transfers_keep_squad_legal() {
    let snapshot = load_league("transfers");
    let config = EngineConfig::default();
    let pass = score_snapshot(&snapshot, &Cutoff::round(PLAYED_ROUNDS), &config);
    let pool = to_candidates(&pass.projections);
    let selection = build_squad(&pool, &config.squad, &config.solver).unwrap();
    let bank = config.squad.budget - selection.total_cost;

    let outgoing: Vec<u32> = selection
        .players
        .iter()
        .filter(|p| p.position == Position::Mid)
        .take(2)
        .map(|p| p.player_id)
        .collect();
    let plan = plan_transfers(
        &selection.players,
        &outgoing,
        bank,
        &pool,
        &config.squad,
        &config.positions,
    )
    .unwrap();

    assert_eq!(plan.transfers.len(), 2);
    assert_eq!(check_squad(&plan.squad, &config.squad), Ok(()));
    assert!(plan.squad.iter().all(|p| !outgoing.contains(&p.player_id)));
    assert_eq!(plan.budget, plan.spent + plan.bank_after);
}

#[test]
fn ticker_covers_every_club() {
    let snapshot = load_league("ticker");
    let config = EngineConfig::default();
    let round = current_round(&snapshot.fixtures);
    let form = TeamForm::from_fixtures(&snapshot.fixtures, Some(round), &config.fixtures);
    let ticker = fixture_ticker(&snapshot.fixtures, &form, round + 1, 3, TickerMetric::Defense);

    assert_eq!(ticker.len(), CLUBS as usize);
    for row in &ticker {
        assert_eq!(row.weeks.len(), 3);
        assert_eq!(row.weeks[0].fixtures.len(), 1);
        assert!(row.weeks[2].is_blank());
    }
    assert!(ticker.windows(2).all(|w| w[0].total <= w[1].total));
}

#[test]
fn calibration_produces_a_usable_config() {
    let snapshot = load_league("calibrate");
    let config = EngineConfig::default();
    let report = calibrate(&snapshot, 2, 5, None, &config).unwrap();
    assert_eq!(report.positions.len(), 4);
    let calibrated = report.apply(&config);
    assert!(validate(&calibrated).is_ok());
    for pc in &report.positions {
        assert!(pc.samples > 0, "{} has no samples", pc.position);
        assert!((0.0..=1.0).contains(&pc.blend_smart_value));
    }
}

#[test]
fn backtest_replays_rounds() {
    let snapshot = load_league("backtest");
    let mut config = EngineConfig::default();
    config.backtest.iterations = 2_000;
    let report = run_backtest(&snapshot, 3, PLAYED_ROUNDS, None, &config);

    assert_eq!(report.rounds.len(), 4);
    for round in &report.rounds {
        assert_eq!(round.starters.len(), 11);
        assert!(round.squad_cost <= config.squad.budget);
        assert!(round.realized_points.is_finite());
        assert!(round.starters.contains(&round.captain));
    }
    assert!(report.samples > 0);
    let realized: f64 = report.rounds.iter().map(|r| r.realized_points).sum();
    assert!((report.total_realized - realized).abs() < 1e-9);
}
