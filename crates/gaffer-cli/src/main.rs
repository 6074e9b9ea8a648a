// gaffer entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout carries only JSON)
// 2. Parse arguments
// 3. Load config, copying defaults on first run
// 4. Load the data snapshot
// 5. Run the command and print its result as JSON

mod args;
mod store;

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use gaffer_core::calibration;
use gaffer_core::config::{self, EngineConfig};
use gaffer_core::engine::{current_round, score_snapshot, to_candidates, ScoringPass};
use gaffer_core::fixtures::{fixture_ticker, TeamForm};
use gaffer_core::snapshot::Snapshot;
use gaffer_core::solver::backtest::run_backtest;
use gaffer_core::solver::lineup::select_lineup;
use gaffer_core::solver::squad::build_squad;
use gaffer_core::solver::transfers::plan_transfers;
use gaffer_core::solver::Candidate;

use crate::args::{Args, Command};
use crate::store::ResultStore;

fn main() -> Result<()> {
    // 1. Initialize tracing
    init_tracing()?;

    // 2. Parse arguments
    let args = Args::parse();

    // 3. Load config
    let config = config::load_config(&args.config_dir).context("failed to load configuration")?;
    info!(
        budget = config.squad.budget,
        horizon = config.projection.horizon,
        "config loaded"
    );

    // 4. Load the snapshot
    let snapshot = Snapshot::load_dir(&args.data_dir)
        .with_context(|| format!("failed to load data from {}", args.data_dir.display()))?;
    let season = args.season.as_deref();

    // 5. Run the command
    match args.command {
        Command::Score { round, db } => {
            let pass = scoring_pass(&snapshot, round, season, &config);
            if let Some(path) = db {
                let mut store = ResultStore::open(&path)?;
                store.save_projections(pass.cutoff.round, &pass.projections)?;
                info!(path = %path, rows = pass.projections.len(), "projections saved");
            }
            print_json(&pass.projections)
        }
        Command::Squad { round } => {
            let pass = scoring_pass(&snapshot, round, season, &config);
            let candidates = to_candidates(&pass.projections);
            let selection =
                build_squad(&candidates, &config.squad, &config.solver).context("failed to build squad")?;
            let lineup = select_lineup(&selection.players).context("failed to select lineup")?;
            print_json(&json!({
                "cutoff_round": pass.cutoff.round,
                "season": pass.cutoff.season,
                "squad": selection,
                "lineup": lineup,
            }))
        }
        Command::Transfers {
            squad,
            out,
            bank,
            round,
        } => {
            let pass = scoring_pass(&snapshot, round, season, &config);
            let pool = to_candidates(&pass.projections);
            let current = resolve_squad(&squad, &pool)?;
            let plan = plan_transfers(&current, &out, bank, &pool, &config.squad, &config.positions)
                .context("failed to plan transfers")?;
            print_json(&plan)
        }
        Command::Ticker { weeks, metric } => {
            let round = current_round(&snapshot.fixtures);
            let form = TeamForm::from_fixtures(&snapshot.fixtures, Some(round), &config.fixtures);
            let ticker = fixture_ticker(
                &snapshot.fixtures,
                &form,
                round.saturating_add(1),
                weeks,
                metric.into(),
            );
            print_json(&ticker)
        }
        Command::Calibrate { from, to } => {
            let report = calibration::calibrate(&snapshot, from, to, season, &config).context("calibration failed")?;
            let calibrated = report.apply(&config);
            print_json(&json!({
                "report": report,
                "positions": calibrated.positions,
            }))
        }
        Command::Backtest { from, to, seed, db } => {
            let mut config = config;
            if let Some(seed) = seed {
                config.backtest.seed = seed;
            }
            let report = run_backtest(&snapshot, from, to, season, &config);
            if let Some(path) = db {
                let mut store = ResultStore::open(&path)?;
                store.save_backtest(&report.rounds)?;
                info!(path = %path, rounds = report.rounds.len(), "backtest results saved");
            }
            print_json(&report)
        }
    }
}

/// Score as of `round` in `season`, defaulting to the latest fully finished
/// round of the latest season.
fn scoring_pass(snapshot: &Snapshot, round: Option<u32>, season: Option<&str>, config: &EngineConfig) -> ScoringPass {
    let round = round.unwrap_or_else(|| current_round(&snapshot.fixtures));
    let cutoff = snapshot.cutoff(round, season);
    info!(round = cutoff.round, season = ?cutoff.season, "scoring");
    score_snapshot(snapshot, &cutoff, config)
}

/// Look up the current squad's ids in the candidate pool.
fn resolve_squad(ids: &[u32], pool: &[Candidate]) -> Result<Vec<Candidate>> {
    let by_id: HashMap<u32, &Candidate> = pool.iter().map(|c| (c.player_id, c)).collect();
    let mut squad = Vec::with_capacity(ids.len());
    for id in ids {
        match by_id.get(id) {
            Some(c) => squad.push((*c).clone()),
            None => bail!("player {id} in --squad is not in the player list"),
        }
    }
    Ok(squad)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

/// Initialize tracing to stderr; stdout is reserved for JSON output.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gaffer=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    Ok(())
}
