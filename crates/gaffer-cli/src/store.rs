// SQLite persistence for scoring and backtest output.
//
// Each write replaces the previous run's rows in full.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use gaffer_core::projection::Projection;
use gaffer_core::solver::backtest::BacktestRound;

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Open (or create) the database at `path` and ensure both tables exist.
    /// Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS projections (
                player_id      INTEGER PRIMARY KEY,
                cutoff_round   INTEGER NOT NULL,
                name           TEXT NOT NULL,
                position       TEXT NOT NULL,
                club           INTEGER NOT NULL,
                cost           INTEGER NOT NULL,
                smart_value    REAL NOT NULL,
                total_forecast REAL NOT NULL,
                gameweeks      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backtest_results (
                gameweek INTEGER PRIMARY KEY,
                data     TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Replace every stored projection with `projections`.
    pub fn save_projections(&mut self, cutoff_round: u32, projections: &[Projection]) -> Result<()> {
        let tx = self.conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM projections", [])
            .context("failed to clear projections")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO projections
                        (player_id, cutoff_round, name, position, club, cost, smart_value, total_forecast, gameweeks)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .context("failed to prepare projection insert")?;
            for p in projections {
                let gameweeks =
                    serde_json::to_string(&p.gameweeks).context("failed to serialize gameweeks")?;
                stmt.execute(params![
                    p.player_id,
                    cutoff_round,
                    p.name,
                    p.position.display_str(),
                    p.club,
                    p.cost,
                    p.smart_value,
                    p.total_forecast,
                    gameweeks,
                ])
                .with_context(|| format!("failed to insert projection for player {}", p.player_id))?;
            }
        }
        tx.commit().context("failed to commit projections")?;
        Ok(())
    }

    /// Replace every stored backtest round with `rounds`, one JSON row each.
    pub fn save_backtest(&mut self, rounds: &[BacktestRound]) -> Result<()> {
        let tx = self.conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM backtest_results", [])
            .context("failed to clear backtest results")?;
        for round in rounds {
            let data = serde_json::to_string(round).context("failed to serialize backtest round")?;
            tx.execute(
                "INSERT INTO backtest_results (gameweek, data) VALUES (?1, ?2)",
                params![round.round, data],
            )
            .with_context(|| format!("failed to insert backtest round {}", round.round))?;
        }
        tx.commit().context("failed to commit backtest results")?;
        Ok(())
    }
}
