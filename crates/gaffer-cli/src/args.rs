// Command-line parsing.
//
// `gaffer [--data DIR] [--config DIR] [--season TAG] <command> [options]`

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use gaffer_core::fixtures::TickerMetric;
use gaffer_core::model::PlayerId;

#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "gaffer")]
#[command(about = "Fantasy-football valuation, squad building and backtesting", long_about = None)]
pub struct Args {
    /// Directory holding players.csv, history.csv and fixtures.csv
    #[arg(long = "data", global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory holding `defaults/` and `config/`
    #[arg(long = "config", global = true, default_value = ".")]
    pub config_dir: PathBuf,

    /// Season tag of the history to use (default: the latest tag present)
    #[arg(long, global = true)]
    pub season: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Score and project every player
    Score {
        /// Cutoff round (default: latest fully finished round)
        #[arg(long)]
        round: Option<u32>,

        /// SQLite file to record projections in
        #[arg(long)]
        db: Option<String>,
    },

    /// Build a squad and pick its lineup
    Squad {
        #[arg(long)]
        round: Option<u32>,
    },

    /// Replace players in an existing squad
    Transfers {
        /// The fifteen current player ids
        #[arg(long, value_delimiter = ',', required = true)]
        squad: Vec<PlayerId>,

        /// Player ids to sell
        #[arg(long, value_delimiter = ',')]
        out: Vec<PlayerId>,

        /// Money in the bank, minor units
        #[arg(long, default_value_t = 0)]
        bank: u32,

        #[arg(long)]
        round: Option<u32>,
    },

    /// Upcoming fixture difficulty per club
    Ticker {
        #[arg(long, default_value_t = 5)]
        weeks: usize,

        #[arg(long, value_enum, default_value_t = Metric::Attack)]
        metric: Metric,
    },

    /// Fit per-position parameters over cutoffs `from..=to`
    Calibrate {
        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,
    },

    /// Replay rounds `from..=to` with the hill climber
    Backtest {
        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,

        /// RNG seed (default: from config)
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        db: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Metric {
    Attack,
    #[value(alias = "defence")]
    Defense,
}

impl From<Metric> for TickerMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Attack => TickerMetric::Attack,
            Metric::Defense => TickerMetric::Defense,
        }
    }
}
