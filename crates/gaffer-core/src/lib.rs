// Library root: re-exports all modules so the CLI and integration tests can
// access the engine's public API.

pub mod calibration;
pub mod config;
pub mod engine;
pub mod fixtures;
pub mod model;
pub mod projection;
pub mod snapshot;
pub mod solver;
pub mod valuation;
