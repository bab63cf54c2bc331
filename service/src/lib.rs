//! Tally Service
//!
//! Configuration, store and rate-table bootstrap, and the concurrent
//! transfer simulation behind the `tally` operator CLI.

pub mod bootstrap;
pub mod config;
pub mod simulation;

pub use bootstrap::{build_engine, fetch_rates, load_rates, open_store, read_rates_file};
pub use config::ServiceConfig;
pub use simulation::{run_transfer_simulation, LatencyStats, SimulationParams, SimulationReport};
