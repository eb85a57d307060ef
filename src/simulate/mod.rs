//! Traffic simulator feeding the prediction log.

pub mod client;
pub mod service;

pub use client::PredictClient;
pub use service::{run_simulation, SimulationCfg, SimulationSummary};
