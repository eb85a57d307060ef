//! Prediction log, drift statistics and the monitoring report.

pub mod domain;
pub mod metrics;
pub mod repo_fs;
pub mod report;
pub mod service;

pub use domain::{DriftReport, PredictionLog, PredictionLogEntry};
pub use repo_fs::FsPredictionLog;
pub use service::{generate_report, run_monitor};
