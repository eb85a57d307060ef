//! Prediction service: request validation, model state and health.

pub mod domain;
pub mod service;

pub use domain::{HealthReport, HealthStatus, ModelSlot, PredictionResponse, RideRequest};
pub use service::ServingState;
