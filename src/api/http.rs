//! HTTP surface of the prediction service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::inference::domain::{HealthReport, PredictionResponse, RideRequest};
use crate::inference::service::ServingState;

use super::error::ApiError;

pub const WELCOME: &str = "Welcome to the NYC Taxi Duration prediction API";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WelcomeBody {
    pub message: String,
}

pub type AppState = Arc<ServingState>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Json<WelcomeBody> {
    Json(WelcomeBody {
        message: WELCOME.to_string(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health())
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<RideRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.predict(&request)?))
}
