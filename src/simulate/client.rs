//! Minimal async client for the prediction endpoint.

use std::time::Duration;

use crate::common::error::{TaxiError, TaxiResult};
use crate::inference::domain::{PredictionResponse, RideRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct PredictClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PredictClient {
    pub fn new(api_url: &str, timeout: Duration) -> TaxiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaxiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/predict", api_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST one ride. Timeouts, refused connections and non-2xx answers are all `Transport` errors.
    pub async fn predict(&self, ride: &RideRequest) -> TaxiResult<PredictionResponse> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(ride)
            .send()
            .await
            .map_err(|e| TaxiError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| TaxiError::Transport(e.to_string()))?;
        response
            .json::<PredictionResponse>()
            .await
            .map_err(|e| TaxiError::Transport(e.to_string()))
    }
}
