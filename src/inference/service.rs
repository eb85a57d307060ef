//! Prediction service state and the request path.
//!
//! The service starts even when no artefact can be loaded. In that case it
//! stays degraded until the process is restarted: `/health` reports it and
//! every prediction fails with `ModelUnavailable`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::common::error::{TaxiError, TaxiResult};
use crate::common::time;
use crate::features;
use crate::training::domain::{ArtifactStore, ModelArtifact, RunId};
use crate::training::repo_fs::read_run_id;

use super::domain::{
    HealthReport, HealthStatus, ModelSlot, PredictionResponse, RideRequest, UNKNOWN_RUN_ID,
};

/// Shared, read-mostly state handed to every request handler.
#[derive(Debug)]
pub struct ServingState {
    slot: ModelSlot,
    /// Run named by the side channel, kept even when its artefact failed to load.
    run_id: Option<RunId>,
}

fn load_artifact(run_id: &RunId, store: &dyn ArtifactStore) -> TaxiResult<ModelArtifact> {
    let artifact = store.load(run_id)?;
    match store.load_run(run_id) {
        Ok(record) => info!(
            run_id = %run_id,
            rmse = record.metrics.rmse,
            mae = record.metrics.mae,
            r2 = record.metrics.r2,
            trained_at = %record.created_at,
            "run record found"
        ),
        Err(e) => debug!(run_id = %run_id, error = %e, "no run record for artifact"),
    }
    Ok(artifact)
}

impl ServingState {
    /// Read the run id side channel and load the artefact it names. Never fails:
    /// any error leaves the service degraded.
    pub fn startup(run_id_path: &Path, store: &dyn ArtifactStore) -> Self {
        let start = Instant::now();
        let run_id = match read_run_id(run_id_path) {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!(
                    code = e.code().as_str(),
                    error = %e,
                    path = %run_id_path.display(),
                    "no run id, serving in degraded mode"
                );
                return Self::degraded();
            }
        };
        match load_artifact(&run_id, store) {
            Ok(artifact) => {
                info!(
                    run_id = %artifact.run_id,
                    vocabulary = artifact.pipeline.vectorizer.vocab_len(),
                    trees = artifact.pipeline.regressor.n_trees(),
                    elapsed_ms = time::elapsed_ms(start) as u64,
                    "model loaded"
                );
                Self::from_artifact(artifact)
            }
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    code = e.code().as_str(),
                    error = %e,
                    "model could not be loaded, serving in degraded mode"
                );
                Self {
                    slot: ModelSlot::empty(),
                    run_id: Some(run_id),
                }
            }
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            run_id: Some(artifact.run_id.clone()),
            slot: ModelSlot::loaded(artifact),
        }
    }

    pub fn degraded() -> Self {
        Self {
            slot: ModelSlot::empty(),
            run_id: None,
        }
    }

    pub fn slot(&self) -> &ModelSlot {
        &self.slot
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Validate, encode and score one ride. Side-effect free.
    pub fn predict(&self, request: &RideRequest) -> TaxiResult<PredictionResponse> {
        let ride = request.validate()?;
        let artifact = self.slot.current().ok_or(TaxiError::ModelUnavailable)?;

        let features = features::encode(&ride);
        let duration = artifact.pipeline.predict(&features);
        debug!(
            zone_pair_key = %features.zone_pair_key,
            trip_distance = features.trip_distance,
            duration,
            "prediction served"
        );
        Ok(PredictionResponse {
            duration,
            model_version: artifact.run_id.to_string(),
        })
    }

    pub fn health(&self) -> HealthReport {
        match self.slot.current() {
            Some(artifact) => HealthReport {
                status: HealthStatus::Ok,
                run_id: artifact.run_id.to_string(),
                model_loaded: true,
            },
            None => HealthReport {
                status: HealthStatus::Degraded,
                run_id: self
                    .run_id
                    .as_ref()
                    .map_or_else(|| UNKNOWN_RUN_ID.to_string(), RunId::to_string),
                model_loaded: false,
            },
        }
    }
}
