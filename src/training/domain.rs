//! Domain types for model training, run bookkeeping and artefact storage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{TaxiError, TaxiResult};
use crate::features::{DictVectorizer, FeatureVector};

use super::regressor::{BoostParams, GradientBoostedTrees};

/// Opaque identifier of one completed training run and its artefact.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Mint a fresh identifier (32 lowercase hex characters).
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept an externally supplied identifier. Only `[0-9A-Za-z_-]` is allowed
    /// since the identifier doubles as a directory name in the artefact store.
    pub fn parse(raw: &str) -> TaxiResult<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(TaxiError::Config(format!("malformed run id {raw:?}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = TaxiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RunId::parse(&value)
    }
}

impl From<RunId> for String {
    fn from(value: RunId) -> Self {
        value.0
    }
}

/// Encoder and regressor bundled as one unit; the only thing that is ever persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPipeline {
    pub vectorizer: DictVectorizer,
    pub regressor: GradientBoostedTrees,
}

impl ModelPipeline {
    /// Predicted duration in minutes for one encoded ride.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.regressor.predict(&self.vectorizer.transform(features))
    }

    pub fn predict_all(&self, features: &[FeatureVector]) -> Vec<f64> {
        features.iter().map(|f| self.predict(f)).collect()
    }

    /// Reject pipelines whose parts do not fit together.
    pub fn check(&self) -> Result<(), String> {
        if self.regressor.n_features() != self.vectorizer.n_features() {
            return Err(format!(
                "regressor expects {} features, vectorizer yields {}",
                self.regressor.n_features(),
                self.vectorizer.n_features()
            ));
        }
        self.regressor.check()
    }
}

/// Loaded, immutable artefact tagged with the run that produced it.
#[derive(Clone, Debug)]
pub struct ModelArtifact {
    pub run_id: RunId,
    pub pipeline: ModelPipeline,
}

/// Validation metrics recorded for a run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Append-only record describing one training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub experiment: String,
    pub hyperparameters: BTreeMap<String, String>,
    pub metrics: RunMetrics,
    pub train_rows: usize,
    pub val_rows: usize,
    pub artifact_uri: String,
}

/// Training job configuration.
#[derive(Clone, Debug)]
pub struct TrainConfig {
    pub experiment: String,
    pub params: BoostParams,
    pub val_fraction: f64,
    pub split_seed: u64,
    pub row_limit: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            experiment: "nyc-taxi-duration".to_string(),
            params: BoostParams::default(),
            val_fraction: 0.2,
            split_seed: 42,
            row_limit: Some(100_000),
        }
    }
}

/// Outcome of a successful training run.
#[derive(Clone, Debug)]
pub struct TrainOutcome {
    pub record: RunRecord,
    pub artifact: ModelArtifact,
}

/// Storage contract for artefacts and run records, addressed by run id.
pub trait ArtifactStore: Send + Sync {
    /// Persist the pipeline and return its URI.
    fn save(&self, run_id: &RunId, pipeline: &ModelPipeline) -> TaxiResult<String>;
    /// Load a pipeline; `ArtifactNotFound` if absent, `ArtifactCorrupt` if undecodable.
    fn load(&self, run_id: &RunId) -> TaxiResult<ModelArtifact>;
    fn save_run(&self, record: &RunRecord) -> TaxiResult<()>;
    fn load_run(&self, run_id: &RunId) -> TaxiResult<RunRecord>;
}
