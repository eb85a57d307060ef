//! Domain primitives for the prediction log and drift reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::TaxiResult;

use super::metrics::{RegressionScores, Summary};

/// One served prediction, optionally joined with the observed duration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub ts: DateTime<Utc>,
    #[serde(alias = "PU_DO")]
    pub zone_pair_key: String,
    pub trip_distance: f64,
    pub prediction: Option<f64>,
    #[serde(alias = "duration")]
    pub ground_truth_duration: Option<f64>,
}

impl PredictionLogEntry {
    /// Both the prediction and the ground truth are present and finite.
    pub fn is_complete(&self) -> bool {
        matches!(
            (self.prediction, self.ground_truth_duration),
            (Some(p), Some(t)) if p.is_finite() && t.is_finite()
        )
    }
}

/// Append-only store of prediction log entries.
pub trait PredictionLog {
    /// Durably add `entries` after everything already logged; returns how many were written.
    fn append(&self, entries: &[PredictionLogEntry]) -> TaxiResult<usize>;
    /// Snapshot of the whole log in storage order, `None` if the log does not exist yet.
    fn read_all(&self) -> TaxiResult<Option<Vec<PredictionLogEntry>>>;
}

/// How the log snapshot was partitioned.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WindowSplit {
    pub total_rows: usize,
    pub complete_rows: usize,
    pub split_index: usize,
    pub reference_rows: usize,
    pub current_rows: usize,
    pub reference_span: (DateTime<Utc>, DateTime<Utc>),
    pub current_span: (DateTime<Utc>, DateTime<Utc>),
}

/// Drift of a categorical column between the two windows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoricalDrift {
    pub column: String,
    pub psi: f64,
    pub js_distance: f64,
    pub reference_categories: usize,
    pub current_categories: usize,
    /// Categories present in the current window only.
    pub new_categories: usize,
    /// Categories present in the reference window only.
    pub vanished_categories: usize,
    /// Most frequent categories across both windows: `(key, reference share, current share)`.
    pub top: Vec<(String, f64, f64)>,
}

/// Drift of a numeric column between the two windows.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NumericDrift {
    pub column: String,
    pub ks_statistic: f64,
    pub psi: f64,
    pub wasserstein: f64,
    pub reference: Summary,
    pub current: Summary,
}

/// Regression performance in each window and how it moved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceDrift {
    pub reference: RegressionScores,
    pub current: RegressionScores,
    pub rmse_delta: f64,
    pub mae_delta: f64,
    /// KS statistic between the signed error distributions.
    pub error_ks: f64,
}

/// Everything the monitor measured. Rendered to a document, never persisted as data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub split: WindowSplit,
    pub zone_pair_key: CategoricalDrift,
    pub trip_distance: NumericDrift,
    pub prediction: NumericDrift,
    pub ground_truth_duration: NumericDrift,
    pub performance: PerformanceDrift,
}
