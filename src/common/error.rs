//! Error handling primitives shared across the core.
//!
//! Every failure the crate can surface maps onto one stable [`TaxiCode`]. The
//! HTTP layer and the CLI only ever look at the code, never at the message.

use std::io;

use thiserror::Error;

/// Stable error codes surfaced to operators and HTTP clients.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaxiCode {
    /// Request payload violated the ride constraints.
    Validation = 1,
    /// The prediction service has no model loaded.
    ModelUnavailable = 2,
    /// No artefact exists under the requested run identifier.
    ArtifactNotFound = 3,
    /// Stored artefact bytes could not be turned back into a pipeline.
    ArtifactCorrupt = 4,
    /// Prediction log is missing or has too few complete rows.
    EmptyLog = 5,
    /// Fitting could not produce a model (e.g. empty training set).
    TrainingFailed = 6,
    /// Configuration values were missing or malformed.
    Config = 7,
    /// Local filesystem failure.
    Io = 8,
    /// Remote call failed or timed out.
    Transport = 9,
}

impl TaxiCode {
    /// Upper-snake identifier used in JSON error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxiCode::Validation => "VALIDATION_ERROR",
            TaxiCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            TaxiCode::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            TaxiCode::ArtifactCorrupt => "ARTIFACT_CORRUPT",
            TaxiCode::EmptyLog => "EMPTY_LOG",
            TaxiCode::TrainingFailed => "TRAINING_FAILED",
            TaxiCode::Config => "CONFIG_ERROR",
            TaxiCode::Io => "IO_ERROR",
            TaxiCode::Transport => "TRANSPORT_ERROR",
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaxiCode::Io | TaxiCode::Transport)
    }
}

/// Canonical error type for the crate.
#[derive(Debug, Error)]
pub enum TaxiError {
    #[error("invalid ride request: {0}")]
    Validation(String),

    #[error("model not loaded, check /health")]
    ModelUnavailable,

    #[error("no artifact stored for run {0}")]
    ArtifactNotFound(String),

    #[error("artifact for run {run_id} is corrupt: {reason}")]
    ArtifactCorrupt { run_id: String, reason: String },

    #[error("no complete prediction rows to monitor ({0}); run the simulator first")]
    EmptyLog(String),

    #[error("training failed: {0}")]
    TrainingFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result alias used throughout the crate.
pub type TaxiResult<T> = Result<T, TaxiError>;

impl TaxiError {
    /// Stable code for this error.
    pub fn code(&self) -> TaxiCode {
        match self {
            TaxiError::Validation(_) => TaxiCode::Validation,
            TaxiError::ModelUnavailable => TaxiCode::ModelUnavailable,
            TaxiError::ArtifactNotFound(_) => TaxiCode::ArtifactNotFound,
            TaxiError::ArtifactCorrupt { .. } => TaxiCode::ArtifactCorrupt,
            TaxiError::EmptyLog(_) => TaxiCode::EmptyLog,
            TaxiError::TrainingFailed(_) => TaxiCode::TrainingFailed,
            TaxiError::Config(_) => TaxiCode::Config,
            TaxiError::Io { .. } => TaxiCode::Io,
            TaxiError::Transport(_) => TaxiCode::Transport,
        }
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        TaxiError::Validation(msg.into())
    }

    /// Corrupt artefact helper.
    pub fn corrupt(run_id: impl Into<String>, reason: impl Into<String>) -> Self {
        TaxiError::ArtifactCorrupt {
            run_id: run_id.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an IO error together with the path it happened on.
    pub fn io(path: impl AsRef<std::path::Path>, source: io::Error) -> Self {
        TaxiError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(TaxiCode::Validation as u32, 1);
        assert_eq!(TaxiCode::ModelUnavailable as u32, 2);
        assert_eq!(TaxiCode::ArtifactNotFound as u32, 3);
        assert_eq!(TaxiCode::ArtifactCorrupt as u32, 4);
        assert_eq!(TaxiCode::EmptyLog as u32, 5);
        assert_eq!(TaxiCode::TrainingFailed as u32, 6);
        assert_eq!(TaxiCode::Config as u32, 7);
        assert_eq!(TaxiCode::Io as u32, 8);
        assert_eq!(TaxiCode::Transport as u32, 9);
    }

    #[test]
    fn only_io_and_transport_are_retryable() {
        assert!(TaxiCode::Io.is_retryable());
        assert!(TaxiCode::Transport.is_retryable());
        assert!(!TaxiCode::ArtifactCorrupt.is_retryable());
        assert!(!TaxiCode::Validation.is_retryable());
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(TaxiError::invalid("x").code(), TaxiCode::Validation);
        assert_eq!(TaxiError::corrupt("r", "bad").code(), TaxiCode::ArtifactCorrupt);
        let io = TaxiError::io("a.csv", io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(io.code(), TaxiCode::Io);
        assert!(io.to_string().contains("a.csv"));
    }
}
