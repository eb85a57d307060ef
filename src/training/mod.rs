//! Training domain: regressor, artefact lifecycle and the training job.

pub mod domain;
pub mod regressor;
pub mod repo_fs;
pub mod service;

pub use domain::{
    ArtifactStore, ModelArtifact, ModelPipeline, RunId, RunMetrics, RunRecord, TrainConfig,
    TrainOutcome,
};
pub use regressor::{BoostParams, GradientBoostedTrees};
pub use repo_fs::{read_run_id, write_run_id, FsArtifactStore};
