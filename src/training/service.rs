//! Service layer orchestrating a training run from raw corpus to registered artefact.

use std::path::Path;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::common::error::{TaxiError, TaxiResult};
use crate::common::time;
use crate::data::domain::{TripBounds, TripRecord, TripSource};
use crate::data::service as data_service;
use crate::evaluation::metrics;
use crate::features::{self, DictVectorizer, FeatureVector};

use super::domain::{
    ArtifactStore, ModelArtifact, ModelPipeline, RunId, RunMetrics, RunRecord, TrainConfig,
    TrainOutcome,
};
use super::regressor::GradientBoostedTrees;
use super::repo_fs;

/// Pipeline fitted in memory together with its validation scores.
#[derive(Clone, Debug)]
pub struct FittedPipeline {
    pub pipeline: ModelPipeline,
    pub metrics: RunMetrics,
    pub train_rows: usize,
    pub val_rows: usize,
}

/// Seeded shuffle followed by a tail cut: the last `ceil(n * val_fraction)` rows validate.
pub fn split_indices(n: usize, val_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);
    let n_val = ((n as f64) * val_fraction).ceil() as usize;
    let val = idx.split_off(n - n_val.min(n));
    (idx, val)
}

/// Fit a pipeline on already filtered trips and evaluate it. Nothing is persisted.
pub fn fit_pipeline(trips: &[TripRecord], cfg: &TrainConfig) -> TaxiResult<FittedPipeline> {
    if trips.is_empty() {
        return Err(TaxiError::TrainingFailed(
            "no trips left after outlier filtering".into(),
        ));
    }

    let encoded: Vec<FeatureVector> = trips.iter().map(features::encode).collect();
    let targets: Vec<f64> = trips.iter().map(|t| t.duration_min).collect();

    // The vocabulary covers the whole filtered corpus, validation rows included.
    let mut vectorizer = DictVectorizer::default();
    vectorizer.fit(&encoded);

    let (train_idx, val_idx) = split_indices(trips.len(), cfg.val_fraction, cfg.split_seed);
    if train_idx.is_empty() || val_idx.is_empty() {
        return Err(TaxiError::TrainingFailed(format!(
            "split of {} rows left an empty subset (train={}, val={})",
            trips.len(),
            train_idx.len(),
            val_idx.len()
        )));
    }

    let train_rows: Vec<_> = train_idx
        .iter()
        .map(|&i| vectorizer.transform(&encoded[i]))
        .collect();
    let train_y: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();

    let started = Instant::now();
    let regressor =
        GradientBoostedTrees::fit(&cfg.params, &train_rows, &train_y, vectorizer.n_features())?;
    info!(
        trees = regressor.n_trees(),
        features = vectorizer.n_features(),
        train_rows = train_idx.len(),
        dur_ms = time::elapsed_ms(started) as u64,
        "regressor fitted"
    );

    let pipeline = ModelPipeline {
        vectorizer,
        regressor,
    };
    let val_y: Vec<f64> = val_idx.iter().map(|&i| targets[i]).collect();
    let val_pred: Vec<f64> = val_idx.iter().map(|&i| pipeline.predict(&encoded[i])).collect();
    let scores = metrics::regression_scores(&val_y, &val_pred);

    Ok(FittedPipeline {
        pipeline,
        metrics: RunMetrics {
            rmse: scores.rmse,
            mae: scores.mae,
            r2: scores.r2,
        },
        train_rows: train_idx.len(),
        val_rows: val_idx.len(),
    })
}

/// Run the full training job and register its artefact.
///
/// Nothing is written unless fitting succeeds; the artefact is saved before the
/// run record, and the run-id file is written last.
pub fn train(
    source: &dyn TripSource,
    store: &dyn ArtifactStore,
    run_id_path: &Path,
    cfg: &TrainConfig,
) -> TaxiResult<TrainOutcome> {
    cfg.params.validate()?;
    let corpus = data_service::load_corpus(source, &TripBounds::default(), cfg.row_limit)?;
    let FittedPipeline {
        pipeline,
        metrics,
        train_rows,
        val_rows,
    } = fit_pipeline(&corpus.trips, cfg)?;
    info!(
        rmse = metrics.rmse,
        mae = metrics.mae,
        r2 = metrics.r2,
        "validation metrics"
    );

    let run_id = RunId::mint();
    let artifact_uri = store.save(&run_id, &pipeline)?;

    let mut hyperparameters = cfg.params.to_map();
    hyperparameters.insert("val_fraction".into(), cfg.val_fraction.to_string());
    hyperparameters.insert("split_seed".into(), cfg.split_seed.to_string());

    let record = RunRecord {
        run_id: run_id.clone(),
        created_at: time::now_utc(),
        experiment: cfg.experiment.clone(),
        hyperparameters,
        metrics,
        train_rows,
        val_rows,
        artifact_uri,
    };
    store.save_run(&record)?;
    repo_fs::write_run_id(run_id_path, &run_id)?;
    info!(run_id = %run_id, path = %run_id_path.display(), "run id published");

    Ok(TrainOutcome {
        record,
        artifact: ModelArtifact { run_id, pipeline },
    })
}
