//! Filesystem artefact store and the run-id side channel.
//!
//! Layout under the tracking root:
//!
//! ```text
//! runs/<run_id>/model/artifact.json   checksummed envelope around the pipeline
//! runs/<run_id>/run.json              RunRecord
//! ```
//!
//! Artefacts are write-once: saving over an existing run fails.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::error::{TaxiError, TaxiResult};
use crate::common::ids;

use super::domain::{ArtifactStore, ModelArtifact, ModelPipeline, RunId, RunRecord};

const ARTIFACT_FORMAT: &str = "taxi-duration/pipeline";
const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    format: String,
    format_version: u32,
    checksum: String,
    payload: String,
}

/// Persist artefacts and run records on the local filesystem.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build a store from a tracking URI: `file://<path>` or a bare path.
    pub fn from_uri(uri: &str) -> TaxiResult<Self> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Self::new(path));
        }
        if uri.contains("://") {
            return Err(TaxiError::Config(format!(
                "unsupported tracking uri {uri:?}; only file:// stores are available"
            )));
        }
        Ok(Self::new(uri))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join("runs").join(run_id.as_str())
    }

    pub fn artifact_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("model").join("artifact.json")
    }

    fn record_path(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join("run.json")
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, run_id: &RunId, pipeline: &ModelPipeline) -> TaxiResult<String> {
        let path = self.artifact_path(run_id);
        let payload = serde_json::to_string(pipeline)
            .map_err(|e| TaxiError::corrupt(run_id.as_str(), e.to_string()))?;
        let envelope = ArtifactEnvelope {
            format: ARTIFACT_FORMAT.to_string(),
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: ids::checksum(payload.as_bytes()),
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| TaxiError::corrupt(run_id.as_str(), e.to_string()))?;

        write_once(&path, &bytes)?;
        info!(run_id = %run_id, path = %path.display(), bytes = bytes.len(), "artifact saved");
        Ok(format!("file://{}", path.display()))
    }

    fn load(&self, run_id: &RunId) -> TaxiResult<ModelArtifact> {
        let path = self.artifact_path(run_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TaxiError::ArtifactNotFound(run_id.to_string()));
            }
            Err(e) => return Err(TaxiError::io(&path, e)),
        };

        let corrupt = |reason: String| TaxiError::corrupt(run_id.as_str(), reason);
        let envelope: ArtifactEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("envelope: {e}")))?;
        if envelope.format != ARTIFACT_FORMAT {
            return Err(corrupt(format!("unexpected format {:?}", envelope.format)));
        }
        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                envelope.format_version
            )));
        }
        if ids::checksum(envelope.payload.as_bytes()) != envelope.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let pipeline: ModelPipeline = serde_json::from_str(&envelope.payload)
            .map_err(|e| corrupt(format!("payload: {e}")))?;
        pipeline.check().map_err(corrupt)?;

        debug!(run_id = %run_id, trees = pipeline.regressor.n_trees(), "artifact decoded");
        Ok(ModelArtifact {
            run_id: run_id.clone(),
            pipeline,
        })
    }

    fn save_run(&self, record: &RunRecord) -> TaxiResult<()> {
        let path = self.record_path(&record.run_id);
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| TaxiError::corrupt(record.run_id.as_str(), e.to_string()))?;
        write_once(&path, &bytes)
    }

    fn load_run(&self, run_id: &RunId) -> TaxiResult<RunRecord> {
        let path = self.record_path(run_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TaxiError::ArtifactNotFound(run_id.to_string()));
            }
            Err(e) => return Err(TaxiError::io(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| TaxiError::corrupt(run_id.as_str(), format!("run record: {e}")))
    }
}

/// Write `bytes` to a fresh sibling temp file, then rename into place.
/// Fails with `AlreadyExists` if `path` is already present.
fn write_once(path: &Path, bytes: &[u8]) -> TaxiResult<()> {
    if path.exists() {
        return Err(TaxiError::io(
            path,
            io::Error::new(io::ErrorKind::AlreadyExists, "artifacts are write-once"),
        ));
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| TaxiError::io(dir, e))?;

    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .map_err(|e| TaxiError::io(&tmp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| TaxiError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| TaxiError::io(path, e))
}

/// Write the run-id side channel: one line, overwritten on every training run.
pub fn write_run_id(path: &Path, run_id: &RunId) -> TaxiResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| TaxiError::io(dir, e))?;
    }
    fs::write(path, format!("{run_id}\n")).map_err(|e| TaxiError::io(path, e))
}

/// Read the run id written by the last training run.
pub fn read_run_id(path: &Path) -> TaxiResult<RunId> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Err(TaxiError::ArtifactNotFound(format!(
            "empty run id file {}",
            path.display()
        ))),
        Ok(raw) => RunId::parse(&raw),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TaxiError::ArtifactNotFound(
            format!("missing run id file {}", path.display()),
        )),
        Err(e) => Err(TaxiError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TaxiCode;
    use crate::features::{DictVectorizer, FeatureVector};
    use crate::training::regressor::{BoostParams, GradientBoostedTrees};

    fn fv(key: &str, d: f64) -> FeatureVector {
        FeatureVector {
            zone_pair_key: key.to_string(),
            trip_distance: d,
        }
    }

    fn pipeline() -> ModelPipeline {
        let corpus = vec![fv("1_2", 1.0), fv("1_2", 2.0), fv("3_4", 5.0), fv("3_4", 6.0)];
        let mut vectorizer = DictVectorizer::default();
        vectorizer.fit(&corpus);
        let rows = vectorizer.transform_all(&corpus);
        let params = BoostParams {
            n_estimators: 10,
            max_depth: 2,
            subsample: 1.0,
            ..BoostParams::default()
        };
        let regressor =
            GradientBoostedTrees::fit(&params, &rows, &[4.0, 6.0, 15.0, 17.0], vectorizer.n_features())
                .unwrap();
        ModelPipeline {
            vectorizer,
            regressor,
        }
    }

    #[test]
    fn round_trip_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::mint();
        let original = pipeline();
        let query = fv("3_4", 5.5);

        let uri = store.save(&run_id, &original).unwrap();
        assert!(uri.starts_with("file://"));
        let loaded = store.load(&run_id).unwrap();

        assert_eq!(loaded.run_id, run_id);
        assert_eq!(loaded.pipeline.predict(&query), original.predict(&query));
    }

    #[test]
    fn reloaded_pipeline_is_bit_identical() {
        let corpus: Vec<FeatureVector> = (0..400u32)
            .map(|i| {
                let key = format!("{}_{}", 1 + i % 17, 100 + i % 5);
                fv(&key, 0.37 + f64::from(i % 53) * 0.173 + f64::from(i) * 1e-3)
            })
            .collect();
        let targets: Vec<f64> = corpus
            .iter()
            .enumerate()
            .map(|(i, f)| 3.1 + f.trip_distance * 2.9 + (i % 7) as f64 * 0.61)
            .collect();
        let mut vectorizer = DictVectorizer::default();
        vectorizer.fit(&corpus);
        let rows = vectorizer.transform_all(&corpus);
        let params = BoostParams {
            n_estimators: 60,
            max_depth: 6,
            ..BoostParams::default()
        };
        let regressor =
            GradientBoostedTrees::fit(&params, &rows, &targets, vectorizer.n_features()).unwrap();
        let original = ModelPipeline {
            vectorizer,
            regressor,
        };

        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::mint();
        store.save(&run_id, &original).unwrap();
        let loaded = store.load(&run_id).unwrap().pipeline;

        assert_eq!(loaded, original);
        for f in &corpus {
            assert_eq!(
                loaded.predict(f).to_bits(),
                original.predict(f).to_bits(),
                "{f:?}"
            );
        }
    }

    #[test]
    fn missing_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let err = store.load(&RunId::mint()).unwrap_err();
        assert_eq!(err.code(), TaxiCode::ArtifactNotFound);
    }

    #[test]
    fn tampered_payload_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::mint();
        store.save(&run_id, &pipeline()).unwrap();

        let path = store.artifact_path(&run_id);
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replacen("1_2", "1_9", 1)).unwrap();
        assert_eq!(store.load(&run_id).unwrap_err().code(), TaxiCode::ArtifactCorrupt);

        fs::write(&path, b"not json").unwrap();
        assert_eq!(store.load(&run_id).unwrap_err().code(), TaxiCode::ArtifactCorrupt);
    }

    #[test]
    fn artifacts_are_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::mint();
        store.save(&run_id, &pipeline()).unwrap();
        assert_eq!(store.save(&run_id, &pipeline()).unwrap_err().code(), TaxiCode::Io);
    }

    #[test]
    fn tracking_uri_schemes() {
        assert_eq!(
            FsArtifactStore::from_uri("file:///tmp/mlruns").unwrap().root(),
            Path::new("/tmp/mlruns")
        );
        assert_eq!(FsArtifactStore::from_uri("mlruns").unwrap().root(), Path::new("mlruns"));
        assert!(FsArtifactStore::from_uri("http://localhost:5000").is_err());
    }

    #[test]
    fn run_id_side_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_id.txt");
        assert_eq!(read_run_id(&path).unwrap_err().code(), TaxiCode::ArtifactNotFound);

        let run_id = RunId::mint();
        write_run_id(&path, &run_id).unwrap();
        assert_eq!(read_run_id(&path).unwrap(), run_id);

        fs::write(&path, "   \n").unwrap();
        assert_eq!(read_run_id(&path).unwrap_err().code(), TaxiCode::ArtifactNotFound);
    }
}
