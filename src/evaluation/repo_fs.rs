//! CSV-backed prediction log.
//!
//! Appends never rewrite existing rows. Each batch is encoded into a single
//! buffer and written with one `write_all` on an `O_APPEND` handle, so
//! independent writers interleave whole batches instead of losing them. The
//! header line is published together with file creation by hard-linking a
//! prepared temp file into place.
//!
//! A batch cut short by a crash leaves a torn last line. The next append
//! terminates it first, and readers skip records that do not parse.
//!
//! [`FsPredictionLog::compact`] rewrites the file and must not run while other
//! processes are appending.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::error::{TaxiError, TaxiResult};

use super::domain::{PredictionLog, PredictionLogEntry};

pub const LOG_HEADER: &str = "ts,zone_pair_key,trip_distance,prediction,ground_truth_duration";

/// Prediction log stored as one CSV file.
pub struct FsPredictionLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FsPredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scratch_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "predictions.csv".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
    }

    fn ensure_parent(&self) -> TaxiResult<()> {
        match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => fs::create_dir_all(dir).map_err(|e| TaxiError::io(dir, e)),
            None => Ok(()),
        }
    }

    /// Create the file with its header unless it already exists.
    fn ensure_file(&self) -> TaxiResult<()> {
        if self.path.exists() {
            return Ok(());
        }
        self.ensure_parent()?;
        let scratch = self.scratch_path();
        fs::write(&scratch, format!("{LOG_HEADER}\n")).map_err(|e| TaxiError::io(&scratch, e))?;
        let linked = fs::hard_link(&scratch, &self.path);
        let _ = fs::remove_file(&scratch);
        match linked {
            Ok(()) => {
                debug!(path = %self.path.display(), "prediction log created");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(TaxiError::io(&self.path, e)),
        }
    }

    /// Rewrite the log sorted by timestamp; returns the number of rows kept.
    pub fn compact(&self) -> TaxiResult<usize> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut entries) = self.read_all()? else {
            return Ok(0);
        };
        entries.sort_by_key(|e| e.ts);

        let mut buf = format!("{LOG_HEADER}\n").into_bytes();
        buf.extend(encode_rows(&entries, &self.path)?);
        let scratch = self.scratch_path();
        fs::write(&scratch, &buf).map_err(|e| TaxiError::io(&scratch, e))?;
        fs::rename(&scratch, &self.path).map_err(|e| TaxiError::io(&self.path, e))?;

        info!(path = %self.path.display(), rows = entries.len(), "prediction log compacted");
        Ok(entries.len())
    }
}

fn encode_rows(entries: &[PredictionLogEntry], path: &Path) -> TaxiResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for entry in entries {
        writer
            .serialize(entry)
            .map_err(|e| TaxiError::io(path, io::Error::from(e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| TaxiError::io(path, io::Error::new(e.error().kind(), e.error().to_string())))
}

/// True when the file is empty or its last byte is a newline.
fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl PredictionLog for FsPredictionLog {
    fn append(&self, entries: &[PredictionLogEntry]) -> TaxiResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let rows = encode_rows(entries, &self.path)?;

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_file()?;
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TaxiError::io(&self.path, e))?;
        let mut buf = Vec::with_capacity(rows.len() + 1);
        if !ends_with_newline(&mut file).map_err(|e| TaxiError::io(&self.path, e))? {
            warn!(path = %self.path.display(), "terminating torn last line before append");
            buf.push(b'\n');
        }
        buf.extend(rows);
        file.write_all(&buf)
            .and_then(|_| file.sync_data())
            .map_err(|e| TaxiError::io(&self.path, e))?;

        debug!(path = %self.path.display(), rows = entries.len(), "prediction log appended");
        Ok(entries.len())
    }

    fn read_all(&self) -> TaxiResult<Option<Vec<PredictionLogEntry>>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TaxiError::io(&self.path, e)),
        };
        let mut reader = csv::Reader::from_reader(io::BufReader::new(file));
        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for record in reader.deserialize::<PredictionLogEntry>() {
            match record {
                Ok(entry) => entries.push(entry),
                Err(e) if e.is_io_error() => {
                    return Err(TaxiError::io(&self.path, io::Error::from(e)))
                }
                Err(e) => {
                    skipped += 1;
                    warn!(path = %self.path.display(), error = %e, "skipping malformed log record");
                }
            }
        }
        if skipped > 0 {
            info!(path = %self.path.display(), kept = entries.len(), skipped, "prediction log read");
        }
        Ok(Some(entries))
    }
}
