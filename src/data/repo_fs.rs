//! CSV-backed trip source.
//!
//! Accepts either a precomputed `duration` column (minutes) or the raw
//! `tpep_pickup_datetime`/`tpep_dropoff_datetime` pair, from which the
//! duration is derived.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::common::error::{TaxiError, TaxiResult};

use super::domain::{TripRecord, TripSource};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Deserialize)]
struct RawTripRow {
    #[serde(rename = "PULocationID", default)]
    pickup_zone_id: Option<u32>,
    #[serde(rename = "DOLocationID", default)]
    dropoff_zone_id: Option<u32>,
    #[serde(default)]
    trip_distance: Option<f64>,
    #[serde(default)]
    tpep_pickup_datetime: Option<String>,
    #[serde(default)]
    tpep_dropoff_datetime: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl RawTripRow {
    fn into_record(self) -> Option<TripRecord> {
        let duration_min = match self.duration {
            Some(d) => d,
            None => {
                let start = parse_datetime(self.tpep_pickup_datetime.as_deref()?)?;
                let end = parse_datetime(self.tpep_dropoff_datetime.as_deref()?)?;
                (end - start).num_milliseconds() as f64 / 60_000.0
            }
        };

        Some(TripRecord::new(
            self.pickup_zone_id?,
            self.dropoff_zone_id?,
            self.trip_distance?,
            duration_min,
        ))
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

/// Trip source reading a CSV export from disk.
pub struct CsvTripSource {
    path: PathBuf,
}

impl CsvTripSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TripSource for CsvTripSource {
    fn read_trips(&self) -> TaxiResult<Vec<Option<TripRecord>>> {
        let file = File::open(&self.path).map_err(|e| TaxiError::io(&self.path, e))?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let mut out = Vec::new();
        for row in reader.deserialize::<RawTripRow>() {
            let row = row.map_err(|e| TaxiError::io(&self.path, io::Error::from(e)))?;
            out.push(row.into_record());
        }
        Ok(out)
    }
}
