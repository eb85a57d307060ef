//! Core trip-record definitions and the corpus source contract.

use crate::common::error::TaxiResult;

/// One historical taxi trip with its observed duration in minutes.
#[derive(Clone, Debug, PartialEq)]
pub struct TripRecord {
    pub pickup_zone_id: u32,
    pub dropoff_zone_id: u32,
    pub trip_distance: f64,
    pub duration_min: f64,
}

impl TripRecord {
    pub fn new(pickup_zone_id: u32, dropoff_zone_id: u32, trip_distance: f64, duration_min: f64) -> Self {
        Self {
            pickup_zone_id,
            dropoff_zone_id,
            trip_distance,
            duration_min,
        }
    }
}

/// Outlier bounds applied before training and simulation.
///
/// Both intervals are open: a trip of exactly 1 minute or 60 minutes is dropped.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TripBounds {
    pub min_duration_min: f64,
    pub max_duration_min: f64,
    pub min_distance: f64,
    pub max_distance: f64,
}

impl Default for TripBounds {
    fn default() -> Self {
        Self {
            min_duration_min: 1.0,
            max_duration_min: 60.0,
            min_distance: 0.0,
            max_distance: 100.0,
        }
    }
}

impl TripBounds {
    pub fn admits(&self, trip: &TripRecord) -> bool {
        trip.duration_min > self.min_duration_min
            && trip.duration_min < self.max_duration_min
            && trip.trip_distance > self.min_distance
            && trip.trip_distance < self.max_distance
    }
}

/// Counters describing how a corpus was filtered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub rows_read: u64,
    pub incomplete: u64,
    pub outliers: u64,
    pub kept: u64,
}

/// Filtered corpus ready for feature encoding.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub trips: Vec<TripRecord>,
    pub stats: CorpusStats,
}

/// Source of raw trips. Rows missing required fields come back as `None`.
pub trait TripSource {
    fn read_trips(&self) -> TaxiResult<Vec<Option<TripRecord>>>;
}

/// In-memory source, handy for tests and synthetic corpora.
impl TripSource for Vec<TripRecord> {
    fn read_trips(&self) -> TaxiResult<Vec<Option<TripRecord>>> {
        Ok(self.iter().cloned().map(Some).collect())
    }
}
