//! Request, response and state types of the prediction service.

use std::sync::{Arc, PoisonError, RwLock};

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::error::{TaxiError, TaxiResult};
use crate::features::RideFields;
use crate::training::domain::ModelArtifact;

/// Inbound ride description as received on the wire.
///
/// Zone identifiers are read as signed integers so that zero and negative
/// values reach [`RideRequest::validate`] and are rejected there instead of
/// failing deserialisation with a less specific message. Integral floats such
/// as `138.0` are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    #[serde(alias = "PULocationID", deserialize_with = "whole_number")]
    pub pickup_zone_id: i64,
    #[serde(alias = "DOLocationID", deserialize_with = "whole_number")]
    pub dropoff_zone_id: i64,
    pub trip_distance: f64,
}

struct WholeNumber;

impl<'de> Visitor<'de> for WholeNumber {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer zone id")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        // 2^63 is exact in f64; anything at or past it does not fit.
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 9_223_372_036_854_775_808.0 {
            Ok(v as i64)
        } else {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }
    }
}

fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    deserializer.deserialize_any(WholeNumber)
}

/// A ride that passed boundary validation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ValidRide {
    pickup_zone_id: u32,
    dropoff_zone_id: u32,
    trip_distance: f64,
}

fn zone_id(field: &str, value: i64) -> TaxiResult<u32> {
    if value < 1 {
        return Err(TaxiError::invalid(format!("{field} must be >= 1, got {value}")));
    }
    u32::try_from(value).map_err(|_| TaxiError::invalid(format!("{field} out of range: {value}")))
}

impl RideRequest {
    pub fn new(pickup_zone_id: i64, dropoff_zone_id: i64, trip_distance: f64) -> Self {
        Self {
            pickup_zone_id,
            dropoff_zone_id,
            trip_distance,
        }
    }

    /// Check field constraints: both zone ids `>= 1`, distance finite and `> 0`.
    pub fn validate(&self) -> TaxiResult<ValidRide> {
        let pickup_zone_id = zone_id("pickup_zone_id", self.pickup_zone_id)?;
        let dropoff_zone_id = zone_id("dropoff_zone_id", self.dropoff_zone_id)?;
        if !self.trip_distance.is_finite() || self.trip_distance <= 0.0 {
            return Err(TaxiError::invalid(format!(
                "trip_distance must be > 0, got {}",
                self.trip_distance
            )));
        }
        Ok(ValidRide {
            pickup_zone_id,
            dropoff_zone_id,
            trip_distance: self.trip_distance,
        })
    }
}

impl RideFields for ValidRide {
    fn pickup_zone_id(&self) -> u32 {
        self.pickup_zone_id
    }

    fn dropoff_zone_id(&self) -> u32 {
        self.dropoff_zone_id
    }

    fn trip_distance(&self) -> f64 {
        self.trip_distance
    }
}

/// Successful prediction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Estimated duration in minutes.
    pub duration: f64,
    /// Run id of the artefact that produced the estimate.
    pub model_version: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// Body of `GET /health`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub run_id: String,
    pub model_loaded: bool,
}

pub const UNKNOWN_RUN_ID: &str = "unknown";

/// Holder of the artefact currently being served.
///
/// Readers clone the inner `Arc` and release the lock immediately, so a
/// prediction never holds the lock while the model runs. A swap replaces the
/// handle as a whole; the artefact itself is never mutated.
#[derive(Debug, Default)]
pub struct ModelSlot {
    current: RwLock<Option<Arc<ModelArtifact>>>,
}

impl ModelSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loaded(artifact: ModelArtifact) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(artifact))),
        }
    }

    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `artifact`, returning the handle it displaced.
    pub fn replace(&self, artifact: ModelArtifact) -> Option<Arc<ModelArtifact>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(Arc::new(artifact))
    }
}
