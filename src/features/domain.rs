//! Feature encoding shared by training and serving.
//!
//! [`encode`] is the only place a zone pair key is built. Training and the
//! prediction service both call it, so the key bytes cannot diverge.

use serde::{Deserialize, Serialize};

/// Anything that carries the three raw ride fields the model consumes.
pub trait RideFields {
    fn pickup_zone_id(&self) -> u32;
    fn dropoff_zone_id(&self) -> u32;
    fn trip_distance(&self) -> f64;
}

impl RideFields for crate::data::TripRecord {
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

/// Model input for one ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub zone_pair_key: String,
    pub trip_distance: f64,
}

/// Build the categorical `"{pickup}_{dropoff}"` token.
pub fn zone_pair_key(pickup_zone_id: u32, dropoff_zone_id: u32) -> String {
    format!("{pickup_zone_id}_{dropoff_zone_id}")
}

/// Encode a ride into its feature representation.
pub fn encode<R: RideFields + ?Sized>(ride: &R) -> FeatureVector {
    FeatureVector {
        zone_pair_key: zone_pair_key(ride.pickup_zone_id(), ride.dropoff_zone_id()),
        trip_distance: ride.trip_distance(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TripRecord;

    #[test]
    fn key_is_pickup_underscore_dropoff() {
        assert_eq!(zone_pair_key(138, 236), "138_236");
        assert_ne!(zone_pair_key(13, 8236), zone_pair_key(138, 236));
    }

    #[test]
    fn encode_is_deterministic() {
        let trip = TripRecord::new(7, 42, 3.25, 11.0);
        let first = encode(&trip);
        for _ in 0..10 {
            assert_eq!(encode(&trip), first);
        }
        assert_eq!(first.trip_distance, 3.25);
    }
}
