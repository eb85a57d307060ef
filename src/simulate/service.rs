//! Replays sampled trips against a running prediction service and logs the results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::common::error::TaxiResult;
use crate::common::time;
use crate::data::domain::{TripBounds, TripRecord, TripSource};
use crate::data::service as data_service;
use crate::evaluation::domain::{PredictionLog, PredictionLogEntry};
use crate::features;
use crate::inference::domain::{PredictionResponse, RideRequest};

use super::client::{PredictClient, DEFAULT_TIMEOUT};

#[derive(Clone, Debug)]
pub struct SimulationCfg {
    pub api_url: String,
    pub rows: usize,
    pub pause: Duration,
    pub seed: u64,
    pub timeout: Duration,
}

impl SimulationCfg {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            rows: 100,
            pause: Duration::from_millis(50),
            seed: 42,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationSummary {
    pub sent: usize,
    pub failed: usize,
    pub logged: usize,
}

pub fn ride_for(trip: &TripRecord) -> RideRequest {
    RideRequest::new(
        i64::from(trip.pickup_zone_id),
        i64::from(trip.dropoff_zone_id),
        trip.trip_distance,
    )
}

/// Join a served prediction with the trip it was made for.
pub fn log_entry(
    trip: &TripRecord,
    response: &PredictionResponse,
    ts: DateTime<Utc>,
) -> PredictionLogEntry {
    PredictionLogEntry {
        ts,
        zone_pair_key: features::encode(trip).zone_pair_key,
        trip_distance: trip.trip_distance,
        prediction: Some(response.duration),
        ground_truth_duration: Some(trip.duration_min),
    }
}

/// Sample trips, send each to the service and append all answers to `log` in one batch.
///
/// Failed requests are skipped. Nothing is written when every request failed.
pub async fn run_simulation(
    source: &dyn TripSource,
    log: &dyn PredictionLog,
    cfg: &SimulationCfg,
) -> TaxiResult<SimulationSummary> {
    let corpus = data_service::load_corpus(source, &TripBounds::default(), None)?;
    let trips = data_service::sample(&corpus.trips, cfg.rows, cfg.seed);
    let client = PredictClient::new(&cfg.api_url, cfg.timeout)?;
    info!(endpoint = client.endpoint(), rows = trips.len(), "simulation started");

    let mut summary = SimulationSummary::default();
    let mut entries = Vec::with_capacity(trips.len());
    for (i, trip) in trips.iter().enumerate() {
        summary.sent += 1;
        match client.predict(&ride_for(trip)).await {
            Ok(response) => entries.push(log_entry(trip, &response, time::now_utc())),
            Err(e) => {
                summary.failed += 1;
                warn!(
                    row = i,
                    code = e.code().as_str(),
                    retryable = e.code().is_retryable(),
                    error = %e,
                    "prediction request failed"
                );
            }
        }
        if (i + 1) % 20 == 0 {
            info!(done = i + 1, total = trips.len(), "simulation progress");
        }
        if !cfg.pause.is_zero() && i + 1 < trips.len() {
            tokio::time::sleep(cfg.pause).await;
        }
    }

    if entries.is_empty() {
        warn!(sent = summary.sent, "no predictions collected, log left untouched");
        return Ok(summary);
    }
    summary.logged = log.append(&entries)?;
    info!(
        sent = summary.sent,
        failed = summary.failed,
        logged = summary.logged,
        "simulation finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::repo_fs::FsPredictionLog;
    use chrono::TimeZone;

    #[test]
    fn entry_carries_key_and_ground_truth() {
        let trip = TripRecord::new(138, 236, 2.5, 11.0);
        let response = PredictionResponse {
            duration: 10.5,
            model_version: "abc".into(),
        };
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = log_entry(&trip, &response, ts);
        assert_eq!(entry.zone_pair_key, "138_236");
        assert_eq!(entry.prediction, Some(10.5));
        assert_eq!(entry.ground_truth_duration, Some(11.0));
        assert!(entry.is_complete());
    }

    #[test]
    fn ride_uses_trip_fields() {
        let ride = ride_for(&TripRecord::new(7, 9, 1.25, 5.0));
        assert_eq!(ride, RideRequest::new(7, 9, 1.25));
    }

    #[tokio::test]
    async fn unreachable_service_writes_nothing() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let dir = tempfile::tempdir().unwrap();
        let log = FsPredictionLog::new(dir.path().join("predictions.csv"));
        let cfg = SimulationCfg {
            rows: 3,
            pause: Duration::ZERO,
            timeout: Duration::from_millis(500),
            ..SimulationCfg::new(format!("http://127.0.0.1:{port}"))
        };
        let trips = vec![TripRecord::new(1, 2, 2.0, 10.0); 5];

        let summary = run_simulation(&trips, &log, &cfg).await.unwrap();
        assert_eq!(summary, SimulationSummary { sent: 3, failed: 3, logged: 0 });
        assert!(!log.path().exists());
    }
}
