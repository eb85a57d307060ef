//! Drift monitoring over a snapshot of the prediction log.
//!
//! The reference window is always the older half of the complete rows and the
//! current window the newer half, split at `n / 2` after a stable sort by
//! timestamp. Nothing here judges the numbers; it only measures them.

use std::path::Path;

use tracing::info;

use crate::common::error::{TaxiError, TaxiResult};
use crate::common::time;

use super::domain::{
    CategoricalDrift, DriftReport, NumericDrift, PerformanceDrift, PredictionLog,
    PredictionLogEntry, WindowSplit,
};
use super::metrics;
use super::report;

const TOP_CATEGORIES: usize = 10;

/// Reference and current windows borrowed from a sorted snapshot.
pub struct Windows<'a> {
    pub reference: &'a [PredictionLogEntry],
    pub current: &'a [PredictionLogEntry],
}

/// Keep complete rows and sort them by timestamp (stable, so ties keep log order).
pub fn complete_sorted(entries: &[PredictionLogEntry]) -> Vec<PredictionLogEntry> {
    let mut rows: Vec<_> = entries.iter().filter(|e| e.is_complete()).cloned().collect();
    rows.sort_by_key(|e| e.ts);
    rows
}

/// Split sorted rows at the floor midpoint. Requires at least two rows.
pub fn split_windows(sorted: &[PredictionLogEntry]) -> TaxiResult<Windows<'_>> {
    if sorted.len() < 2 {
        return Err(TaxiError::EmptyLog(format!(
            "{} complete row(s), need at least 2",
            sorted.len()
        )));
    }
    let (reference, current) = sorted.split_at(sorted.len() / 2);
    Ok(Windows { reference, current })
}

fn span(rows: &[PredictionLogEntry]) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
    // Callers only pass non-empty windows.
    (rows[0].ts, rows[rows.len() - 1].ts)
}

fn column(rows: &[PredictionLogEntry], pick: impl Fn(&PredictionLogEntry) -> Option<f64>) -> Vec<f64> {
    rows.iter().filter_map(pick).collect()
}

fn numeric_drift(name: &str, reference: &[f64], current: &[f64]) -> NumericDrift {
    NumericDrift {
        column: name.to_string(),
        ks_statistic: metrics::ks_statistic(reference, current),
        psi: metrics::psi_numeric(reference, current),
        wasserstein: metrics::wasserstein(reference, current),
        reference: metrics::summarize(reference),
        current: metrics::summarize(current),
    }
}

fn categorical_drift(windows: &Windows<'_>) -> CategoricalDrift {
    let reference = metrics::frequencies(windows.reference.iter().map(|e| e.zone_pair_key.as_str()));
    let current = metrics::frequencies(windows.current.iter().map(|e| e.zone_pair_key.as_str()));

    let mut top: Vec<(String, f64, f64)> = reference
        .keys()
        .chain(current.keys().filter(|k| !reference.contains_key(*k)))
        .map(|k| {
            (
                k.clone(),
                reference.get(k).copied().unwrap_or(0.0),
                current.get(k).copied().unwrap_or(0.0),
            )
        })
        .collect();
    top.sort_by(|a, b| (b.1 + b.2).total_cmp(&(a.1 + a.2)).then_with(|| a.0.cmp(&b.0)));
    top.truncate(TOP_CATEGORIES);

    CategoricalDrift {
        column: "zone_pair_key".to_string(),
        psi: metrics::psi_categorical(&reference, &current),
        js_distance: metrics::jensen_shannon(&reference, &current),
        reference_categories: reference.len(),
        current_categories: current.len(),
        new_categories: current.keys().filter(|k| !reference.contains_key(*k)).count(),
        vanished_categories: reference.keys().filter(|k| !current.contains_key(*k)).count(),
        top,
    }
}

fn performance_drift(windows: &Windows<'_>) -> PerformanceDrift {
    let scores = |rows: &[PredictionLogEntry]| {
        let truth = column(rows, |e| e.ground_truth_duration);
        let pred = column(rows, |e| e.prediction);
        metrics::regression_scores(&truth, &pred)
    };
    let errors = |rows: &[PredictionLogEntry]| {
        column(rows, |e| Some(e.prediction? - e.ground_truth_duration?))
    };

    let reference = scores(windows.reference);
    let current = scores(windows.current);
    PerformanceDrift {
        rmse_delta: current.rmse - reference.rmse,
        mae_delta: current.mae - reference.mae,
        error_ks: metrics::ks_statistic(&errors(windows.reference), &errors(windows.current)),
        reference,
        current,
    }
}

/// Measure data and performance drift between the older and newer half of `entries`.
pub fn generate_report(entries: &[PredictionLogEntry]) -> TaxiResult<DriftReport> {
    let sorted = complete_sorted(entries);
    let windows = split_windows(&sorted)?;

    let split = WindowSplit {
        total_rows: entries.len(),
        complete_rows: sorted.len(),
        split_index: windows.reference.len(),
        reference_rows: windows.reference.len(),
        current_rows: windows.current.len(),
        reference_span: span(windows.reference),
        current_span: span(windows.current),
    };

    let distance = |rows: &[PredictionLogEntry]| column(rows, |e| Some(e.trip_distance));
    let prediction = |rows: &[PredictionLogEntry]| column(rows, |e| e.prediction);
    let truth = |rows: &[PredictionLogEntry]| column(rows, |e| e.ground_truth_duration);

    Ok(DriftReport {
        generated_at: time::now_utc(),
        zone_pair_key: categorical_drift(&windows),
        trip_distance: numeric_drift(
            "trip_distance",
            &distance(windows.reference),
            &distance(windows.current),
        ),
        prediction: numeric_drift(
            "prediction",
            &prediction(windows.reference),
            &prediction(windows.current),
        ),
        ground_truth_duration: numeric_drift(
            "ground_truth_duration",
            &truth(windows.reference),
            &truth(windows.current),
        ),
        performance: performance_drift(&windows),
        split,
    })
}

/// Read the log, build the report and overwrite the rendered document at `report_path`.
pub fn run_monitor(log: &dyn PredictionLog, report_path: &Path) -> TaxiResult<DriftReport> {
    let entries = log
        .read_all()?
        .ok_or_else(|| TaxiError::EmptyLog("prediction log does not exist".into()))?;
    info!(rows = entries.len(), "prediction log loaded");

    let drift = generate_report(&entries)?;
    info!(
        reference = drift.split.reference_rows,
        current = drift.split.current_rows,
        dropped = drift.split.total_rows - drift.split.complete_rows,
        "windows split"
    );

    report::write_report(report_path, &drift)?;
    info!(
        path = %report_path.display(),
        distance_ks = drift.trip_distance.ks_statistic,
        zone_js = drift.zone_pair_key.js_distance,
        rmse_delta = drift.performance.rmse_delta,
        "drift report written"
    );
    Ok(drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(minute: i64, key: &str, distance: f64, pred: Option<f64>, truth: Option<f64>) -> PredictionLogEntry {
        PredictionLogEntry {
            ts: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            zone_pair_key: key.into(),
            trip_distance: distance,
            prediction: pred,
            ground_truth_duration: truth,
        }
    }

    fn log_of(n: i64) -> Vec<PredictionLogEntry> {
        (0..n)
            .map(|i| entry(i, "1_2", 1.0 + i as f64, Some(10.0), Some(10.0 + i as f64)))
            .collect()
    }

    #[test]
    fn split_point_is_floor_half() {
        for n in 2..12 {
            let sorted = complete_sorted(&log_of(n));
            let w = split_windows(&sorted).unwrap();
            assert_eq!(w.reference.len(), (n / 2) as usize);
            assert_eq!(w.reference.len() + w.current.len(), n as usize);
        }
    }

    #[test]
    fn sorts_by_timestamp_before_splitting() {
        let mut entries = log_of(4);
        entries.reverse();
        let report = generate_report(&entries).unwrap();
        assert_eq!(report.split.reference_span.0, entries[3].ts);
        assert_eq!(report.split.current_span.1, entries[0].ts);
    }

    #[test]
    fn only_complete_rows_are_used() {
        let mut entries = Vec::new();
        for i in 0..10 {
            let truth = if i % 2 == 0 { Some(12.0) } else { None };
            entries.push(entry(i, "1_2", 2.0, Some(11.0), truth));
        }
        let report = generate_report(&entries).unwrap();
        assert_eq!(report.split.total_rows, 10);
        assert_eq!(report.split.complete_rows, 5);
        assert_eq!((report.split.reference_rows, report.split.current_rows), (2, 3));
    }

    #[test]
    fn fewer_than_two_complete_rows_is_empty_log() {
        let entries = vec![
            entry(0, "1_2", 2.0, Some(11.0), Some(12.0)),
            entry(1, "1_2", 2.0, Some(11.0), None),
        ];
        let err = generate_report(&entries).unwrap_err();
        assert_eq!(err.code(), crate::common::TaxiCode::EmptyLog);
        assert!(generate_report(&[]).is_err());
    }

    #[test]
    fn rerun_on_same_log_is_stable() {
        let entries = log_of(9);
        let a = generate_report(&entries).unwrap();
        let b = generate_report(&entries).unwrap();
        assert_eq!(a.split, b.split);
        assert_eq!(a.trip_distance, b.trip_distance);
        assert_eq!(a.performance, b.performance);
    }

    #[test]
    fn detects_shift_in_zones_and_errors() {
        let mut entries = Vec::new();
        for i in 0..20 {
            entries.push(entry(i, "1_2", 2.0, Some(10.0), Some(10.0)));
        }
        for i in 20..40 {
            entries.push(entry(i, "9_9", 8.0, Some(10.0), Some(20.0)));
        }
        let report = generate_report(&entries).unwrap();
        assert!((report.zone_pair_key.js_distance - 1.0).abs() < 1e-9);
        assert_eq!(report.zone_pair_key.new_categories, 1);
        assert_eq!(report.zone_pair_key.vanished_categories, 1);
        assert!((report.trip_distance.ks_statistic - 1.0).abs() < 1e-9);
        assert!((report.performance.rmse_delta - 10.0).abs() < 1e-9);
        assert_eq!(report.performance.reference.rmse, 0.0);
    }
}
