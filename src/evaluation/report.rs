//! Self-contained HTML rendering of a [`DriftReport`].

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::common::error::{TaxiError, TaxiResult};

use super::domain::{DriftReport, NumericDrift};
use super::metrics::{RegressionScores, Summary};

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn summary_cells(s: &Summary) -> String {
    format!(
        "<td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td>",
        s.n, s.mean, s.std, s.min, s.median, s.max
    )
}

fn numeric_section(out: &mut String, drift: &NumericDrift) {
    let _ = write!(
        out,
        "<h3>{col}</h3>\n<p>KS statistic: <b>{ks:.4}</b> &middot; PSI: <b>{psi:.4}</b> &middot; \
         Wasserstein: <b>{w:.4}</b></p>\n<table>\n<tr><th>window</th><th>n</th><th>mean</th>\
         <th>std</th><th>min</th><th>median</th><th>max</th></tr>\n\
         <tr><td>reference</td>{r}</tr>\n<tr><td>current</td>{c}</tr>\n</table>\n",
        col = escape(&drift.column),
        ks = drift.ks_statistic,
        psi = drift.psi,
        w = drift.wasserstein,
        r = summary_cells(&drift.reference),
        c = summary_cells(&drift.current),
    );
}

fn score_row(label: &str, s: &RegressionScores) -> String {
    format!(
        "<tr><td>{label}</td><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>\n",
        s.n, s.rmse, s.mae, s.r2, s.mean_error, s.error_std
    )
}

/// Render the report as a standalone HTML document.
pub fn render_html(report: &DriftReport) -> String {
    let split = &report.split;
    let zones = &report.zone_pair_key;
    let perf = &report.performance;
    let mut out = String::new();

    out.push_str(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <title>Taxi duration monitoring report</title>\n<style>\
         body{font-family:sans-serif;margin:2em}table{border-collapse:collapse;margin-bottom:1em}\
         td,th{border:1px solid #ccc;padding:4px 8px;text-align:right}\
         </style></head><body>\n<h1>Taxi duration monitoring report</h1>\n",
    );
    let _ = write!(
        out,
        "<p>Generated {}</p>\n<h2>Windows</h2>\n<p>{} logged rows, {} complete, split at {}.</p>\n\
         <p>Reference: {} rows, {} to {}<br>Current: {} rows, {} to {}</p>\n",
        report.generated_at.to_rfc3339(),
        split.total_rows,
        split.complete_rows,
        split.split_index,
        split.reference_rows,
        split.reference_span.0.to_rfc3339(),
        split.reference_span.1.to_rfc3339(),
        split.current_rows,
        split.current_span.0.to_rfc3339(),
        split.current_span.1.to_rfc3339(),
    );

    out.push_str("<h2>Data drift</h2>\n");
    let _ = write!(
        out,
        "<h3>{}</h3>\n<p>PSI: <b>{:.4}</b> &middot; Jensen-Shannon distance: <b>{:.4}</b></p>\n\
         <p>{} reference categories, {} current, {} new, {} vanished.</p>\n<table>\n\
         <tr><th>key</th><th>reference share</th><th>current share</th></tr>\n",
        escape(&zones.column),
        zones.psi,
        zones.js_distance,
        zones.reference_categories,
        zones.current_categories,
        zones.new_categories,
        zones.vanished_categories,
    );
    for (key, r, c) in &zones.top {
        let _ = writeln!(out, "<tr><td>{}</td><td>{r:.3}</td><td>{c:.3}</td></tr>", escape(key));
    }
    out.push_str("</table>\n");
    for drift in [
        &report.trip_distance,
        &report.prediction,
        &report.ground_truth_duration,
    ] {
        numeric_section(&mut out, drift);
    }

    out.push_str(
        "<h2>Regression performance</h2>\n<table>\n<tr><th>window</th><th>n</th><th>RMSE</th>\
         <th>MAE</th><th>R&sup2;</th><th>mean error</th><th>error std</th></tr>\n",
    );
    out.push_str(&score_row("reference", &perf.reference));
    out.push_str(&score_row("current", &perf.current));
    let _ = write!(
        out,
        "</table>\n<p>RMSE change: <b>{:+.3}</b> &middot; MAE change: <b>{:+.3}</b> &middot; \
         error KS: <b>{:.4}</b></p>\n</body></html>\n",
        perf.rmse_delta, perf.mae_delta, perf.error_ks,
    );
    out
}

/// Overwrite `path` with the rendered report, creating parent directories.
pub fn write_report(path: &Path, report: &DriftReport) -> TaxiResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| TaxiError::io(dir, e))?;
    }
    fs::write(path, render_html(report)).map_err(|e| TaxiError::io(path, e))
}
