//! Metric calculators shared by training evaluation and drift monitoring.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Floor applied to bucket proportions before taking logarithms.
const PROPORTION_FLOOR: f64 = 1e-4;

/// Regression quality over one set of `(truth, prediction)` pairs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct RegressionScores {
    pub n: usize,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Mean of `prediction - truth`.
    pub mean_error: f64,
    pub error_std: f64,
}

pub fn regression_scores(y_true: &[f64], y_pred: &[f64]) -> RegressionScores {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return RegressionScores::default();
    }
    let errors: Vec<f64> = y_pred.iter().zip(y_true).map(|(p, t)| p - t).collect();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    let truth_mean = mean(&y_true[..n]);
    let ss_tot: f64 = y_true[..n].iter().map(|t| (t - truth_mean).powi(2)).sum();

    // Constant truth: perfect fit scores 1, anything else 0.
    let r2 = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    RegressionScores {
        n,
        rmse: (ss_res / n as f64).sqrt(),
        mae: errors.iter().map(|e| e.abs()).sum::<f64>() / n as f64,
        r2,
        mean_error: mean(&errors),
        error_std: std_dev(&errors),
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Linear-interpolated quantile of an already sorted slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Location and spread summary of a numeric column.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

pub fn summarize(values: &[f64]) -> Summary {
    let s = sorted(values);
    Summary {
        n: s.len(),
        mean: mean(&s),
        std: std_dev(&s),
        min: s.first().copied().unwrap_or(0.0),
        median: quantile_sorted(&s, 0.5),
        max: s.last().copied().unwrap_or(0.0),
    }
}

/// Two-sample Kolmogorov–Smirnov statistic: the largest gap between the empirical CDFs.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (a, b) = (sorted(a), sorted(b));
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / na - j as f64 / nb).abs());
    }
    d
}

/// First Wasserstein distance between two empirical distributions.
pub fn wasserstein(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (a, b) = (sorted(a), sorted(b));
    let mut all: Vec<f64> = a.iter().chain(&b).copied().collect();
    all.sort_by(f64::total_cmp);

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut area = 0.0;
    for w in all.windows(2) {
        while i < a.len() && a[i] <= w[0] {
            i += 1;
        }
        while j < b.len() && b[j] <= w[0] {
            j += 1;
        }
        area += (i as f64 / na - j as f64 / nb).abs() * (w[1] - w[0]);
    }
    area
}

fn psi_term(reference: f64, current: f64) -> f64 {
    let r = reference.max(PROPORTION_FLOOR);
    let c = current.max(PROPORTION_FLOOR);
    (c - r) * (c / r).ln()
}

/// Population stability index with buckets cut at the reference deciles.
pub fn psi_numeric(reference: &[f64], current: &[f64]) -> f64 {
    if reference.is_empty() || current.is_empty() {
        return 0.0;
    }
    let r_sorted = sorted(reference);
    let mut edges: Vec<f64> = (1..10)
        .map(|k| quantile_sorted(&r_sorted, k as f64 / 10.0))
        .collect();
    edges.dedup();

    let bucket = |v: f64| edges.partition_point(|e| *e < v);
    let proportions = |values: &[f64]| {
        let mut counts = vec![0usize; edges.len() + 1];
        for v in values {
            counts[bucket(*v)] += 1;
        }
        counts
            .into_iter()
            .map(|c| c as f64 / values.len() as f64)
            .collect::<Vec<_>>()
    };

    proportions(reference)
        .into_iter()
        .zip(proportions(current))
        .map(|(r, c)| psi_term(r, c))
        .sum()
}

/// Category → relative frequency.
pub fn frequencies<'a, I: IntoIterator<Item = &'a str>>(values: I) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for v in values {
        *counts.entry(v.to_string()).or_default() += 1;
        total += 1;
    }
    counts
        .into_iter()
        .map(|(k, c)| (k, c as f64 / total.max(1) as f64))
        .collect()
}

fn union_keys<'a>(a: &'a BTreeMap<String, f64>, b: &'a BTreeMap<String, f64>) -> BTreeSet<&'a str> {
    a.keys().chain(b.keys()).map(String::as_str).collect()
}

/// Population stability index over categorical frequencies.
pub fn psi_categorical(reference: &BTreeMap<String, f64>, current: &BTreeMap<String, f64>) -> f64 {
    union_keys(reference, current)
        .into_iter()
        .map(|k| {
            psi_term(
                reference.get(k).copied().unwrap_or(0.0),
                current.get(k).copied().unwrap_or(0.0),
            )
        })
        .sum()
}

/// Jensen–Shannon distance (base 2, in `[0, 1]`) between categorical frequencies.
pub fn jensen_shannon(reference: &BTreeMap<String, f64>, current: &BTreeMap<String, f64>) -> f64 {
    let kl_part = |p: f64, m: f64| if p > 0.0 { p * (p / m).log2() } else { 0.0 };
    let divergence: f64 = union_keys(reference, current)
        .into_iter()
        .map(|k| {
            let p = reference.get(k).copied().unwrap_or(0.0);
            let q = current.get(k).copied().unwrap_or(0.0);
            let m = (p + q) / 2.0;
            0.5 * kl_part(p, m) + 0.5 * kl_part(q, m)
        })
        .sum();
    divergence.max(0.0).sqrt()
}
