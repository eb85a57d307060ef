//! Gradient-boosted regression trees over sparse rows, squared-error loss.
//!
//! Splits are exact: for every feature present in a node the candidate
//! thresholds are the midpoints between consecutive distinct values, with
//! absent entries counted as 0.0. Features are scanned in slot order and the
//! first best gain wins, so a fit is fully determined by its inputs and seed.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::common::error::{TaxiError, TaxiResult};
use crate::features::SparseRow;

const MIN_GAIN: f64 = 1e-12;

/// Boosting hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 8,
            learning_rate: 0.1,
            subsample: 0.8,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl BoostParams {
    pub fn validate(&self) -> TaxiResult<()> {
        if self.n_estimators == 0 {
            return Err(TaxiError::Config("n_estimators must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(TaxiError::Config("learning_rate must be in (0, 1]".into()));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(TaxiError::Config("subsample must be in (0, 1]".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(TaxiError::Config("min_samples_leaf must be at least 1".into()));
        }
        Ok(())
    }

    /// Flat name → value view recorded with each training run.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objective".to_string(), "reg:squarederror".to_string()),
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("subsample".to_string(), self.subsample.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
            ("random_state".to_string(), self.seed.to_string()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree; node 0 is the root and children always follow their parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict(&self, row: &SparseRow) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row.get(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } if !value.is_finite() => {
                    return Err(format!("non-finite leaf at node {idx}"));
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let in_range = |c: usize| c > idx && c < self.nodes.len();
                    if *feature >= n_features || !threshold.is_finite() {
                        return Err(format!("bad split at node {idx}"));
                    }
                    if !in_range(*left) || !in_range(*right) {
                        return Err(format!("bad child index at node {idx}"));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Fitted additive ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fit `rows` against `targets`. `n_features` is the width of the vectoriser output.
    pub fn fit(
        params: &BoostParams,
        rows: &[SparseRow],
        targets: &[f64],
        n_features: usize,
    ) -> TaxiResult<Self> {
        params.validate()?;
        if rows.is_empty() {
            return Err(TaxiError::TrainingFailed("empty training set".into()));
        }
        if rows.len() != targets.len() {
            return Err(TaxiError::TrainingFailed(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(TaxiError::TrainingFailed("non-finite target value".into()));
        }

        let n = rows.len();
        let base_score = targets.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![base_score; n];
        let mut residuals = vec![0.0; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((n as f64 * params.subsample).round() as usize).clamp(1, n);

        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            for i in 0..n {
                residuals[i] = targets[i] - predictions[i];
            }

            let mut sample: Vec<usize> = if sample_size < n {
                index::sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };
            sample.sort_unstable();

            let tree = TreeBuilder {
                rows,
                residuals: &residuals,
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf,
                nodes: Vec::new(),
            }
            .build(sample);

            for (pred, row) in predictions.iter_mut().zip(rows) {
                *pred += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            base_score,
            learning_rate: params.learning_rate,
            n_features,
            trees,
        })
    }

    pub fn predict(&self, row: &SparseRow) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Structural check run after deserialising an artefact.
    pub fn check(&self) -> Result<(), String> {
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err("non-finite ensemble parameters".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check(self.n_features).map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

struct TreeBuilder<'a> {
    rows: &'a [SparseRow],
    residuals: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
    nodes: Vec<TreeNode>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(mut self, sample: Vec<usize>) -> RegressionTree {
        self.grow(sample, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let node_id = self.nodes.len();
        let total: f64 = idx.iter().map(|&i| self.residuals[i]).sum();
        let mean = total / idx.len() as f64;
        self.nodes.push(TreeNode::Leaf { value: mean });

        if depth >= self.max_depth || idx.len() < 2 * self.min_samples_leaf {
            return node_id;
        }
        let Some(split) = self.best_split(&idx, total) else {
            return node_id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.rows[i].get(split.feature) <= split.threshold);
        let left_id = self.grow(left, depth + 1);
        let right_id = self.grow(right, depth + 1);
        self.nodes[node_id] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        node_id
    }

    fn best_split(&self, idx: &[usize], total: f64) -> Option<Split> {
        let n = idx.len();
        let mut by_feature: BTreeMap<usize, Vec<(f64, f64)>> = BTreeMap::new();
        for &i in idx {
            for &(feature, value) in self.rows[i].entries() {
                by_feature
                    .entry(feature)
                    .or_default()
                    .push((value, self.residuals[i]));
            }
        }

        let parent_score = total * total / n as f64;
        let mut best: Option<Split> = None;

        for (feature, entries) in by_feature {
            let groups = value_groups(entries, n, total);
            if groups.len() < 2 {
                continue;
            }

            let mut left_sum = 0.0;
            let mut left_n = 0usize;
            for k in 0..groups.len() - 1 {
                let (value, sum, count) = groups[k];
                left_sum += sum;
                left_n += count;
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (value + groups[k + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Collapse `(value, residual)` pairs into `(value, residual_sum, count)` groups
/// sorted by value, adding the implicit zero group for rows lacking the feature.
fn value_groups(entries: Vec<(f64, f64)>, n: usize, total: f64) -> Vec<(f64, f64, usize)> {
    let zeros = n - entries.len();
    let zero_sum = total - entries.iter().map(|e| e.1).sum::<f64>();
    let mut flat: Vec<(f64, f64, usize)> = entries.into_iter().map(|(v, r)| (v, r, 1)).collect();
    if zeros > 0 {
        flat.push((0.0, zero_sum, zeros));
    }
    flat.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut groups: Vec<(f64, f64, usize)> = Vec::with_capacity(flat.len());
    for (value, sum, count) in flat {
        match groups.last_mut() {
            Some(last) if last.0 == value => {
                last.1 += sum;
                last.2 += count;
            }
            _ => groups.push((value, sum, count)),
        }
    }
    groups
}
