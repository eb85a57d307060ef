//! One-hot vectoriser for the zone pair key plus a pass-through numeric column.
//!
//! Slots `0..vocab_len` hold the zone pair keys in lexical order; the last slot
//! holds `trip_distance`. The vocabulary is frozen after [`DictVectorizer::fit`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::FeatureVector;

/// Sparse row as `(slot, value)` pairs sorted by slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseRow(Vec<(usize, f64)>);

impl SparseRow {
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.0
    }

    /// Value at `slot`, zero when absent.
    pub fn get(&self, slot: usize) -> f64 {
        self.0
            .binary_search_by_key(&slot, |(s, _)| *s)
            .map(|idx| self.0[idx].1)
            .unwrap_or(0.0)
    }
}

/// Fitted categorical + numeric vectoriser.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VectorizerRepr", into = "VectorizerRepr")]
pub struct DictVectorizer {
    vocabulary: BTreeMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct VectorizerRepr {
    zone_pair_keys: Vec<String>,
}

impl TryFrom<VectorizerRepr> for DictVectorizer {
    type Error = String;

    fn try_from(repr: VectorizerRepr) -> Result<Self, Self::Error> {
        if repr.zone_pair_keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err("vocabulary must be strictly sorted".to_string());
        }
        Ok(Self::from_sorted_keys(repr.zone_pair_keys))
    }
}

impl From<DictVectorizer> for VectorizerRepr {
    fn from(v: DictVectorizer) -> Self {
        VectorizerRepr {
            zone_pair_keys: v.vocabulary.into_keys().collect(),
        }
    }
}

impl DictVectorizer {
    fn from_sorted_keys(keys: Vec<String>) -> Self {
        let vocabulary = keys.into_iter().enumerate().map(|(i, k)| (k, i)).collect();
        Self { vocabulary }
    }

    /// Learn the vocabulary from the full training corpus. Any earlier vocabulary is replaced.
    pub fn fit(&mut self, rows: &[FeatureVector]) {
        let mut keys: Vec<String> = rows.iter().map(|r| r.zone_pair_key.clone()).collect();
        keys.sort();
        keys.dedup();
        *self = Self::from_sorted_keys(keys);
    }

    /// Map a feature vector to its sparse representation without touching the vocabulary.
    pub fn transform(&self, row: &FeatureVector) -> SparseRow {
        let mut entries = Vec::with_capacity(2);
        match self.vocabulary.get(&row.zone_pair_key) {
            Some(&slot) => entries.push((slot, 1.0)),
            None => {
                // Unseen pair: no categorical entry, the model sees the zero vector.
                debug!(zone_pair_key = %row.zone_pair_key, "zone pair outside fitted vocabulary");
            }
        }
        if row.trip_distance != 0.0 {
            entries.push((self.distance_slot(), row.trip_distance));
        }
        SparseRow(entries)
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<SparseRow> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    pub fn vocab_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn distance_slot(&self) -> usize {
        self.vocabulary.len()
    }

    /// Total number of columns, categorical plus numeric.
    pub fn n_features(&self) -> usize {
        self.vocabulary.len() + 1
    }

    pub fn contains(&self, zone_pair_key: &str) -> bool {
        self.vocabulary.contains_key(zone_pair_key)
    }

    /// Human-readable column name, e.g. `zone_pair_key=138_236` or `trip_distance`.
    pub fn feature_name(&self, slot: usize) -> Option<String> {
        if slot == self.distance_slot() {
            return Some("trip_distance".to_string());
        }
        self.vocabulary
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(k, _)| format!("zone_pair_key={k}"))
    }
}
