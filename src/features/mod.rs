//! Feature domain: the encoder both training and serving go through.

pub mod domain;
pub mod vectorizer;

pub use domain::{encode, zone_pair_key, FeatureVector, RideFields};
pub use vectorizer::{DictVectorizer, SparseRow};
