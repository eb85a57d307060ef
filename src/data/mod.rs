//! Data domain: loading and filtering the historical trip corpus.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Corpus, CorpusStats, TripBounds, TripRecord, TripSource};
pub use repo_fs::CsvTripSource;
