//! Service layer responsible for loading and filtering the trip corpus.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::common::error::TaxiResult;

use super::domain::{Corpus, CorpusStats, TripBounds, TripRecord, TripSource};

/// Load trips from `source`, drop incomplete rows and outliers, then keep at most `limit`.
pub fn load_corpus(
    source: &dyn TripSource,
    bounds: &TripBounds,
    limit: Option<usize>,
) -> TaxiResult<Corpus> {
    let raw = source.read_trips()?;
    let mut stats = CorpusStats {
        rows_read: raw.len() as u64,
        ..CorpusStats::default()
    };

    let mut trips = Vec::with_capacity(raw.len());
    for row in raw {
        match row {
            None => stats.incomplete += 1,
            Some(trip) if !bounds.admits(&trip) => stats.outliers += 1,
            Some(trip) => trips.push(trip),
        }
    }

    if let Some(limit) = limit {
        trips.truncate(limit);
    }
    stats.kept = trips.len() as u64;

    info!(
        rows_read = stats.rows_read,
        incomplete = stats.incomplete,
        outliers = stats.outliers,
        kept = stats.kept,
        "corpus loaded"
    );
    Ok(Corpus { trips, stats })
}

/// Draw up to `n` trips without replacement, reproducibly for a given seed.
pub fn sample(trips: &[TripRecord], n: usize, seed: u64) -> Vec<TripRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    trips
        .choose_multiple(&mut rng, n.min(trips.len()))
        .cloned()
        .collect()
}
