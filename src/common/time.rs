//! Simple time helpers used by multiple services.

use std::time::Instant;

use chrono::{DateTime, Utc};

/// Current wall-clock timestamp in UTC.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed since `start`, for latency fields in log events.
pub fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}
