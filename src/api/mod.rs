//! HTTP entry points.

pub mod error;
pub mod http;

pub use error::{ApiError, ErrorBody};
pub use http::{build_router, AppState};
