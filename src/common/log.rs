//! Tracing subscriber setup shared by every command.
//!
//! `RUST_LOG` controls filtering; the format comes from [`AppCfg::log_format`].

use tracing_subscriber::EnvFilter;

use super::config::{AppCfg, LogFormat};

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init_logging(cfg: &AppCfg) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let result = match cfg.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
