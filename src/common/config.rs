//! Runtime configuration loaded from environment and optional `.env` files.
//!
//! Values are read once into an immutable [`AppCfg`] snapshot. CLI flags
//! override individual fields after loading.

use std::env;
use std::path::PathBuf;

use super::error::{TaxiError, TaxiResult};

/// Output format for the tracing subscriber.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub data_root: PathBuf,
    pub tracking_uri: String,
    pub run_id_path: PathBuf,
    pub prediction_log: PathBuf,
    pub report_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub api_url: String,
    pub log_format: LogFormat,
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> TaxiResult<Self> {
        load_dotenv_layers();

        let data_root = PathBuf::from(env_or("TAXI_DATA_ROOT", "./data"));
        let prediction_log = match env::var("TAXI_PREDICTION_LOG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_root.join("predictions.csv"),
        };

        Ok(Self {
            tracking_uri: env_or("TRACKING_URI", "file://./mlruns"),
            run_id_path: PathBuf::from(env_or("TAXI_RUN_ID_PATH", "run_id.txt")),
            prediction_log,
            report_path: PathBuf::from(env_or("TAXI_REPORT_PATH", "monitoring_report.html")),
            api_host: env_or("API_HOST", "0.0.0.0"),
            api_port: read_u16("API_PORT", 9696)?,
            api_url: env_or("TAXI_API_URL", "http://localhost:9696"),
            log_format: parse_log_format(&env_or("TAXI_LOG_FORMAT", "text"))?,
            data_root,
        })
    }

    /// Configuration rooted in a scratch directory, used by tests and tooling.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            tracking_uri: format!("file://{}", root.join("mlruns").display()),
            run_id_path: root.join("run_id.txt"),
            prediction_log: root.join("data").join("predictions.csv"),
            report_path: root.join("monitoring_report.html"),
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            api_url: "http://127.0.0.1:9696".to_string(),
            log_format: LogFormat::Text,
            data_root: root.join("data"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn read_u16(key: &str, default: u16) -> TaxiResult<u16> {
    match env::var(key) {
        Ok(v) => v
            .parse::<u16>()
            .map_err(|e| TaxiError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_log_format(raw: &str) -> TaxiResult<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "text" | "pretty" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(TaxiError::Config(format!("unknown TAXI_LOG_FORMAT: {other}"))),
    }
}

fn load_dotenv_layers() {
    for path in [".env", "../.env"] {
        let _ = dotenvy::from_path(path);
    }
}
