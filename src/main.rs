//! # taxi-duration
//!
//! Command-line entry point: train a model, serve it, replay traffic against
//! it and report drift over the logged predictions.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use taxi_duration::api::build_router;
use taxi_duration::common::log::init_logging;
use taxi_duration::common::{AppCfg, TaxiError, TaxiResult};
use taxi_duration::data::CsvTripSource;
use taxi_duration::evaluation::{run_monitor, FsPredictionLog};
use taxi_duration::inference::ServingState;
use taxi_duration::simulate::{run_simulation, SimulationCfg};
use taxi_duration::training::service::train;
use taxi_duration::training::{BoostParams, FsArtifactStore, TrainConfig};

const DEFAULT_CORPUS: &str = "yellow_tripdata_2023-01.csv";

#[derive(Parser)]
#[command(name = "taxi-duration")]
#[command(about = "NYC taxi trip duration: training, serving and monitoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and publish its run id
    Train {
        /// Trip CSV (default: <data root>/yellow_tripdata_2023-01.csv)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Maximum number of filtered trips used for training
        #[arg(long, default_value = "100000")]
        limit: usize,

        /// Use every filtered trip
        #[arg(long, conflicts_with = "limit")]
        no_limit: bool,

        #[arg(long, default_value = "200")]
        n_estimators: usize,

        #[arg(long, default_value = "8")]
        max_depth: usize,

        #[arg(long, default_value = "0.1")]
        learning_rate: f64,

        /// Row fraction drawn for each tree
        #[arg(long, default_value = "0.8")]
        subsample: f64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Start the prediction API
    Serve {
        /// Host to bind to (default: API_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: API_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Replay sampled trips against a running API and log the predictions
    Simulate {
        /// Trip CSV (default: <data root>/yellow_tripdata_2023-01.csv)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Number of trips to send
        #[arg(short, long, default_value = "100")]
        rows: usize,

        /// Pause between requests in milliseconds
        #[arg(long, default_value = "50")]
        sleep_ms: u64,

        /// API base URL (default: TAXI_API_URL)
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Build the drift report from the prediction log
    Monitor {
        /// Output path (default: TAXI_REPORT_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rewrite the prediction log sorted by timestamp (stop simulators first)
    CompactLog,
}

fn corpus_path(cfg: &AppCfg, data: Option<PathBuf>) -> PathBuf {
    data.unwrap_or_else(|| cfg.data_root.join(DEFAULT_CORPUS))
}

async fn serve(cfg: &AppCfg, host: Option<String>, port: Option<u16>) -> TaxiResult<()> {
    let store = FsArtifactStore::from_uri(&cfg.tracking_uri)?;
    let state = ServingState::startup(&cfg.run_id_path, &store).into_shared();

    let bind_addr = format!(
        "{}:{}",
        host.as_deref().unwrap_or(&cfg.api_host),
        port.unwrap_or(cfg.api_port)
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| TaxiError::io(&bind_addr, e))?;
    info!(bind_addr = %bind_addr, model_loaded = state.health().model_loaded, "taxi-duration api started");

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| TaxiError::io(&bind_addr, e))
}

async fn run(cfg: AppCfg, command: Commands) -> TaxiResult<()> {
    match command {
        Commands::Train {
            data,
            limit,
            no_limit,
            n_estimators,
            max_depth,
            learning_rate,
            subsample,
            seed,
        } => {
            let source = CsvTripSource::new(corpus_path(&cfg, data));
            let store = FsArtifactStore::from_uri(&cfg.tracking_uri)?;
            let train_cfg = TrainConfig {
                params: BoostParams {
                    n_estimators,
                    max_depth,
                    learning_rate,
                    subsample,
                    seed,
                    ..BoostParams::default()
                },
                row_limit: (!no_limit).then_some(limit),
                ..TrainConfig::default()
            };
            let outcome = train(&source, &store, &cfg.run_id_path, &train_cfg)?;
            info!(
                run_id = %outcome.record.run_id,
                rmse = outcome.record.metrics.rmse,
                artifact = %outcome.record.artifact_uri,
                "training finished"
            );
            Ok(())
        }
        Commands::Serve { host, port } => serve(&cfg, host, port).await,
        Commands::Simulate {
            data,
            rows,
            sleep_ms,
            api_url,
        } => {
            let source = CsvTripSource::new(corpus_path(&cfg, data));
            let log = FsPredictionLog::new(&cfg.prediction_log);
            let sim_cfg = SimulationCfg {
                rows,
                pause: Duration::from_millis(sleep_ms),
                ..SimulationCfg::new(api_url.unwrap_or_else(|| cfg.api_url.clone()))
            };
            run_simulation(&source, &log, &sim_cfg).await.map(|_| ())
        }
        Commands::Monitor { output } => {
            let log = FsPredictionLog::new(&cfg.prediction_log);
            let report_path = output.unwrap_or_else(|| cfg.report_path.clone());
            run_monitor(&log, &report_path).map(|_| ())
        }
        Commands::CompactLog => FsPredictionLog::new(&cfg.prediction_log)
            .compact()
            .map(|_| ()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match AppCfg::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&cfg);

    match run(cfg, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.code().as_str(), error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
