use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;

use taxi_duration::api::build_router;
use taxi_duration::common::{AppCfg, TaxiCode};
use taxi_duration::data::CsvTripSource;
use taxi_duration::evaluation::{run_monitor, FsPredictionLog, PredictionLog};
use taxi_duration::inference::ServingState;
use taxi_duration::simulate::{run_simulation, SimulationCfg};
use taxi_duration::training::service::train;
use taxi_duration::training::{read_run_id, BoostParams, FsArtifactStore, TrainConfig};

/// Trip export with a handful of zone pairs; duration grows with distance.
/// The last two rows are outliers and must be filtered everywhere.
fn write_corpus(path: &Path) {
    let mut csv = String::from("PULocationID,DOLocationID,trip_distance,duration\n");
    for i in 0..80u32 {
        let pickup = 100 + i % 4;
        let dropoff = 200 + i % 3;
        let distance = 1.0 + f64::from(i % 10) * 0.5;
        let duration = 4.0 + distance * 3.0;
        let _ = writeln!(csv, "{pickup},{dropoff},{distance},{duration}");
    }
    csv.push_str("1,2,2.0,0.5\n1,2,150.0,20.0\n");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, csv).unwrap();
}

#[tokio::test]
async fn train_serve_simulate_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AppCfg::rooted_at(dir.path());
    let corpus = cfg.data_root.join("trips.csv");
    write_corpus(&corpus);

    let store = FsArtifactStore::from_uri(&cfg.tracking_uri).unwrap();
    let train_cfg = TrainConfig {
        params: BoostParams {
            n_estimators: 30,
            max_depth: 4,
            learning_rate: 0.3,
            ..BoostParams::default()
        },
        ..TrainConfig::default()
    };
    let outcome = train(
        &CsvTripSource::new(&corpus),
        &store,
        &cfg.run_id_path,
        &train_cfg,
    )
    .unwrap();
    assert_eq!(outcome.record.train_rows + outcome.record.val_rows, 80);
    assert_eq!(read_run_id(&cfg.run_id_path).unwrap(), outcome.record.run_id);

    let state = ServingState::startup(&cfg.run_id_path, &store).into_shared();
    assert!(state.health().model_loaded);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, build_router(state)).await });

    let log = FsPredictionLog::new(&cfg.prediction_log);
    let sim_cfg = SimulationCfg {
        rows: 40,
        pause: Duration::ZERO,
        ..SimulationCfg::new(format!("http://{addr}"))
    };
    let summary = run_simulation(&CsvTripSource::new(&corpus), &log, &sim_cfg)
        .await
        .unwrap();
    assert_eq!((summary.sent, summary.failed, summary.logged), (40, 0, 40));
    server.abort();

    let logged = log.read_all().unwrap().unwrap();
    assert_eq!(logged.len(), 40);
    assert!(logged.iter().all(|e| e.is_complete()));

    let report = run_monitor(&log, &cfg.report_path).unwrap();
    assert_eq!(report.split.split_index, 20);
    assert_eq!(report.split.current_rows, 20);
    let html = fs::read_to_string(&cfg.report_path).unwrap();
    assert!(html.contains("zone_pair_key"));
    assert!(html.contains("RMSE"));

    let again = run_monitor(&log, &cfg.report_path).unwrap();
    assert_eq!(again.split, report.split);
    assert_eq!(again.trip_distance, report.trip_distance);
}

#[test]
fn monitor_without_traffic_is_empty_log() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AppCfg::rooted_at(dir.path());
    let log = FsPredictionLog::new(&cfg.prediction_log);

    let err = run_monitor(&log, &cfg.report_path).unwrap_err();
    assert_eq!(err.code(), TaxiCode::EmptyLog);
    assert!(!cfg.report_path.exists());
}

#[test]
fn failed_training_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AppCfg::rooted_at(dir.path());
    let corpus = cfg.data_root.join("trips.csv");
    fs::create_dir_all(&cfg.data_root).unwrap();
    fs::write(&corpus, "PULocationID,DOLocationID,trip_distance,duration\n1,2,2.0,90.0\n").unwrap();

    let store = FsArtifactStore::from_uri(&cfg.tracking_uri).unwrap();
    let err = train(
        &CsvTripSource::new(&corpus),
        &store,
        &cfg.run_id_path,
        &TrainConfig::default(),
    )
    .unwrap_err();
    assert_eq!(err.code(), TaxiCode::TrainingFailed);
    assert!(!cfg.run_id_path.exists());
    assert!(!dir.path().join("mlruns").exists());
}
