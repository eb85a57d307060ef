use std::path::Path;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use taxi_duration::api::build_router;
use taxi_duration::data::TripRecord;
use taxi_duration::inference::ServingState;
use taxi_duration::training::service::train;
use taxi_duration::training::{BoostParams, FsArtifactStore, TrainConfig};

fn quick_cfg() -> TrainConfig {
    TrainConfig {
        params: BoostParams {
            n_estimators: 15,
            max_depth: 3,
            learning_rate: 0.4,
            ..BoostParams::default()
        },
        ..TrainConfig::default()
    }
}

/// Train on a constant corpus and return a router serving it plus its run id.
fn ready_app(dir: &Path) -> (Router, String) {
    let store = FsArtifactStore::new(dir.join("mlruns"));
    let run_id_path = dir.join("run_id.txt");
    let trips = vec![TripRecord::new(138, 236, 2.5, 10.0); 50];
    let outcome = train(&trips, &store, &run_id_path, &quick_cfg()).expect("train");

    let state = ServingState::startup(&run_id_path, &store).into_shared();
    (build_router(state), outcome.record.run_id.to_string())
}

fn degraded_app(dir: &Path) -> Router {
    let store = FsArtifactStore::new(dir.join("mlruns"));
    build_router(ServingState::startup(&dir.join("run_id.txt"), &store).into_shared())
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let payload = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, payload)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    call(app, request).await
}

async fn post_predict(app: Router, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("build request");
    call(app, request).await
}

#[tokio::test]
async fn root_answers_with_welcome_message() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = get(degraded_app(dir.path()), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("NYC Taxi Duration"));
}

#[tokio::test]
async fn health_reports_loaded_model() {
    let dir = tempfile::tempdir().unwrap();
    let (app, run_id) = ready_app(dir.path());
    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "run_id": run_id, "model_loaded": true}));
}

#[tokio::test]
async fn predict_returns_duration_and_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let (app, run_id) = ready_app(dir.path());
    let body = json!({"pickup_zone_id": 138, "dropoff_zone_id": 236, "trip_distance": 2.5});
    let (status, body) = post_predict(app, body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], run_id);
    let duration = body["duration"].as_f64().unwrap();
    assert!((duration - 10.0).abs() < 0.1, "duration {duration}");
}

#[tokio::test]
async fn predict_accepts_location_id_names() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = ready_app(dir.path());
    let body = json!({"PULocationID": 138, "DOLocationID": 236, "trip_distance": 2.5});
    let (status, _) = post_predict(app, body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn predict_accepts_whole_float_zone_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = ready_app(dir.path());
    let body = json!({"pickup_zone_id": 138.0, "dropoff_zone_id": 236.0, "trip_distance": 2.5});
    let (status, _) = post_predict(app.clone(), body.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let body = json!({"pickup_zone_id": 138.5, "dropoff_zone_id": 236, "trip_distance": 2.5});
    let (status, payload) = post_predict(app, body.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(payload["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn invalid_rides_are_unprocessable() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = ready_app(dir.path());
    let bad = [
        json!({"pickup_zone_id": 0, "dropoff_zone_id": 236, "trip_distance": 2.5}),
        json!({"pickup_zone_id": 138, "dropoff_zone_id": -1, "trip_distance": 2.5}),
        json!({"pickup_zone_id": 138, "dropoff_zone_id": 236, "trip_distance": 0.0}),
        json!({"pickup_zone_id": 138, "dropoff_zone_id": 236, "trip_distance": -4.0}),
        json!({"pickup_zone_id": 138, "trip_distance": 2.5}),
        json!({"pickup_zone_id": "a", "dropoff_zone_id": 236, "trip_distance": 2.5}),
    ];
    for body in bad {
        let (status, payload) = post_predict(app.clone(), body.to_string()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(payload["code"], "VALIDATION_ERROR");
    }

    let (status, payload) = post_predict(app, "{not json".to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(payload["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn degraded_service_stays_up() {
    let dir = tempfile::tempdir().unwrap();
    let app = degraded_app(dir.path());

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "degraded", "run_id": "unknown", "model_loaded": false}));

    for _ in 0..3 {
        let body = json!({"pickup_zone_id": 138, "dropoff_zone_id": 236, "trip_distance": 2.5});
        let (status, payload) = post_predict(app.clone(), body.to_string()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(payload["code"], "MODEL_UNAVAILABLE");
    }
}

#[tokio::test]
async fn corrupt_artifact_health_names_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path().join("mlruns"));
    let run_id_path = dir.path().join("run_id.txt");
    let trips = vec![TripRecord::new(138, 236, 2.5, 10.0); 50];
    let outcome = train(&trips, &store, &run_id_path, &quick_cfg()).expect("train");
    let run_id = outcome.record.run_id;
    std::fs::write(store.artifact_path(&run_id), "garbage").unwrap();

    let app = build_router(ServingState::startup(&run_id_path, &store).into_shared());
    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "degraded", "run_id": run_id.to_string(), "model_loaded": false})
    );
}

#[tokio::test]
async fn degraded_service_still_validates_first() {
    let dir = tempfile::tempdir().unwrap();
    let body = json!({"pickup_zone_id": 0, "dropoff_zone_id": 236, "trip_distance": 2.5});
    let (status, _) = post_predict(degraded_app(dir.path()), body.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
