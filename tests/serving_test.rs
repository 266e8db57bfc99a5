//! Model server integration tests: hot-swap under load and the HTTP API

use farewatch::artifact::ModelArtifact;
use farewatch::dispatch::{
    DispatchConfig, Dispatcher, SecretToken, TransportError, WebhookRequest, WebhookTransport,
};
use farewatch::schema::{FareFeatures, FEATURE_NAMES};
use farewatch::serving::{router, AppState, ModelServer};
use farewatch::training::LinearModel;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Constant model: predicts `fare` for every input.
fn constant_artifact(version: &str, fare: f64) -> ModelArtifact {
    let model = LinearModel {
        intercept: fare,
        coefficients: vec![0.0; 5],
    };
    ModelArtifact::from_model(&model, FEATURE_NAMES)
        .unwrap()
        .with_version(version)
}

fn ride() -> FareFeatures {
    FareFeatures {
        trip_distance: 2.5,
        pickup_zone: 132,
        dropoff_zone: 230,
        hour: 17,
        day_of_week: 4,
    }
}

#[test]
fn test_concurrent_predicts_see_old_or_new_model() {
    let server = Arc::new(ModelServer::default());
    server.reload(&constant_artifact("old", 10.0)).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let server = Arc::clone(&server);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let p = server.predict(&ride()).unwrap();
                    // version and output must come from the same artifact
                    match p.model_version.as_str() {
                        "old" => assert!((p.predicted_fare - 10.0).abs() < 1e-12),
                        "new" => assert!((p.predicted_fare - 20.0).abs() < 1e-12),
                        other => panic!("unexpected model version {other}"),
                    }
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    for i in 0..200 {
        let (version, fare) = if i % 2 == 0 { ("new", 20.0) } else { ("old", 10.0) };
        server.reload(&constant_artifact(version, fare)).unwrap();
    }
    server.reload(&constant_artifact("new", 20.0)).unwrap();
    stop.store(true, Ordering::Relaxed);

    let total: usize = readers.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(server.predict(&ride()).unwrap().model_version, "new");
}

#[test]
fn test_concurrent_reloads_serialize() {
    let server = Arc::new(ModelServer::default());
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                for i in 0..50 {
                    let version = format!("w{w}-{i}");
                    server.reload(&constant_artifact(&version, 1.0)).unwrap();
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }
    let version = server.active_version().unwrap();
    assert!(version.ends_with("-49"), "last reload of some writer wins, got {version}");
}

// ============================================================================
// HTTP API
// ============================================================================

/// Answers every webhook call with a fixed status.
struct FixedStatus(u16);

impl WebhookTransport for FixedStatus {
    fn post(&self, request: &WebhookRequest<'_>) -> Result<u16, TransportError> {
        assert!(request.event.simulate_drift().is_some());
        Ok(self.0)
    }
}

async fn spawn_app(
    server: Arc<ModelServer>,
    dispatcher: Dispatcher<FixedStatus>,
) -> SocketAddr {
    let app = router(AppState::new(server, dispatcher));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn dispatcher(status: u16, token: Option<&str>) -> Dispatcher<FixedStatus> {
    let config = DispatchConfig::new("http://ci.invalid/dispatches")
        .with_token(token.and_then(SecretToken::new));
    Dispatcher::with_transport(config, FixedStatus(status))
}

/// (status, body) of a blocking request made off the runtime threads
async fn call(
    method: &'static str,
    url: String,
    body: Option<serde_json::Value>,
) -> (u16, serde_json::Value) {
    tokio::task::spawn_blocking(move || {
        let request = ureq::request(method, &url);
        let response = match body {
            Some(json) => request.send_json(json),
            None => request.call(),
        };
        let response = match response {
            Ok(r) => r,
            Err(ureq::Error::Status(_, r)) => r,
            Err(e) => panic!("request failed: {e}"),
        };
        let status = response.status();
        let json = response
            .into_json::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null);
        (status, json)
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_predict_unloaded_is_503() {
    let addr = spawn_app(Arc::new(ModelServer::default()), dispatcher(204, Some("t"))).await;
    let (status, body) = call(
        "POST",
        format!("http://{addr}/predict"),
        Some(serde_json::to_value(ride()).unwrap()),
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(body["detail"], "Service unavailable: model not loaded");
}

#[tokio::test]
async fn test_health_and_predict() {
    let server = Arc::new(ModelServer::default());
    let addr = spawn_app(Arc::clone(&server), dispatcher(204, Some("t"))).await;

    let (status, body) = call("GET", format!("http://{addr}/"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["model"]["state"], "unloaded");

    server.reload(&constant_artifact("v7", 12.5)).unwrap();
    let request = serde_json::json!({
        "trip_distance": 2.5,
        "PULocationID": 132,
        "DOLocationID": 230,
        "hour": 17,
        "day_of_week": 4
    });
    let (status, body) = call("POST", format!("http://{addr}/predict"), Some(request)).await;
    assert_eq!(status, 200);
    assert_eq!(body["predicted_fare"], 12.5);
    assert_eq!(body["model_version"], "v7");

    let (_, body) = call("GET", format!("http://{addr}/"), None).await;
    assert_eq!(body["model"]["state"], "loaded");
    assert_eq!(body["model"]["version"], "v7");
}

#[tokio::test]
async fn test_predict_out_of_range_is_500_with_cause() {
    let server = Arc::new(ModelServer::default());
    server.reload(&constant_artifact("v1", 1.0)).unwrap();
    let addr = spawn_app(server, dispatcher(204, Some("t"))).await;

    let mut request = serde_json::to_value(ride()).unwrap();
    request["hour"] = serde_json::json!(31);
    let (status, body) = call("POST", format!("http://{addr}/predict"), Some(request)).await;
    assert_eq!(status, 500);
    assert!(body["detail"].as_str().unwrap().contains("hour"));
}

#[tokio::test]
async fn test_predict_wrong_types_rejected() {
    let server = Arc::new(ModelServer::default());
    server.reload(&constant_artifact("v1", 1.0)).unwrap();
    let addr = spawn_app(server, dispatcher(204, Some("t"))).await;

    let request = serde_json::json!({"trip_distance": "far", "PULocationID": 1});
    let (status, _) = call("POST", format!("http://{addr}/predict"), Some(request)).await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn test_operator_endpoints_dispatch_string_flag() {
    let addr = spawn_app(Arc::new(ModelServer::default()), dispatcher(204, Some("t"))).await;

    let (status, body) = call("POST", format!("http://{addr}/simulate-drift"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["simulate_drift"], "true");
    assert_eq!(body["http_status"], 204);

    let (status, body) = call("POST", format!("http://{addr}/reset-model"), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["simulate_drift"], "false");
    assert_eq!(body["action"], "reset_model");
}

#[tokio::test]
async fn test_operator_endpoint_reports_failed_dispatch() {
    let addr = spawn_app(Arc::new(ModelServer::default()), dispatcher(500, Some("t"))).await;
    let (status, body) = call("POST", format!("http://{addr}/simulate-drift"), None).await;
    assert_eq!(status, 502);
    assert_eq!(body["status"], "failure");
    assert_eq!(body["http_status"], 500);
}

#[tokio::test]
async fn test_operator_endpoint_without_token() {
    let addr = spawn_app(Arc::new(ModelServer::default()), dispatcher(204, None)).await;
    let (status, body) = call("POST", format!("http://{addr}/reset-model"), None).await;
    assert_eq!(status, 500);
    assert!(body["detail"].as_str().unwrap().contains("Configuration error"));
}
