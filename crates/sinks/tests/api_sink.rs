//! API sink against a loopback axum server.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use photometer_common::{Device, DeviceKind, Reading, ReaderError, Site};
use sinks::{ApiSink, Sink};

type Received = Arc<Mutex<Vec<Value>>>;

async fn accept(State(received): State<Received>, Json(body): Json<Value>) -> StatusCode {
    received.lock().await.push(body);
    StatusCode::CREATED
}

async fn reject() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/readings", addr)
}

fn reading() -> Reading {
    let site = Site::new("ctio", "CTIO", -30.169166, -70.804, 2174.0, "America/Santiago").unwrap();
    let device = Device::new("1823", DeviceKind::Tessw4c, 45.0, 0.0, Arc::new(site), None).unwrap();
    let payload = json!({"name": "1823", "F1": {"mag": 10.1}});
    Reading::augment(payload.as_object().cloned().unwrap(), &device, Utc::now())
}

#[tokio::test]
async fn test_posts_reading_as_json() {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/readings", post(accept))
        .with_state(received.clone());
    let url = serve(router).await;

    let sink = ApiSink::new(url, Duration::from_secs(5)).unwrap();
    tokio_test::assert_ok!(sink.write(&reading()).await);

    let bodies = received.lock().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["name"], json!("1823"));
    assert_eq!(bodies[0]["site"], json!("ctio"));
    assert_eq!(bodies[0]["F1"]["mag"], json!(10.1));
}

#[tokio::test]
async fn test_error_status_is_sink_error() {
    let url = serve(Router::new().route("/readings", post(reject))).await;

    let sink = ApiSink::new(url, Duration::from_secs(5)).unwrap();
    let err = sink.write(&reading()).await.unwrap_err();
    assert!(matches!(err, ReaderError::Sink { sink: "api", .. }));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_sink_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = ApiSink::new(format!("http://{}/readings", addr), Duration::from_secs(2)).unwrap();
    tokio_test::assert_err!(sink.write(&reading()).await);
}
