//! SQM-LE client and poller against a scripted loopback unit.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

use photometer_common::{Device, GateDecision, OpenGate, ReaderError, Site, WindowGate};
use sinks::{Sink, SinkDispatcher};
use sqmle_reader::{PollSchedule, SqmCommand, SqmleClient, SqmlePoller};
use test_utils::{sqmle_registry, FakeSqmle, LogCapture, RecordingSink, SQM_SERIAL};

const RX_RESPONSE: &str = "i,12.34,56.7,8,9.0,21.5,SN001\r\n";

struct Daytime;

impl WindowGate for Daytime {
    fn decide(&self, _site: &Site, _now: DateTime<Utc>) -> GateDecision {
        GateDecision::Defer {
            wait: Duration::hours(1),
            until: None,
        }
    }
}

fn device_at(port: u16, serial_number: Option<&str>) -> Device {
    sqmle_registry("127.0.0.1", port, serial_number)
        .resolve(SQM_SERIAL)
        .cloned()
        .expect("fixture device")
}

fn client_at(port: u16, serial_number: Option<&str>) -> SqmleClient {
    SqmleClient::new(device_at(port, serial_number))
        .unwrap()
        .with_timeout(StdDuration::from_millis(500))
}

fn fast_schedule(number_of_reads: u32) -> PollSchedule {
    PollSchedule {
        command: SqmCommand::ReadWithSerial,
        number_of_reads,
        reads_frequency: StdDuration::from_millis(10),
    }
}

#[tokio::test]
async fn test_read_with_serial_end_to_end() {
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let mut client = client_at(unit.port(), None);

    let now = Utc.with_ymd_and_hms(2024, 12, 3, 5, 0, 0).unwrap();
    let reading = client.poll(SqmCommand::ReadWithSerial, now).await.unwrap();

    assert_eq!(unit.commands().await, vec!["Rx\r\n"]);
    for (key, expected) in [
        ("type", json!("i")),
        ("magnitude", json!(12.34)),
        ("frequency", json!(56.7)),
        ("period_count", json!(8.0)),
        ("period_seconds", json!(9.0)),
        ("temperature", json!(21.5)),
        ("serial_number", json!("SN001")),
    ] {
        assert_eq!(reading.get(key), Some(&expected), "field {}", key);
    }
    assert_eq!(reading.get("site"), Some(&Value::from("ctio")));
    assert_eq!(reading.get("altitude").and_then(Value::as_f64), Some(90.0));
    assert_eq!(reading.identity, "sqmle_sqm-ctio");

    let columns = reading.columns();
    assert_eq!(columns[0], "type");
    assert_eq!(columns[6], "serial_number");
    assert_eq!(columns[7], "timestamp");
}

#[tokio::test]
async fn test_unconfigured_serial_is_adopted() {
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let mut client = client_at(unit.port(), None);
    assert_eq!(client.effective_serial(), None);

    assert_ok!(client.poll(SqmCommand::ReadWithSerial, Utc::now()).await);
    assert_eq!(client.effective_serial(), Some("SN001"));
}

#[tokio::test]
async fn test_serial_mismatch_still_emits_reading() {
    let logs = LogCapture::new();
    let _guard = logs.set_default();
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let mut client = client_at(unit.port(), Some("SN999"));

    let reading = client.poll(SqmCommand::ReadWithSerial, Utc::now()).await.unwrap();

    assert_eq!(reading.get("serial_number"), Some(&json!("SN001")));
    assert_eq!(client.effective_serial(), Some("SN999"));

    let warnings = logs.lines_with("Serial number mismatch");
    assert_eq!(warnings.len(), 1, "log was:\n{}", logs.contents());
    assert!(warnings[0].contains("WARN"));
    assert!(warnings[0].contains("expected=SN999"));
    assert!(warnings[0].contains("reported=SN001"));
}

#[tokio::test]
async fn test_matching_serial_logs_no_mismatch() {
    let logs = LogCapture::new();
    let _guard = logs.set_default();
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let mut client = client_at(unit.port(), Some("SN001"));

    assert_ok!(client.poll(SqmCommand::ReadWithSerial, Utc::now()).await);
    assert!(!logs.contains("Serial number mismatch"));
}

#[tokio::test]
async fn test_unterminated_response_on_open_socket() {
    let unit = FakeSqmle::start_open(&[("Rx\r\n", "i,12.34,56.7,8,9.0,21.5,SN001")]).await;
    let client = SqmleClient::new(device_at(unit.port(), None))
        .unwrap()
        .with_timeout(StdDuration::from_millis(300));

    let response = client.query(SqmCommand::ReadWithSerial).await.unwrap();

    assert_eq!(response.serial_number(), Some("SN001"));
    let fields = response.into_fields();
    assert_eq!(fields["magnitude"], json!(12.34));
    assert_eq!(fields["temperature"], json!(21.5));
}

#[tokio::test]
async fn test_terminated_response_on_open_socket_returns_without_waiting() {
    let unit = FakeSqmle::start_open(&[("Rx\r\n", RX_RESPONSE)]).await;
    let client = SqmleClient::new(device_at(unit.port(), None))
        .unwrap()
        .with_timeout(StdDuration::from_secs(5));

    let started = std::time::Instant::now();
    assert_ok!(client.query(SqmCommand::ReadWithSerial).await);
    assert!(started.elapsed() < StdDuration::from_secs(2));
}

#[tokio::test]
async fn test_short_response_is_parse_error() {
    let unit = FakeSqmle::start(&[("Rx\r\n", "i,12.34,56.7,8,9.0,21.5\r\n")]).await;
    let mut client = client_at(unit.port(), None);

    let err = client.poll(SqmCommand::ReadWithSerial, Utc::now()).await.unwrap_err();
    assert!(matches!(err, ReaderError::Parse(_)), "got {:?}", err);
    assert_eq!(client.effective_serial(), None);
}

#[tokio::test]
async fn test_unit_info_command() {
    let unit = FakeSqmle::start(&[("ix\r\n", "i,00000004,00000003,00000012,00002345\r\n")]).await;
    let client = client_at(unit.port(), None);

    let response = client.query(SqmCommand::UnitInfo).await.unwrap();
    assert_eq!(response.serial_number(), Some("00002345"));
    assert_eq!(unit.commands().await, vec!["ix\r\n"]);
}

#[tokio::test]
async fn test_silent_unit_times_out() {
    let unit = FakeSqmle::silent().await;
    let client = SqmleClient::new(device_at(unit.port(), None))
        .unwrap()
        .with_timeout(StdDuration::from_millis(200));

    let err = client.query(SqmCommand::ReadWithSerial).await.unwrap_err();
    match err {
        ReaderError::Timeout { stage, .. } => assert_eq!(stage, "read"),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = client_at(port, None);
    let result = client.query(SqmCommand::ReadWithSerial).await;
    assert_err!(&result);
    assert!(matches!(result, Err(ReaderError::Connect { .. })));
}

#[tokio::test]
async fn test_poller_takes_configured_number_of_reads() {
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let sink = Arc::new(RecordingSink::new());
    let poller = SqmlePoller::new(
        client_at(unit.port(), None),
        fast_schedule(2),
        Arc::new(OpenGate),
        SinkDispatcher::new(vec![sink.clone() as Arc<dyn Sink>]),
    );

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let stats = poller.run(shutdown_rx).await;

    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(sink.len().await, 2);
    assert_eq!(unit.commands().await.len(), 2);
}

#[tokio::test]
async fn test_poller_keeps_going_after_failures() {
    let unit = FakeSqmle::start(&[("Rx\r\n", "garbage\r\n")]).await;
    let sink = Arc::new(RecordingSink::new());
    let poller = SqmlePoller::new(
        client_at(unit.port(), None),
        fast_schedule(3),
        Arc::new(OpenGate),
        SinkDispatcher::new(vec![sink.clone() as Arc<dyn Sink>]),
    );

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let stats = poller.run(shutdown_rx).await;

    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.failed, 3);
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_poller_does_not_poll_during_the_day() {
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let sink = Arc::new(RecordingSink::new());
    let poller = SqmlePoller::new(
        client_at(unit.port(), None),
        fast_schedule(1),
        Arc::new(Daytime),
        SinkDispatcher::new(vec![sink.clone() as Arc<dyn Sink>]),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(poller.run(shutdown_rx));
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();
    let stats = handle.await.unwrap();

    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.attempted, 0);
    assert!(unit.commands().await.is_empty());
    assert_eq!(sink.len().await, 0);
}

#[tokio::test]
async fn test_unbounded_poller_stops_on_shutdown() {
    let unit = FakeSqmle::start(&[("Rx\r\n", RX_RESPONSE)]).await;
    let sink = Arc::new(RecordingSink::new());
    let poller = SqmlePoller::new(
        client_at(unit.port(), None),
        fast_schedule(0),
        Arc::new(OpenGate),
        SinkDispatcher::new(vec![sink.clone() as Arc<dyn Sink>]),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(poller.run(shutdown_rx));

    tokio::time::timeout(StdDuration::from_secs(5), sink.wait_for(3))
        .await
        .expect("several readings dispatched");
    shutdown_tx.send(()).unwrap();
    let stats = handle.await.unwrap();

    assert!(stats.dispatched >= 3);
    assert_eq!(stats.failed, 0);
}
