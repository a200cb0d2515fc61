//! UDP receive loop.
//!
//! Datagrams are handled strictly one at a time: decode, resolve, gate and
//! dispatch all complete before the next `recv_from`. That keeps per-device
//! file appends in arrival order. Nothing received is ever buffered or
//! retried; a deferred or unknown datagram is logged and discarded.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use photometer_common::gate::format_wait;
use photometer_common::{
    DeviceKind, GateDecision, Reading, ReaderError, ReaderResult, Registry, WindowGate,
};
use sinks::{DispatchReport, SinkDispatcher};

/// Largest datagram accepted; TESS-W payloads are well under 1 KiB.
const MAX_DATAGRAM: usize = 4096;

/// Field carrying the device serial in every datagram.
const NAME_FIELD: &str = "name";

/// What happened to one datagram.
#[derive(Debug)]
pub enum DatagramOutcome {
    Dispatched(DispatchReport),
    Deferred { device: String, wait: Duration },
    UnknownDevice(String),
    Malformed(ReaderError),
}

impl DatagramOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Dispatched(_) => "dispatched",
            Self::Deferred { .. } => "deferred",
            Self::UnknownDevice(_) => "unknown_device",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Counters accumulated over a listener's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub dispatched: u64,
    pub deferred: u64,
    pub unknown: u64,
    pub malformed: u64,
}

impl ListenerStats {
    fn record(&mut self, outcome: &DatagramOutcome) {
        self.received += 1;
        match outcome {
            DatagramOutcome::Dispatched(_) => self.dispatched += 1,
            DatagramOutcome::Deferred { .. } => self.deferred += 1,
            DatagramOutcome::UnknownDevice(_) => self.unknown += 1,
            DatagramOutcome::Malformed(_) => self.malformed += 1,
        }
    }
}

/// Decode a datagram into its JSON object and device name.
pub fn decode_datagram(data: &[u8]) -> ReaderResult<(String, Map<String, Value>)> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ReaderError::Parse(format!("Datagram is not UTF-8: {}", e)))?;

    let payload = match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => map,
        other => {
            return Err(ReaderError::Parse(format!(
                "Datagram is not a JSON object: {}",
                other
            )))
        }
    };

    let name = match payload.get(NAME_FIELD) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(ReaderError::Parse(format!(
                "Field '{}' has unexpected type: {}",
                NAME_FIELD, other
            )))
        }
        None => {
            return Err(ReaderError::Parse(format!(
                "Datagram has no '{}' field",
                NAME_FIELD
            )))
        }
    };

    Ok((name, payload))
}

/// Receives TESS-W 4C datagrams on one socket.
pub struct Tessw4cListener {
    socket: UdpSocket,
    registry: Arc<Registry>,
    gate: Arc<dyn WindowGate>,
    dispatcher: SinkDispatcher,
}

impl Tessw4cListener {
    /// Bind the socket. Only TESS-W 4C devices in `registry` are resolvable.
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<Registry>,
        gate: Arc<dyn WindowGate>,
        dispatcher: SinkDispatcher,
    ) -> ReaderResult<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            ReaderError::Config(format!("Failed to bind UDP socket {}: {}", addr, e))
        })?;
        info!(addr = %socket.local_addr()?, "TESSW4C listener bound");

        Ok(Self {
            socket,
            registry,
            gate,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> ReaderResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Process one datagram received at `now`.
    #[instrument(skip_all, fields(peer = %peer, bytes = data.len()))]
    pub async fn handle_datagram(
        &self,
        data: &[u8],
        peer: SocketAddr,
        now: DateTime<Utc>,
    ) -> DatagramOutcome {
        let outcome = self.process(data, now).await;
        counter!("tessw4c_datagrams_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn process(&self, data: &[u8], now: DateTime<Utc>) -> DatagramOutcome {
        let (name, payload) = match decode_datagram(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Dropping malformed datagram");
                return DatagramOutcome::Malformed(e);
            }
        };

        let device = match self.registry.resolve(&name) {
            Some(device) if device.kind == DeviceKind::Tessw4c => device,
            _ => {
                debug!(device = %name, "No matching device found, dropping datagram");
                return DatagramOutcome::UnknownDevice(name);
            }
        };
        debug!(device = %device.serial_id, site = %device.site.id, "Found device");

        if let GateDecision::Defer { wait, until } = self.gate.decide(&device.site, now) {
            debug!(
                device = %device.serial_id,
                wait = %format_wait(wait),
                next_sunset = %until.map(|t| device.site.local_time(t)).unwrap_or_default(),
                "Waiting for next night window"
            );
            return DatagramOutcome::Deferred {
                device: device.serial_id.clone(),
                wait,
            };
        }

        info!(device = %device.serial_id, "TESSW4C reading received");
        let reading = Reading::augment(payload, device, now);
        DatagramOutcome::Dispatched(self.dispatcher.dispatch(&reading).await)
    }

    /// Receive until `shutdown` fires. A datagram being handled when the
    /// signal arrives is finished first. The socket closes on return.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> ReaderResult<ListenerStats> {
        let mut stats = ListenerStats::default();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        info!(addr = %self.local_addr()?, "TESSW4C listening");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("TESSW4C stopped by user");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            let outcome = self.handle_datagram(&buf[..len], peer, Utc::now()).await;
                            stats.record(&outcome);
                        }
                        Err(e) => warn!(error = %e, "UDP receive failed"),
                    }
                }
            }
        }

        info!(
            received = stats.received,
            dispatched = stats.dispatched,
            deferred = stats.deferred,
            unknown = stats.unknown,
            malformed = stats.malformed,
            "TESSW4C listener closed"
        );
        Ok(stats)
    }
}
