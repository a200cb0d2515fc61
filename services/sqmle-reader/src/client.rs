//! TCP client for one SQM-LE unit.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use photometer_common::{Device, ReaderError, ReaderResult, Reading};

use crate::protocol::{SqmCommand, SqmResponse};

/// Connect and read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest response accepted from the unit.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Talks to a single SQM-LE over one short-lived connection per command.
///
/// Failures are reported to the caller as they are; the client never retries.
pub struct SqmleClient {
    device: Device,
    addr: String,
    timeout: Duration,
    effective_serial: Option<String>,
}

impl SqmleClient {
    /// The device must have an endpoint.
    pub fn new(device: Device) -> ReaderResult<Self> {
        let endpoint = device.endpoint.as_ref().ok_or_else(|| {
            ReaderError::Config(format!(
                "Device {} has no ip/port configured",
                device.serial_id
            ))
        })?;
        let addr = endpoint.to_string();
        let effective_serial = device.serial_number.clone();

        Ok(Self {
            device,
            addr,
            timeout: DEFAULT_TIMEOUT,
            effective_serial,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The configured serial, or the one the unit reported if none was configured.
    pub fn effective_serial(&self) -> Option<&str> {
        self.effective_serial.as_deref()
    }

    /// Send `command` and parse the response.
    #[instrument(skip(self), fields(device = %self.device.serial_id, addr = %self.addr))]
    pub async fn query(&self, command: SqmCommand) -> ReaderResult<SqmResponse> {
        let mut stream = match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ReaderError::Connect {
                    addr: self.addr.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => return Err(self.timed_out("connect")),
        };
        debug!("Connected");

        match timeout(self.timeout, stream.write_all(command.bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(ReaderError::Connect {
                    addr: self.addr.clone(),
                    message: format!("failed to send command: {}", e),
                })
            }
            Err(_) => return Err(self.timed_out("write")),
        }

        let raw = self.read_response(&mut stream).await?;

        let text = String::from_utf8_lossy(&raw);
        info!(response = %text.trim_end(), "SQM-LE response");
        if text.trim().is_empty() {
            return Err(ReaderError::Parse(format!(
                "Empty '{}' response from {}",
                command, self.addr
            )));
        }

        SqmResponse::parse(command, &text)
    }

    /// Take one reading with `command` and enrich it with device metadata.
    ///
    /// A reported serial that differs from the configured one is logged and
    /// the reading is still returned. With no configured serial, the first
    /// reported one is adopted.
    pub async fn poll(&mut self, command: SqmCommand, now: DateTime<Utc>) -> ReaderResult<Reading> {
        let response = self.query(command).await?;

        if let Some(reported) = response.serial_number() {
            match &self.effective_serial {
                Some(expected) if expected != reported => {
                    warn!(
                        device = %self.device.serial_id,
                        expected = %expected,
                        reported = %reported,
                        "Serial number mismatch"
                    );
                }
                Some(_) => {}
                None => {
                    info!(
                        device = %self.device.serial_id,
                        serial = %reported,
                        "Adopting reported serial number"
                    );
                    self.effective_serial = Some(reported.to_string());
                }
            }
        }

        Ok(Reading::augment(response.into_fields(), &self.device, now))
    }

    /// Read until a newline, end of stream or a full buffer. Units that do
    /// not terminate their line get whatever arrived before the deadline.
    async fn read_response(&self, stream: &mut TcpStream) -> ReaderResult<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut len = 0;

        while len < buf.len() {
            match timeout_at(deadline, stream.read(&mut buf[len..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    len += n;
                    if buf[..len].contains(&b'\n') {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    return Err(ReaderError::Connect {
                        addr: self.addr.clone(),
                        message: format!("failed to read response: {}", e),
                    })
                }
                Err(_) if len > 0 => {
                    debug!(bytes = len, "Response not terminated, using what arrived");
                    break;
                }
                Err(_) => return Err(self.timed_out("read")),
            }
        }

        buf.truncate(len);
        Ok(buf)
    }

    fn timed_out(&self, stage: &'static str) -> ReaderError {
        ReaderError::Timeout {
            addr: self.addr.clone(),
            stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photometer_common::{DeviceKind, Endpoint, Site};
    use std::sync::Arc;

    fn device(endpoint: Option<Endpoint>) -> ReaderResult<Device> {
        let site = Site::new("ctio", "CTIO", -30.169166, -70.804, 2174.0, "America/Santiago")?;
        Device::new("sqm-1", DeviceKind::Sqmle, 90.0, 0.0, Arc::new(site), endpoint)
    }

    #[test]
    fn test_client_uses_device_endpoint() {
        let device = device(Some(Endpoint {
            ip: "192.168.1.50".to_string(),
            port: 10001,
        }))
        .unwrap()
        .with_serial_number(Some("SN9".to_string()));

        let client = SqmleClient::new(device).unwrap();
        assert_eq!(client.addr(), "192.168.1.50:10001");
        assert_eq!(client.effective_serial(), Some("SN9"));
    }

    #[test]
    fn test_timeout_error_names_stage() {
        let device = device(Some(Endpoint {
            ip: "127.0.0.1".to_string(),
            port: 1,
        }))
        .unwrap();
        let client = SqmleClient::new(device).unwrap().with_timeout(Duration::from_millis(10));

        match client.timed_out("read") {
            ReaderError::Timeout { addr, stage } => {
                assert_eq!(addr, "127.0.0.1:1");
                assert_eq!(stage, "read");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
