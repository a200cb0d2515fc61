//! Photometer devices.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ReaderError, ReaderResult};
use crate::site::Site;

/// Supported photometer families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceKind {
    /// Unihedron SQM-LE, polled over TCP.
    Sqmle,
    /// TESS-W 4C, pushes JSON datagrams over UDP.
    Tessw4c,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqmle => "SQMLE",
            Self::Tessw4c => "TESSW4C",
        }
    }

    /// Lowercase form used in file names.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Sqmle => "sqmle",
            Self::Tessw4c => "tessw4c",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SQMLE" | "SQM-LE" => Ok(Self::Sqmle),
            "TESSW4C" | "TESS-W4C" => Ok(Self::Tessw4c),
            other => Err(ReaderError::Config(format!("Unknown device type: {}", other))),
        }
    }
}

/// Network address of a polled device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A single physical photometer mounted at a site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub serial_id: String,
    pub kind: DeviceKind,
    /// Mounting altitude in degrees.
    pub altitude: f64,
    /// Mounting azimuth in degrees.
    pub azimuth: f64,
    #[serde(skip)]
    pub site: Arc<Site>,
    pub endpoint: Option<Endpoint>,
    /// Serial number expected from the unit itself, when known up front.
    pub serial_number: Option<String>,
}

impl Device {
    /// Create a validated device. SQM-LE units must carry an endpoint.
    pub fn new(
        serial_id: impl Into<String>,
        kind: DeviceKind,
        altitude: f64,
        azimuth: f64,
        site: Arc<Site>,
        endpoint: Option<Endpoint>,
    ) -> ReaderResult<Self> {
        let serial_id = serial_id.into();
        if serial_id.trim().is_empty() {
            return Err(ReaderError::Config(format!(
                "Device at site '{}' has an empty serial id",
                site.id
            )));
        }
        if kind == DeviceKind::Sqmle && endpoint.is_none() {
            return Err(ReaderError::Config(format!(
                "SQMLE device '{}' requires both ip and port",
                serial_id
            )));
        }

        Ok(Self {
            serial_id,
            kind,
            altitude,
            azimuth,
            site,
            endpoint,
            serial_number: None,
        })
    }

    pub fn with_serial_number(mut self, serial_number: Option<String>) -> Self {
        self.serial_number = serial_number;
        self
    }

    /// Identity used in output file names, e.g. `tessw4c_1823`.
    pub fn identity(&self) -> String {
        format!("{}_{}", self.kind.slug(), self.serial_id)
    }
}
