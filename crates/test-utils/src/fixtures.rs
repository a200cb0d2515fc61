//! Registry fixtures.

use std::io::Write;
use std::sync::Arc;

use serde_json::json;
use tempfile::NamedTempFile;

use photometer_common::{Device, DeviceKind, Registry, Site};

/// Serial of the fixture TESS-W 4C.
pub const TESS_SERIAL: &str = "1823";

/// Serial of the fixture SQM-LE.
pub const SQM_SERIAL: &str = "sqm-ctio";

/// CTIO with one active TESS-W 4C and one inactive one.
pub const CTIO_REGISTRY_YAML: &str = r#"
sites:
  - id: ctio
    name: Cerro Tololo Inter-American Observatory
    latitude: -30.169166
    longitude: -70.804
    elevation: 2174
    timezone: America/Santiago
    devices:
      - serial_id: "1823"
        type: tessw4c
        altitude: 45
        azimuth: 0
        active: true
      - serial_id: "1824"
        type: tessw4c
        altitude: 45
        azimuth: 90
        active: false
"#;

pub fn ctio_site() -> Site {
    Site::new(
        "ctio",
        "Cerro Tololo Inter-American Observatory",
        -30.169166,
        -70.804,
        2174.0,
        "America/Santiago",
    )
    .expect("valid fixture site")
}

pub fn ctio_registry() -> Registry {
    Registry::from_yaml_str(CTIO_REGISTRY_YAML).expect("valid fixture registry")
}

/// Registry with a single SQM-LE pointing at `ip:port`.
pub fn sqmle_registry(ip: &str, port: u16, serial_number: Option<&str>) -> Registry {
    let serial_line = serial_number
        .map(|s| format!("        serial_number: \"{}\"\n", s))
        .unwrap_or_default();
    let yaml = format!(
        r#"
sites:
  - id: ctio
    name: Cerro Tololo Inter-American Observatory
    latitude: -30.169166
    longitude: -70.804
    elevation: 2174
    timezone: America/Santiago
    devices:
      - serial_id: "{serial}"
        type: sqmle
        altitude: 90
        azimuth: 0
        active: true
        ip: "{ip}"
        port: {port}
{serial_line}"#,
        serial = SQM_SERIAL,
        ip = ip,
        port = port,
        serial_line = serial_line,
    );
    Registry::from_yaml_str(&yaml).expect("valid fixture registry")
}

pub fn tess_device() -> Device {
    Device::new(
        TESS_SERIAL,
        DeviceKind::Tessw4c,
        45.0,
        0.0,
        Arc::new(ctio_site()),
        None,
    )
    .expect("valid fixture device")
}

/// Write a registry document to a temporary file.
pub fn registry_file(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp registry");
    file.write_all(yaml.as_bytes()).expect("write temp registry");
    file
}

/// A TESS-W 4C datagram with a single `F1` magnitude.
pub fn tess_datagram(name: &str, magnitude: f64) -> Vec<u8> {
    serde_json::to_vec(&json!({ "name": name, "F1": { "mag": magnitude } }))
        .expect("serializable datagram")
}
