//! Site/device registry loaded once at startup.
//!
//! The registry document lists sites, each carrying its devices:
//!
//! ```yaml
//! sites:
//!   - id: ctio
//!     name: Cerro Tololo
//!     latitude: -30.169166
//!     longitude: -70.804
//!     elevation: 2174
//!     timezone: America/Santiago
//!     devices:
//!       - serial_id: "1823"
//!         type: tessw4c
//!         altitude: 45
//!         azimuth: 0
//!         active: true
//! ```
//!
//! After loading, the registry is immutable and can be shared behind an
//! `Arc` by any number of acquisition loops without locking.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceKind, Endpoint};
use crate::env::expand_env_vars;
use crate::error::{ReaderError, ReaderResult};
use crate::site::Site;

// ============================================================================
// Configuration document
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub timezone: String,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub serial_id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub altitude: f64,
    pub azimuth: f64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub serial_number: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Serials are often written bare (`serial_id: 1823`); accept both forms.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(d)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_or_number")] String);

    Ok(Option::<Wrapper>::deserialize(d)?.map(|Wrapper(s)| s))
}

// ============================================================================
// Registry
// ============================================================================

/// Read-only mapping from identifiers to sites and devices.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    sites: BTreeMap<String, Arc<Site>>,
    devices: HashMap<String, Device>,
}

impl Registry {
    /// Load a registry document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> ReaderResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ReaderError::Config(format!(
                "Site and device configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), "Loading site and device registry");
        Self::from_yaml_str(&content)
    }

    /// Parse a registry document, expanding `${VAR}` references first.
    pub fn from_yaml_str(content: &str) -> ReaderResult<Self> {
        let expanded = expand_env_vars(content)?;
        let config: RegistryConfig = serde_yaml::from_str(&expanded)?;
        Self::from_config(config)
    }

    /// Build and validate a registry from an already parsed document.
    pub fn from_config(config: RegistryConfig) -> ReaderResult<Self> {
        if config.sites.is_empty() {
            return Err(ReaderError::Config("No sites defined".to_string()));
        }

        let mut registry = Registry::default();

        for entry in config.sites {
            let site = Arc::new(Site::new(
                entry.id.clone(),
                entry.name.clone(),
                entry.latitude,
                entry.longitude,
                entry.elevation,
                &entry.timezone,
            )?);

            if registry.sites.contains_key(&site.id) {
                return Err(ReaderError::Config(format!("Duplicate site id: {}", site.id)));
            }
            info!(site = %site.id, name = %site.name, "Adding site");

            let mut admitted = 0usize;
            for device_entry in entry.devices {
                let kind: DeviceKind = device_entry.device_type.parse()?;
                if !device_entry.active {
                    debug!(serial_id = %device_entry.serial_id, "Skipping inactive device");
                    continue;
                }

                let endpoint = match (device_entry.ip, device_entry.port) {
                    (Some(ip), Some(port)) => Some(Endpoint { ip, port }),
                    _ => None,
                };
                let device = Device::new(
                    device_entry.serial_id,
                    kind,
                    device_entry.altitude,
                    device_entry.azimuth,
                    site.clone(),
                    endpoint,
                )?
                .with_serial_number(device_entry.serial_number);

                if registry.devices.contains_key(&device.serial_id) {
                    return Err(ReaderError::Config(format!(
                        "Duplicate device serial id: {}",
                        device.serial_id
                    )));
                }

                info!(
                    kind = %device.kind,
                    serial_id = %device.serial_id,
                    site = %site.id,
                    "Adding device"
                );
                registry.devices.insert(device.serial_id.clone(), device);
                admitted += 1;
            }

            if admitted == 0 {
                warn!(site = %site.id, "No active devices found for site");
            }
            registry.sites.insert(site.id.clone(), site);
        }

        Ok(registry)
    }

    /// Keep only devices of the given kind; sites are kept regardless.
    pub fn retain_kind(mut self, kind: DeviceKind) -> Self {
        self.devices.retain(|_, device| device.kind == kind);
        self
    }

    /// Look up a device by serial id.
    pub fn resolve(&self, serial_id: &str) -> Option<&Device> {
        self.devices.get(serial_id)
    }

    /// Like [`Registry::resolve`], but a miss is an error.
    pub fn require(&self, serial_id: &str) -> ReaderResult<&Device> {
        self.resolve(serial_id)
            .ok_or_else(|| ReaderError::UnknownDevice(serial_id.to_string()))
    }

    pub fn site(&self, id: &str) -> Option<&Arc<Site>> {
        self.sites.get(id)
    }

    pub fn sites(&self) -> impl Iterator<Item = &Arc<Site>> {
        self.sites.values()
    }

    /// Devices sorted by serial id.
    pub fn devices(&self) -> Vec<&Device> {
        let mut devices: Vec<&Device> = self.devices.values().collect();
        devices.sort_by(|a, b| a.serial_id.cmp(&b.serial_id));
        devices
    }

    pub fn devices_of(&self, kind: DeviceKind) -> Vec<&Device> {
        self.devices()
            .into_iter()
            .filter(|device| device.kind == kind)
            .collect()
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

/// Example registry document printed by `--config-file-example`.
pub fn example_config() -> RegistryConfig {
    RegistryConfig {
        sites: vec![SiteEntry {
            id: "ctio".to_string(),
            name: "Cerro Tololo Inter-American Observatory".to_string(),
            latitude: -30.169166,
            longitude: -70.804,
            elevation: 2174.0,
            timezone: "America/Santiago".to_string(),
            devices: vec![
                DeviceEntry {
                    serial_id: "1823".to_string(),
                    device_type: "tessw4c".to_string(),
                    altitude: 45.0,
                    azimuth: 0.0,
                    active: true,
                    ip: None,
                    port: None,
                    serial_number: None,
                },
                DeviceEntry {
                    serial_id: "sqmle-01".to_string(),
                    device_type: "sqmle".to_string(),
                    altitude: 90.0,
                    azimuth: 0.0,
                    active: true,
                    ip: Some("192.168.1.50".to_string()),
                    port: Some(10001),
                    serial_number: None,
                },
            ],
        }],
    }
}
