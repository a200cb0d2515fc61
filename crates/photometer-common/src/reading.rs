//! Readings handed from acquisition loops to sinks.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::device::{Device, DeviceKind};

/// Prefix marking a frequency-channel group (`"F1": {"mag": 10.1, ...}`).
const CHANNEL_GROUP_PREFIX: char = 'F';

/// A single enriched measurement.
///
/// Field order is the order in which the device reported values followed by
/// the augmentation fields, and is the column order used by file output.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub serial_id: String,
    pub kind: DeviceKind,
    pub identity: String,
    pub site_id: String,
    pub timezone: Tz,
    pub timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

impl Reading {
    /// Enrich a raw device payload with timestamp and device/site metadata.
    pub fn augment(
        mut payload: Map<String, Value>,
        device: &Device,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let site = &device.site;

        payload.insert(
            "timestamp".to_string(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        payload.insert("altitude".to_string(), Value::from(device.altitude));
        payload.insert("azimuth".to_string(), Value::from(device.azimuth));
        payload.insert("site".to_string(), Value::String(site.id.clone()));
        payload.insert(
            "timezone".to_string(),
            Value::String(site.timezone.name().to_string()),
        );
        payload.insert("latitude".to_string(), Value::from(site.latitude));
        payload.insert("longitude".to_string(), Value::from(site.longitude));
        payload.insert("elevation".to_string(), Value::from(site.elevation));

        Self {
            serial_id: device.serial_id.clone(),
            kind: device.kind,
            identity: device.identity(),
            site_id: site.id.clone(),
            timezone: site.timezone,
            timestamp,
            fields: payload,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a column by its flattened name, e.g. `F1_mag`.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.flattened()
            .into_iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Column names with channel groups flattened to `parent_subkey`.
    pub fn columns(&self) -> Vec<String> {
        self.flattened().into_iter().map(|(name, _)| name).collect()
    }

    /// Column values rendered as plain text, aligned with [`Reading::columns`].
    pub fn values(&self) -> Vec<String> {
        self.flattened()
            .into_iter()
            .map(|(_, value)| render(value))
            .collect()
    }

    /// The reading as a JSON object, channel groups kept nested.
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    fn flattened(&self) -> Vec<(String, &Value)> {
        let mut out = Vec::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            match value {
                Value::Object(group) if key.starts_with(CHANNEL_GROUP_PREFIX) => {
                    for (subkey, subvalue) in group {
                        out.push((format!("{}_{}", key, subkey), subvalue));
                    }
                }
                _ => out.push((key.clone(), value)),
            }
        }
        out
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
