//! SQM-LE wire protocol.
//!
//! Commands are four ASCII bytes including the trailing `\r\n`. Each
//! response is a single comma-separated line whose layout depends on the
//! command that was sent.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use photometer_common::{ReaderError, ReaderResult};

/// The four commands an SQM-LE understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqmCommand {
    /// `rx`: plain reading.
    Read,
    /// `Rx`: reading with the unit's serial number appended.
    #[default]
    ReadWithSerial,
    /// `cx`: calibration information.
    Calibration,
    /// `ix`: unit information.
    UnitInfo,
}

impl SqmCommand {
    /// Bytes sent on the wire.
    pub fn bytes(&self) -> &'static [u8; 4] {
        match self {
            Self::Read => b"rx\r\n",
            Self::ReadWithSerial => b"Rx\r\n",
            Self::Calibration => b"cx\r\n",
            Self::UnitInfo => b"ix\r\n",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "rx",
            Self::ReadWithSerial => "Rx",
            Self::Calibration => "cx",
            Self::UnitInfo => "ix",
        }
    }

    /// Number of comma-separated fields in the response.
    pub fn field_count(&self) -> usize {
        match self {
            Self::Read => 6,
            Self::ReadWithSerial => 7,
            Self::Calibration => 6,
            Self::UnitInfo => 5,
        }
    }
}

impl fmt::Display for SqmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case matters: `rx` and `Rx` are different commands.
impl FromStr for SqmCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rx" => Ok(Self::Read),
            "Rx" => Ok(Self::ReadWithSerial),
            "cx" => Ok(Self::Calibration),
            "ix" => Ok(Self::UnitInfo),
            other => Err(format!(
                "Unknown SQM-LE command '{}', expected one of rx, Rx, cx, ix",
                other
            )),
        }
    }
}

/// Response to `rx` and `Rx`.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: String,
    pub magnitude: f64,
    pub frequency: f64,
    pub period_count: f64,
    pub period_seconds: f64,
    pub temperature: f64,
    /// Only present for `Rx`.
    pub serial_number: Option<String>,
}

/// Response to `cx`.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub kind: String,
    pub magnitude_offset_calibration: f64,
    pub dark_period: f64,
    pub temperature_light_calibration: f64,
    pub magnitude_offset_manufacturer: f64,
    pub temperature_dark_calibration: f64,
}

/// Response to `ix`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    pub kind: String,
    pub protocol_number: String,
    pub model_number: String,
    pub feature_number: String,
    pub serial_number: String,
}

/// A parsed response line.
#[derive(Debug, Clone, PartialEq)]
pub enum SqmResponse {
    Measurement(Measurement),
    Calibration(Calibration),
    UnitInfo(UnitInfo),
}

impl SqmResponse {
    /// Parse `line` as the answer to `command`.
    ///
    /// The field count must match the command exactly and every numeric
    /// field must parse; nothing is defaulted.
    pub fn parse(command: SqmCommand, line: &str) -> ReaderResult<Self> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n' || c == '\0');
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        if fields.len() != command.field_count() {
            return Err(ReaderError::Parse(format!(
                "'{}' response has {} fields, expected {}: {:?}",
                command,
                fields.len(),
                command.field_count(),
                line
            )));
        }

        let response = match command {
            SqmCommand::Read | SqmCommand::ReadWithSerial => Self::Measurement(Measurement {
                kind: fields[0].to_string(),
                magnitude: number(&fields, 1, "magnitude")?,
                frequency: number(&fields, 2, "frequency")?,
                period_count: number(&fields, 3, "period_count")?,
                period_seconds: number(&fields, 4, "period_seconds")?,
                temperature: number(&fields, 5, "temperature")?,
                serial_number: match command {
                    SqmCommand::ReadWithSerial => Some(fields[6].to_string()),
                    _ => None,
                },
            }),
            SqmCommand::Calibration => Self::Calibration(Calibration {
                kind: fields[0].to_string(),
                magnitude_offset_calibration: number(&fields, 1, "magnitude_offset_calibration")?,
                dark_period: number(&fields, 2, "dark_period")?,
                temperature_light_calibration: number(&fields, 3, "temperature_light_calibration")?,
                magnitude_offset_manufacturer: number(&fields, 4, "magnitude_offset_manufacturer")?,
                temperature_dark_calibration: number(&fields, 5, "temperature_dark_calibration")?,
            }),
            SqmCommand::UnitInfo => Self::UnitInfo(UnitInfo {
                kind: fields[0].to_string(),
                protocol_number: fields[1].to_string(),
                model_number: fields[2].to_string(),
                feature_number: fields[3].to_string(),
                serial_number: fields[4].to_string(),
            }),
        };

        Ok(response)
    }

    /// Serial number reported by the unit, if the command carries one.
    pub fn serial_number(&self) -> Option<&str> {
        match self {
            Self::Measurement(m) => m.serial_number.as_deref(),
            Self::UnitInfo(info) => Some(&info.serial_number),
            Self::Calibration(_) => None,
        }
    }

    /// Fields in response order, ready to be enriched into a reading.
    pub fn into_fields(self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Self::Measurement(m) => {
                map.insert("type".into(), Value::String(m.kind));
                map.insert("magnitude".into(), Value::from(m.magnitude));
                map.insert("frequency".into(), Value::from(m.frequency));
                map.insert("period_count".into(), Value::from(m.period_count));
                map.insert("period_seconds".into(), Value::from(m.period_seconds));
                map.insert("temperature".into(), Value::from(m.temperature));
                if let Some(serial) = m.serial_number {
                    map.insert("serial_number".into(), Value::String(serial));
                }
            }
            Self::Calibration(c) => {
                map.insert("type".into(), Value::String(c.kind));
                map.insert(
                    "magnitude_offset_calibration".into(),
                    Value::from(c.magnitude_offset_calibration),
                );
                map.insert("dark_period".into(), Value::from(c.dark_period));
                map.insert(
                    "temperature_light_calibration".into(),
                    Value::from(c.temperature_light_calibration),
                );
                map.insert(
                    "magnitude_offset_manufacturer".into(),
                    Value::from(c.magnitude_offset_manufacturer),
                );
                map.insert(
                    "temperature_dark_calibration".into(),
                    Value::from(c.temperature_dark_calibration),
                );
            }
            Self::UnitInfo(info) => {
                map.insert("type".into(), Value::String(info.kind));
                map.insert("protocol_number".into(), Value::String(info.protocol_number));
                map.insert("model_number".into(), Value::String(info.model_number));
                map.insert("feature_number".into(), Value::String(info.feature_number));
                map.insert("serial_number".into(), Value::String(info.serial_number));
            }
        }
        map
    }
}

fn number(fields: &[&str], index: usize, name: &str) -> ReaderResult<f64> {
    fields[index].parse::<f64>().map_err(|_| {
        ReaderError::Parse(format!(
            "Field '{}' is not a number: {:?}",
            name, fields[index]
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_bytes_are_four_ascii_bytes() {
        for command in [
            SqmCommand::Read,
            SqmCommand::ReadWithSerial,
            SqmCommand::Calibration,
            SqmCommand::UnitInfo,
        ] {
            let bytes = command.bytes();
            assert!(bytes.is_ascii());
            assert!(bytes.ends_with(b"\r\n"));
            assert_eq!(&bytes[..2], command.as_str().as_bytes());
        }
    }

    #[test]
    fn test_command_from_str_is_case_sensitive() {
        assert_eq!("rx".parse::<SqmCommand>().unwrap(), SqmCommand::Read);
        assert_eq!("Rx".parse::<SqmCommand>().unwrap(), SqmCommand::ReadWithSerial);
        assert_eq!("cx".parse::<SqmCommand>().unwrap(), SqmCommand::Calibration);
        assert_eq!("ix".parse::<SqmCommand>().unwrap(), SqmCommand::UnitInfo);
        assert!("RX".parse::<SqmCommand>().is_err());
        assert!("zx".parse::<SqmCommand>().is_err());
    }

    #[test]
    fn test_parse_read_with_serial() {
        let response =
            SqmResponse::parse(SqmCommand::ReadWithSerial, "i,12.34,56.7,8,9.0,21.5,SN001\r\n")
                .unwrap();

        assert_eq!(response.serial_number(), Some("SN001"));
        assert_eq!(
            serde_json::Value::Object(response.into_fields()),
            json!({
                "type": "i",
                "magnitude": 12.34,
                "frequency": 56.7,
                "period_count": 8.0,
                "period_seconds": 9.0,
                "temperature": 21.5,
                "serial_number": "SN001"
            })
        );
    }

    #[test]
    fn test_parse_plain_read_has_no_serial() {
        let response = SqmResponse::parse(SqmCommand::Read, "r,19.8,4.2,100,0.5,12.0").unwrap();
        assert_eq!(response.serial_number(), None);
        let fields = response.into_fields();
        assert_eq!(fields.len(), 6);
        assert!(!fields.contains_key("serial_number"));
    }

    #[test]
    fn test_parse_rejects_short_response() {
        let err = SqmResponse::parse(SqmCommand::ReadWithSerial, "i,12.34,56.7,8,9.0,21.5")
            .unwrap_err();
        assert!(matches!(err, ReaderError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_long_response() {
        let err = SqmResponse::parse(SqmCommand::Read, "r,19.8,4.2,100,0.5,12.0,extra")
            .unwrap_err();
        assert!(matches!(err, ReaderError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_non_numeric_field() {
        let err = SqmResponse::parse(SqmCommand::Read, "r,bright,4.2,100,0.5,12.0").unwrap_err();
        match err {
            ReaderError::Parse(message) => assert!(message.contains("magnitude")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty_numeric_field() {
        assert!(SqmResponse::parse(SqmCommand::Read, "r,,4.2,100,0.5,12.0").is_err());
    }

    #[test]
    fn test_parse_calibration() {
        let response =
            SqmResponse::parse(SqmCommand::Calibration, "c,20.11,300.5,25.1,0.3,24.9\r\n").unwrap();
        let fields = response.into_fields();
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "type",
                "magnitude_offset_calibration",
                "dark_period",
                "temperature_light_calibration",
                "magnitude_offset_manufacturer",
                "temperature_dark_calibration",
            ]
        );
        assert_eq!(fields["dark_period"], json!(300.5));
    }

    #[test]
    fn test_parse_unit_info_keeps_text_fields() {
        let line = "i,00000004,00000003,00000012,00002345";
        let response = SqmResponse::parse(SqmCommand::UnitInfo, line).unwrap();
        assert_eq!(response.serial_number(), Some("00002345"));
        match response {
            SqmResponse::UnitInfo(info) => {
                assert_eq!(info.protocol_number, "00000004");
                assert_eq!(info.model_number, "00000003");
                assert_eq!(info.feature_number, "00000012");
            }
            other => panic!("expected unit info, got {:?}", other),
        }
    }
}
