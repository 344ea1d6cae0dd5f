use crate::errors::Result;
use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Milliseconds since the Unix epoch, the timestamp unit of every frame.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementContext {
    pub unit: String,
    pub status: MeasurementStatus,
}

/// One sensor reading as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: Option<f64>,
    pub context: MeasurementContext,
}

impl Measurement {
    pub fn ok(value: f64, unit: &str) -> Self {
        Self {
            value: Some(value),
            context: MeasurementContext {
                unit: unit.to_string(),
                status: MeasurementStatus::Ok,
            },
        }
    }

    /// Placeholder for a reading that could not be taken.
    pub fn degraded() -> Self {
        Self {
            value: None,
            context: MeasurementContext {
                unit: String::new(),
                status: MeasurementStatus::Error,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.context.status == MeasurementStatus::Ok
    }
}

/// Readings of every subscribed sensor kind, in the device's order.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub readings: Vec<(String, Measurement)>,
    pub timestamp: i64,
}

impl Serialize for TelemetryFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.readings.len() + 1))?;
        for (kind, measurement) in &self.readings {
            map.serialize_entry(kind, measurement)?;
        }
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoFrame {
    pub location: Location,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub batt: f64,
    pub relay_1: RelayState,
    pub relay_2: RelayState,
    pub timestamp: i64,
}

const SIMULATED_BATTERY_VOLTS: f64 = 3.7;

impl StatusFrame {
    /// Static device status; no live battery or relay state is modelled.
    pub fn simulated(timestamp: i64) -> Self {
        Self {
            batt: SIMULATED_BATTERY_VOLTS,
            relay_1: RelayState::On,
            relay_2: RelayState::Off,
            timestamp,
        }
    }
}

/// The three periodic streams every device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Measurements,
    Info,
    Status,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Measurements => "measurements",
            FrameKind::Info => "info",
            FrameKind::Status => "status",
        }
    }

    pub fn all() -> &'static [FrameKind] {
        &[FrameKind::Measurements, FrameKind::Info, FrameKind::Status]
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Telemetry(TelemetryFrame),
    Info(InfoFrame),
    Status(StatusFrame),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Telemetry(_) => FrameKind::Measurements,
            Frame::Info(_) => FrameKind::Info,
            Frame::Status(_) => FrameKind::Status,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Frame::Telemetry(frame) => serde_json::to_vec(frame)?,
            Frame::Info(frame) => serde_json::to_vec(frame)?,
            Frame::Status(frame) => serde_json::to_vec(frame)?,
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_telemetry_payload_shape() {
        let frame = Frame::Telemetry(TelemetryFrame {
            readings: vec![
                ("ch4".to_string(), Measurement::ok(512.3, "ppb")),
                ("temperature".to_string(), Measurement::ok(21.5, "C")),
            ],
            timestamp: 1_700_000_000_000,
        });

        let value: Value = serde_json::from_slice(&frame.to_payload().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "ch4": { "value": 512.3, "context": { "unit": "ppb", "status": "ok" } },
                "temperature": { "value": 21.5, "context": { "unit": "C", "status": "ok" } },
                "timestamp": 1_700_000_000_000_i64
            })
        );
    }

    #[test]
    fn test_telemetry_keeps_device_order() {
        let frame = TelemetryFrame {
            readings: vec![
                ("temperature".to_string(), Measurement::ok(21.5, "C")),
                ("ch4".to_string(), Measurement::ok(512.3, "ppb")),
            ],
            timestamp: 1,
        };

        let text = serde_json::to_string(&frame).unwrap();
        let temperature = text.find("temperature").unwrap();
        let ch4 = text.find("ch4").unwrap();
        let timestamp = text.find("timestamp").unwrap();
        assert!(temperature < ch4 && ch4 < timestamp);
    }

    #[test]
    fn test_degraded_measurement() {
        let value = serde_json::to_value(Measurement::degraded()).unwrap();
        assert_eq!(
            value,
            json!({ "value": null, "context": { "unit": "", "status": "error" } })
        );
    }

    #[test]
    fn test_info_payload_shape() {
        let frame = Frame::Info(InfoFrame {
            location: Location {
                lat: 40.416775,
                lng: -3.70379,
            },
            timestamp: 42,
        });

        let value: Value = serde_json::from_slice(&frame.to_payload().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "location": { "lat": 40.416775, "lng": -3.70379 }, "timestamp": 42 })
        );
    }

    #[test]
    fn test_status_payload_shape() {
        let frame = Frame::Status(StatusFrame::simulated(7));
        assert_eq!(frame.kind(), FrameKind::Status);

        let value: Value = serde_json::from_slice(&frame.to_payload().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "batt": 3.7, "relay_1": "on", "relay_2": "off", "timestamp": 7 })
        );
    }
}
