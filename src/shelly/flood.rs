//! Shelly Flood (first generation)
//!
//! The device publishes a full `info` document and, on older firmware, one
//! topic per field under `sensor/`.

use serde::Deserialize;

use super::{payload_text, DecodeError, SensorReading};

#[derive(Debug, Deserialize)]
struct FloodInfo {
    #[serde(default)]
    flood: Option<bool>,
    #[serde(default)]
    tmp: Option<Measurement<f64>>,
    #[serde(default)]
    bat: Option<Measurement<i64>>,
    #[serde(default)]
    sensor_error: Option<serde_json::Value>,
    #[serde(default)]
    act_reasons: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Measurement<T> {
    #[serde(default = "Option::default")]
    value: Option<T>,
    #[serde(default)]
    is_valid: Option<bool>,
}

impl<T> Measurement<T> {
    fn into_valid(self) -> Option<T> {
        match self.is_valid {
            Some(false) => None,
            _ => self.value,
        }
    }
}

/// Decode the `shellies/shellyflood-<SERIAL>/info` document
pub fn decode_info(payload: &[u8]) -> Result<SensorReading, DecodeError> {
    let info: FloodInfo = serde_json::from_slice(payload)?;

    let device_error = info.sensor_error.and_then(|code| match code {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text),
        other => Some(other.to_string()),
    });

    Ok(SensorReading {
        battery: info.bat.and_then(Measurement::into_valid),
        temperature: info.tmp.and_then(Measurement::into_valid),
        leak: info.flood,
        device_error,
        act_reasons: info.act_reasons,
        ..Default::default()
    })
}

/// Per-field topics published by older flood firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloodField {
    Battery,
    Flood,
    Temperature,
    Error,
    ActReasons,
}

impl FloodField {
    pub const ALL: [FloodField; 5] = [
        FloodField::Battery,
        FloodField::Flood,
        FloodField::Temperature,
        FloodField::Error,
        FloodField::ActReasons,
    ];

    /// Last topic segment below `sensor/`
    pub fn suffix(&self) -> &'static str {
        match self {
            FloodField::Battery => "battery",
            FloodField::Flood => "flood",
            FloodField::Temperature => "temperature",
            FloodField::Error => "error",
            FloodField::ActReasons => "act_reasons",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.suffix() == suffix)
    }

    /// Decode the payload of this field's topic
    pub fn decode(&self, payload: &[u8]) -> Result<SensorReading, DecodeError> {
        let mut reading = SensorReading::default();
        match self {
            FloodField::Battery => {
                let text = payload_text(payload)?;
                let value = text
                    .parse::<i64>()
                    .map_err(|_| DecodeError::InvalidNumber(text.to_string()))?;
                reading.battery = Some(value);
            }
            FloodField::Flood => {
                reading.leak = Some(payload_text(payload)? == "true");
            }
            FloodField::Temperature => {
                let text = payload_text(payload)?;
                let value = text
                    .parse::<f64>()
                    .map_err(|_| DecodeError::InvalidNumber(text.to_string()))?;
                reading.temperature = Some(value);
            }
            FloodField::Error => {
                reading.device_error = Some(payload_text(payload)?.to_string());
            }
            FloodField::ActReasons => {
                reading.act_reasons = Some(serde_json::from_slice(payload)?);
            }
        }
        Ok(reading)
    }
}
