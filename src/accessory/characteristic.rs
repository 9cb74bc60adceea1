//! Typed characteristics with bounds checking and change notification

use serde::Serialize;
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

use super::notify::{ChangeNotifier, CharacteristicEvent};

/// Characteristic value as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Wire format of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bool,
    Uint8,
    Float,
    String,
}

/// Access permissions advertised to controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Permission {
    #[serde(rename = "pr")]
    Read,
    #[serde(rename = "pw")]
    Write,
    #[serde(rename = "ev")]
    Events,
}

const READ_NOTIFY: &[Permission] = &[Permission::Read, Permission::Events];
const READ_ONLY: &[Permission] = &[Permission::Read];
const WRITE_ONLY: &[Permission] = &[Permission::Write];

/// Characteristic types used by the sensor accessories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicType {
    Identify,
    Manufacturer,
    Model,
    Name,
    SerialNumber,
    FirmwareRevision,
    BatteryLevel,
    ChargingState,
    StatusLowBattery,
    CurrentTemperature,
    CurrentRelativeHumidity,
    LeakDetected,
    SmokeDetected,
}

impl CharacteristicType {
    /// Short form of the HAP type UUID
    pub fn type_id(&self) -> &'static str {
        match self {
            CharacteristicType::Identify => "14",
            CharacteristicType::Manufacturer => "20",
            CharacteristicType::Model => "21",
            CharacteristicType::Name => "23",
            CharacteristicType::SerialNumber => "30",
            CharacteristicType::FirmwareRevision => "52",
            CharacteristicType::BatteryLevel => "68",
            CharacteristicType::ChargingState => "8F",
            CharacteristicType::StatusLowBattery => "79",
            CharacteristicType::CurrentTemperature => "11",
            CharacteristicType::CurrentRelativeHumidity => "10",
            CharacteristicType::LeakDetected => "70",
            CharacteristicType::SmokeDetected => "76",
        }
    }

    /// Human readable label used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            CharacteristicType::Identify => "identify",
            CharacteristicType::Manufacturer => "manufacturer",
            CharacteristicType::Model => "model",
            CharacteristicType::Name => "name",
            CharacteristicType::SerialNumber => "serial number",
            CharacteristicType::FirmwareRevision => "firmware revision",
            CharacteristicType::BatteryLevel => "battery level",
            CharacteristicType::ChargingState => "charging state",
            CharacteristicType::StatusLowBattery => "low battery status",
            CharacteristicType::CurrentTemperature => "temperature",
            CharacteristicType::CurrentRelativeHumidity => "humidity",
            CharacteristicType::LeakDetected => "leak status",
            CharacteristicType::SmokeDetected => "smoke status",
        }
    }

    pub fn format(&self) -> Format {
        match self {
            CharacteristicType::Identify => Format::Bool,
            CharacteristicType::Manufacturer
            | CharacteristicType::Model
            | CharacteristicType::Name
            | CharacteristicType::SerialNumber
            | CharacteristicType::FirmwareRevision => Format::String,
            CharacteristicType::CurrentTemperature
            | CharacteristicType::CurrentRelativeHumidity => Format::Float,
            _ => Format::Uint8,
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self.format() {
            Format::String => READ_ONLY,
            Format::Bool => WRITE_ONLY,
            _ => READ_NOTIFY,
        }
    }

    /// Inclusive (min, max, step) for numeric types
    pub fn bounds(&self) -> Option<(f64, f64, f64)> {
        match self {
            CharacteristicType::BatteryLevel => Some((0.0, 100.0, 1.0)),
            CharacteristicType::ChargingState => Some((0.0, 2.0, 1.0)),
            CharacteristicType::StatusLowBattery
            | CharacteristicType::LeakDetected
            | CharacteristicType::SmokeDetected => Some((0.0, 1.0, 1.0)),
            CharacteristicType::CurrentTemperature => Some((-270.0, 100.0, 0.1)),
            CharacteristicType::CurrentRelativeHumidity => Some((0.0, 100.0, 1.0)),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            CharacteristicType::BatteryLevel | CharacteristicType::CurrentRelativeHumidity => {
                Some("percentage")
            }
            CharacteristicType::CurrentTemperature => Some("celsius"),
            _ => None,
        }
    }

    /// Value a freshly created characteristic holds
    pub fn initial_value(&self) -> Value {
        if *self == CharacteristicType::ChargingState {
            return Value::Int(CHARGING_STATE_NOT_CHARGEABLE);
        }
        match self.format() {
            Format::Bool => Value::Bool(false),
            Format::Uint8 => Value::Int(0),
            Format::Float => Value::Float(0.0),
            Format::String => Value::String(String::new()),
        }
    }
}

/// Rejections raised by [`Characteristic::set_value`]
#[derive(Debug, Error, PartialEq)]
pub enum CharacteristicError {
    #[error("value {value} outside of [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("expected {expected:?} value, got {got}")]
    InvalidFormat { expected: Format, got: Value },
    #[error("characteristic is not writable")]
    ReadOnly,
}

// Values whose `LeakDetected`/`SmokeDetected`/`StatusLowBattery` encoding is 0/1
pub const DETECTED: i64 = 1;
pub const NOT_DETECTED: i64 = 0;
pub const CHARGING_STATE_NOT_CHARGEABLE: i64 = 2;

/// Convert a boolean to the 0/1 encoding used by uint8 flags
pub fn flag(value: bool) -> i64 {
    if value {
        DETECTED
    } else {
        NOT_DETECTED
    }
}

/// A single observable value inside a service
pub struct Characteristic {
    aid: u64,
    iid: u64,
    kind: CharacteristicType,
    value: RwLock<Value>,
    notifier: ChangeNotifier,
}

impl Characteristic {
    pub(crate) fn new(aid: u64, iid: u64, kind: CharacteristicType, notifier: ChangeNotifier) -> Self {
        Self {
            aid,
            iid,
            kind,
            value: RwLock::new(kind.initial_value()),
            notifier,
        }
    }

    pub(crate) fn with_value(mut self, value: Value) -> Self {
        self.value = RwLock::new(value);
        self
    }

    pub fn aid(&self) -> u64 {
        self.aid
    }

    pub fn iid(&self) -> u64 {
        self.iid
    }

    pub fn kind(&self) -> CharacteristicType {
        self.kind
    }

    /// Currently held value
    pub fn value(&self) -> Value {
        self.value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Validate and store a value, then notify subscribers
    ///
    /// The value is stored and broadcast even when it equals the held one;
    /// callers that want change suppression compare first.
    pub fn set_value(&self, value: Value) -> Result<(), CharacteristicError> {
        let value = self.normalize(value)?;
        {
            let mut guard = self
                .value
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = value.clone();
        }
        self.notifier.notify(CharacteristicEvent {
            aid: self.aid,
            iid: self.iid,
            characteristic: self.kind.label(),
            value,
        });
        Ok(())
    }

    /// Check format and bounds; integers written to float characteristics widen
    fn normalize(&self, value: Value) -> Result<Value, CharacteristicError> {
        let (numeric, value) = match (self.kind.format(), value) {
            (Format::Uint8, Value::Int(v)) => (v as f64, Value::Int(v)),
            (Format::Float, Value::Float(v)) => (v, Value::Float(v)),
            (Format::Float, Value::Int(v)) => (v as f64, Value::Float(v as f64)),
            (Format::String, Value::String(_)) => return Err(CharacteristicError::ReadOnly),
            (Format::Bool, value @ Value::Bool(_)) => return Ok(value),
            (expected, got) => return Err(CharacteristicError::InvalidFormat { expected, got }),
        };

        if let Some((min, max, _)) = self.kind.bounds() {
            if !numeric.is_finite() || numeric < min || numeric > max {
                return Err(CharacteristicError::OutOfRange {
                    value: numeric,
                    min,
                    max,
                });
            }
        }
        Ok(value)
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("aid", &self.aid)
            .field("iid", &self.iid)
            .field("kind", &self.kind)
            .field("value", &self.value())
            .finish()
    }
}
