//! Decoders for Shelly MQTT payloads
//!
//! Each device family publishes its own JSON shape, and the shape changes
//! between firmware generations. The decoders here turn every variant into a
//! [`SensorReading`] in which each field is optional, so a partial payload only
//! carries what the device actually reported.

pub mod flood;
pub mod ht;
pub mod rpc;
pub mod smoke;
pub mod topics;

use thiserror::Error;

pub use flood::FloodField;
pub use rpc::NOTIFY_FULL_STATUS;
pub use topics::{cache_key, TopicBuilder};

/// Canonical state extracted from one payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReading {
    /// Battery charge in percent
    pub battery: Option<i64>,
    /// Temperature in °C
    pub temperature: Option<f64>,
    /// Relative humidity in percent
    pub humidity: Option<f64>,
    pub leak: Option<bool>,
    pub smoke: Option<bool>,
    pub smoke_muted: Option<bool>,
    /// Device-side sensor error code; `"0"` means healthy
    pub device_error: Option<String>,
    /// Why a battery powered device woke up
    pub act_reasons: Option<Vec<String>>,
}

impl SensorReading {
    pub fn is_empty(&self) -> bool {
        *self == SensorReading::default()
    }

    /// Reported device error, if it is anything other than the healthy code
    pub fn device_fault(&self) -> Option<&str> {
        self.device_error
            .as_deref()
            .filter(|code| !code.is_empty() && *code != "0")
    }
}

/// Outcome of decoding a payload
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Reading(SensorReading),
    /// Well-formed message whose method carries no state we apply
    Ignored { method: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
}

/// Payload bytes as trimmed text, for the per-field topics
pub(crate) fn payload_text(payload: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(payload)?.trim())
}
