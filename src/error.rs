//! Error types for the Shelly bridge
//!
//! Each layer owns a focused `thiserror` enum; [`BridgeError`] aggregates them
//! for callers that cross layers (startup in `main`, the dispatcher loop).

use crate::accessory::CharacteristicError;
use crate::shelly::DecodeError;
use crate::store::StoreError;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::mqtt::MqttError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("No device handles topic {0}")]
    UnknownTopic(String),

    #[error("Discovery error: {message}")]
    Discovery { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Failure while turning a payload into characteristic updates for one device
#[derive(Debug, Error)]
pub enum SensorError {
    /// Payload could not be decoded; nothing was applied
    #[error("could not parse payload for {serial}: {source}")]
    Decode {
        serial: String,
        #[source]
        source: DecodeError,
    },

    /// A setter rejected the value; updates after it were not applied
    #[error("set {characteristic} for {serial}: {source}")]
    Characteristic {
        serial: String,
        characteristic: &'static str,
        #[source]
        source: CharacteristicError,
    },

    /// Topic is not one of the device's subscriptions
    #[error("topic {topic} is not handled by {serial}")]
    UnknownTopic { serial: String, topic: String },
}

impl SensorError {
    /// Whether this error came from decoding rather than applying
    pub fn is_decode(&self) -> bool {
        matches!(self, SensorError::Decode { .. })
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
