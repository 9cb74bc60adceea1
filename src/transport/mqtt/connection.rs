//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management and
//! broker option handling.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - attempting to connect
    Connecting,
    /// Broker acknowledged the connection
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting to poll the event loop again (attempt count)
    Reconnecting(u32),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected(reason) => write!(f, "disconnected: {reason}"),
            ConnectionState::Reconnecting(attempt) => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// Delay between event loop polls after a connection error
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds, indexed by attempt
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![500, 1000, 2000, 5000],
            sustained_delay: 10_000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker address: {0}")]
    InvalidBroker(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
    #[error("Inbound message channel closed")]
    ChannelClosed,
}

/// Keep alive sent to the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Largest packet accepted from the broker
pub const MAX_PACKET_SIZE: u32 = 64 * 1024;

/// Capacity of the request channel between client handle and event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Pure function to build broker options from config
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, MqttError> {
    let host = config.host.trim();
    if host.is_empty() || host.contains("://") {
        return Err(MqttError::InvalidBroker(config.host.clone()));
    }
    if config.port == 0 {
        return Err(MqttError::InvalidBroker(format!("{host}:{}", config.port)));
    }

    let mut mqtt_options = MqttOptions::new(config.client_id.clone(), host, config.port);

    // Credentials are read from the environment variables named in the config
    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(username, password);
        }
    }

    mqtt_options.set_keep_alive(KEEP_ALIVE);
    mqtt_options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(host: &str, port: u16) -> MqttSection {
        MqttSection {
            host: host.to_string(),
            port,
            ..MqttSection::default()
        }
    }

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.backoff_pattern, vec![500, 1000, 2000, 5000]);
        assert_eq!(config.sustained_delay, 10_000);
    }

    #[test]
    fn test_backoff_sequence() {
        let config = ReconnectConfig::default();
        assert_eq!(config.calculate_backoff_delay(1), 500);
        assert_eq!(config.calculate_backoff_delay(4), 5000);
        assert_eq!(config.calculate_backoff_delay(5), 10_000);
        assert_eq!(config.calculate_backoff_delay(100), 10_000);
        // attempt 0 is treated as the first attempt
        assert_eq!(config.calculate_backoff_delay(0), 500);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            backoff_pattern: vec![],
            sustained_delay: 42,
        };
        assert_eq!(config.calculate_backoff_delay(1), 42);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&section("broker.local", 1884)).unwrap();
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(options.client_id(), "homekit_shelly");
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
    }

    #[test]
    fn test_configure_rejects_bad_broker() {
        assert!(matches!(
            configure_mqtt_options(&section("", 1883)),
            Err(MqttError::InvalidBroker(_))
        ));
        assert!(matches!(
            configure_mqtt_options(&section("mqtt://broker", 1883)),
            Err(MqttError::InvalidBroker(_))
        ));
        assert!(configure_mqtt_options(&section("broker", 0)).is_err());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionState::Disconnected("refused".to_string()).to_string(),
            "disconnected: refused"
        );
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting(1).is_connected());
    }
}
