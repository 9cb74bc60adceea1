//! Transport layer for sensor traffic
//!
//! This module provides the transport abstraction the bridge subscribes
//! through and its MQTT implementation.

pub mod mqtt;

pub use mqtt::{ConnectionState, InboundMessage};

/// Transport trait for receiving sensor publishes
///
/// This trait provides an abstraction over the broker connection so the
/// bridge can be driven by a mock in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker and wait for the acknowledgement
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Subscribe to topics; subscriptions are restored after reconnects
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> Option<ConnectionState>;

    /// Set the sender inbound publishes are forwarded to
    fn set_message_sender(&self, sender: tokio::sync::mpsc::Sender<InboundMessage>);
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
