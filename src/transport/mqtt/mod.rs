//! MQTT client subscribing to Shelly sensor topics
//!
//! The client separates pure functions from I/O operations:
//!
//! - [`connection`] - Pure connection state management and broker options
//! - [`message_handler`] - Pure event routing and the inbound forwarder
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use shelly_homekit_bridge::config::MqttSection;
//! use shelly_homekit_bridge::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let mut client = MqttClient::new(MqttSection::default())?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! client.set_message_sender(tx);
//! client.connect().await?;
//! client
//!     .subscribe(&["shellies/shellyflood-244CAB42D00A/info".to_string()])
//!     .await?;
//! while let Some(message) = rx.recv().await {
//!     println!("{} {} bytes", message.topic, message.payload.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
pub use message_handler::{EventRoute, InboundMessage, MessageForwarder, MessageHandler};
