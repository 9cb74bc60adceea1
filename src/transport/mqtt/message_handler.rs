//! Pure message routing and processing logic for MQTT events
//!
//! This module contains pure functions for classifying MQTT events and the
//! forwarder that hands inbound publishes to the bridge.

use super::connection::MqttError;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// A publish received on one of the subscribed topics
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                }),
                Packet::Disconnect(disconnect) => EventRoute::Disconnected {
                    reason: format!("{:?}", disconnect.reason_code),
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: suback
                        .return_codes
                        .iter()
                        .map(|code| format!("{code:?}"))
                        .collect(),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged - subscriptions must be (re)sent
    ConnectionAcknowledged { session_present: bool },
    /// Message received on subscribed topic
    MessageReceived(InboundMessage),
    /// Broker sent a disconnect
    Disconnected { reason: String },
    /// Subscription confirmed with reason codes
    SubscriptionConfirmed {
        packet_id: u16,
        return_codes: Vec<String>,
    },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Hands inbound publishes to whoever registered a sender
#[derive(Debug, Clone, Default)]
pub struct MessageForwarder {
    sender: Arc<RwLock<Option<mpsc::Sender<InboundMessage>>>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        let mut guard = self
            .sender
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(sender);
    }

    pub fn has_sender(&self) -> bool {
        self.sender
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Forward a message (impure I/O); dropped with a warning if nobody listens
    pub async fn forward(&self, message: InboundMessage) -> Result<(), MqttError> {
        let sender = self
            .sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        match sender {
            Some(sender) => sender
                .send(message)
                .await
                .map_err(|_| MqttError::ChannelClosed),
            None => {
                warn!(
                    topic = %message.topic,
                    "Received MQTT message but no receiver configured - message dropped"
                );
                Err(MqttError::ChannelClosed)
            }
        }
    }
}
