//! Mock implementations for testing
//!
//! Provides a mock Transport that records subscriptions and lets tests inject
//! publishes, and a Store whose every operation fails.

use crate::store::{Store, StoreError};
use crate::transport::mqtt::{ConnectionState, MqttError};
use crate::transport::{InboundMessage, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockTransport {
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub should_fail: bool,
    connected: AtomicBool,
    sender: Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|topics| topics.clone())
            .unwrap_or_default()
    }

    pub fn has_sender(&self) -> bool {
        self.sender
            .lock()
            .map(|sender| sender.is_some())
            .unwrap_or(false)
    }

    /// Deliver a publish as if it came from the broker
    pub async fn inject(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| MqttError::ChannelClosed)?
            .clone()
            .ok_or(MqttError::ChannelClosed)?;
        sender
            .send(InboundMessage {
                topic: topic.to_string(),
                payload: Bytes::copy_from_slice(payload),
                retain: false,
            })
            .await
            .map_err(|_| MqttError::ChannelClosed)
    }

    /// Drop the registered sender so the dispatcher drains and stops
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            Err(MqttError::ConnectionFailedStr(
                "Mock connection failure".to_string(),
            ))
        } else {
            self.connected.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(&mut self, topics: &[String]) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected {
                state: self
                    .connection_state()
                    .unwrap_or(ConnectionState::Connecting),
            });
        }
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.extend(topics.iter().cloned());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        if self.should_fail {
            Some(ConnectionState::Disconnected(
                "Mock disconnection".to_string(),
            ))
        } else if self.is_connected() {
            Some(ConnectionState::Connected)
        } else {
            None
        }
    }

    fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        if let Ok(mut slot) = self.sender.lock() {
            *slot = Some(sender);
        }
    }
}

/// Store failing every read and write
#[derive(Debug, Default)]
pub struct FailingStore;

impl FailingStore {
    fn error(key: &str) -> StoreError {
        StoreError::Io {
            path: PathBuf::from(key),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock failure"),
        }
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(Self::error(key))
    }

    async fn set(&self, key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(Self::error(key))
    }
}
