//! Fan-out of characteristic changes to connected controllers

use serde::Serialize;
use tokio::sync::broadcast;

use super::characteristic::Value;

const CHANNEL_CAPACITY: usize = 256;

/// One accepted characteristic change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicEvent {
    pub aid: u64,
    pub iid: u64,
    pub characteristic: &'static str,
    pub value: Value,
}

/// Cloneable handle onto the change broadcast channel
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<CharacteristicEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast a change; having no subscriber is not an error
    pub fn notify(&self, event: CharacteristicEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CharacteristicEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
