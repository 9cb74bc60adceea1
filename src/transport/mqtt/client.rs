//! Impure I/O operations for MQTT client
//!
//! This module handles all impure I/O operations including network communication,
//! async coordination, and integration with the rumqttc client.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig,
    REQUEST_CHANNEL_CAPACITY,
};
use super::message_handler::{EventRoute, InboundMessage, MessageForwarder, MessageHandler};
use crate::config::MqttSection;
use crate::observability::metrics::metrics;
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// MQTT client subscribing to Shelly topics
pub struct MqttClient {
    config: MqttSection,
    client: AsyncClient,
    event_loop: Option<Mutex<EventLoop>>,
    event_loop_handle: Option<JoinHandle<()>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    subscribed_topics: Arc<Mutex<Vec<String>>>, // re-sent on every ConnAck
    message_forwarder: MessageForwarder,
}

impl MqttClient {
    pub fn new(config: MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        Ok(MqttClient {
            config,
            client,
            event_loop: Some(Mutex::new(event_loop)),
            event_loop_handle: None,
            state_rx: None,
            state_tx: None,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::default(),
            subscribed_topics: Arc::new(Mutex::new(Vec::new())),
            message_forwarder: MessageForwarder::new(),
        })
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    /// Set the sender inbound publishes are forwarded to
    pub fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        self.message_forwarder.set_sender(sender);
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for the first ConnAck
    ///
    /// Connection errors in between are retried by the event loop; only the
    /// timeout ends the wait, reporting the last failure seen.
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let mut last_failure: Option<String> = None;
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match &*state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => last_failure = Some(reason.clone()),
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(match last_failure {
                Some(reason) => format!("ConnAck timeout - last error: {reason}"),
                None => "ConnAck timeout - no connection confirmation received".to_string(),
            })),
        }
    }

    /// Start the event loop and wait until the broker acknowledges the connection
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let mut event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| {
                MqttError::ConnectionFailedStr("Event loop already started".to_string())
            })?
            .into_inner();

        let ((state_tx, state_rx), (shutdown_tx, mut shutdown_rx)) =
            Self::setup_connection_channels();
        self.state_rx = Some(state_rx.clone());
        self.state_tx = Some(state_tx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let client = self.client.clone();
        let reconnect_config = self.reconnect_config.clone();
        let subscribed_topics = self.subscribed_topics.clone();
        let message_forwarder = self.message_forwarder.clone();
        let broker = format!("{}:{}", self.config.host, self.config.port);

        info!(broker = %broker, client_id = %self.config.client_id, "Connecting to MQTT broker");
        metrics().mqtt_connection_attempt();

        let handle = tokio::spawn(async move {
            let mut reconnect_attempts = 0u32;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping MQTT event loop");
                            break;
                        }
                    }

                    event_result = event_loop.poll() => {
                        match event_result {
                            Ok(event) => {
                                let route = MessageHandler::route_mqtt_event(&event);
                                Self::process_event_route(
                                    route,
                                    &state_tx,
                                    &mut reconnect_attempts,
                                    &client,
                                    &subscribed_topics,
                                    &message_forwarder,
                                )
                                .await;
                            }
                            Err(e) => {
                                reconnect_attempts += 1;
                                if !Self::handle_event_loop_error(
                                    e,
                                    &broker,
                                    &state_tx,
                                    reconnect_attempts,
                                    &reconnect_config,
                                    shutdown_rx.clone(),
                                )
                                .await
                                {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            info!(broker = %broker, "MQTT event loop stopped");
        });

        self.event_loop_handle = Some(handle);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        Self::wait_for_connection_confirmation(state_rx, timeout).await
    }

    /// Record a connection error and wait before the next poll
    /// Returns true to keep polling, false when shutdown was requested
    async fn handle_event_loop_error(
        error: rumqttc::v5::ConnectionError,
        broker: &str,
        state_tx: &watch::Sender<ConnectionState>,
        attempt: u32,
        reconnect_config: &ReconnectConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        let was_connected = state_tx.borrow().is_connected();
        let _ = state_tx.send(ConnectionState::Disconnected(error.to_string()));
        if was_connected {
            metrics().mqtt_connection_lost();
        } else {
            metrics().mqtt_connection_failed();
        }

        let delay_ms = reconnect_config.calculate_backoff_delay(attempt);
        error!(
            broker = %broker,
            error = %error,
            attempt = attempt,
            delay_ms = delay_ms,
            "MQTT connection error, retrying"
        );

        if !Self::interruptible_sleep(shutdown_rx, delay_ms).await {
            return false;
        }
        let _ = state_tx.send(ConnectionState::Reconnecting(attempt));
        metrics().mqtt_connection_attempt();
        true
    }

    /// Process routed MQTT event - extracted for testability
    async fn process_event_route(
        route: EventRoute,
        state_tx: &watch::Sender<ConnectionState>,
        reconnect_attempts: &mut u32,
        client: &AsyncClient,
        subscribed_topics: &Arc<Mutex<Vec<String>>>,
        message_forwarder: &MessageForwarder,
    ) {
        match route {
            EventRoute::ConnectionAcknowledged { session_present } => {
                info!(
                    session_present = session_present,
                    reconnect_attempts = *reconnect_attempts,
                    "MQTT connection established"
                );
                let _ = state_tx.send(ConnectionState::Connected);
                metrics().mqtt_connection_established();
                *reconnect_attempts = 0;

                let topics = subscribed_topics.lock().await.clone();
                if !topics.is_empty() {
                    // Sent from a separate task: the request channel is only
                    // drained while this loop keeps polling
                    tokio::spawn(Self::resubscribe_to_topics(client.clone(), topics));
                }
            }
            EventRoute::MessageReceived(message) => {
                debug!(target: "mqtt_transport", topic = %message.topic, retain = message.retain, "Received MQTT message");
                if let Err(e) = message_forwarder.forward(message).await {
                    warn!(error = %e, "Failed to forward MQTT message");
                }
            }
            EventRoute::Disconnected { reason } => {
                warn!(reason = %reason, "MQTT broker sent disconnect");
                let _ = state_tx.send(ConnectionState::Disconnected(reason));
                metrics().mqtt_connection_lost();
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                return_codes,
            } => {
                debug!(target: "mqtt_transport", packet_id = packet_id, "Subscription confirmed: {:?}", return_codes);
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
            }
            EventRoute::OutgoingEvent => {}
        }
    }

    /// Perform interruptible sleep with shutdown monitoring
    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                true
            }
        }
    }

    /// Re-send all subscriptions after a ConnAck
    async fn resubscribe_to_topics(client: AsyncClient, topics: Vec<String>) {
        for topic in &topics {
            if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                error!(topic = %topic, error = %e, "Failed to re-subscribe");
            } else {
                debug!(target: "mqtt_transport", "Re-subscribed to: {}", topic);
            }
        }
    }

    /// Subscribe to topics at QoS 1 and remember them for later reconnects
    pub async fn subscribe(&mut self, topics: &[String]) -> Result<(), MqttError> {
        if let Some(state_rx) = &self.state_rx {
            let current_state = state_rx.borrow().clone();
            if !current_state.is_connected() {
                return Err(MqttError::NotConnected {
                    state: current_state,
                });
            }
        }

        let mut subscribed = self.subscribed_topics.lock().await;
        for topic in topics {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| {
                    MqttError::SubscriptionFailed(
                        format!("Failed to subscribe to {topic}: {e}").into(),
                    )
                })?;
            if !subscribed.contains(topic) {
                subscribed.push(topic.clone());
            }
            info!(topic = %topic, "Subscribed");
        }
        Ok(())
    }

    /// Disconnect from the broker and stop the event loop
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let connected = self
            .connection_state()
            .map(|state| state.is_connected())
            .unwrap_or(false);
        if connected {
            if let Err(e) = self.client.disconnect().await {
                warn!(error = %e, "Failed to send MQTT disconnect");
            }
        }

        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        if let Some(state_tx) = &self.state_tx {
            let _ = state_tx.send(ConnectionState::Disconnected(
                "Client disconnected".to_string(),
            ));
        }
        metrics().mqtt_connection_lost();

        if let Some(mut handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), &mut handle).await {
                Ok(Ok(())) => {
                    info!("Event loop task shut down gracefully");
                }
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing abort");
                    handle.abort();
                }
                _ => {}
            }
        }

        info!("MQTT client disconnected");
        Ok(())
    }

    /// Get current connection state
    /// Returns None if connection hasn't been started yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Receiver following every connection state change
    pub fn state_receiver(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.state_rx.clone()
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed_topics.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn subscribe(&mut self, topics: &[String]) -> Result<(), Self::Error> {
        MqttClient::subscribe(self, topics).await
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        MqttClient::set_message_sender(self, sender)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        // disconnect() is the graceful path; this only stops the background task
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn config() -> MqttSection {
        MqttSection {
            host: "localhost".to_string(),
            port: 1883,
            ..MqttSection::default()
        }
    }

    #[test]
    fn test_setup_connection_channels() {
        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) =
            MqttClient::setup_connection_channels();

        assert_eq!(*state_rx.borrow(), ConnectionState::Connecting);
        assert!(!(*shutdown_rx.borrow()));

        state_tx.send(ConnectionState::Connected).unwrap();
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);

        shutdown_tx.send(true).unwrap();
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_success() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
            // keep the sender alive until the waiter has seen the value
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(100))
                .await;
        assert!(result.is_ok(), "Should successfully wait for connection");
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_already_connected() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();
        state_tx.send(ConnectionState::Connected).unwrap();

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(10))
                .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_confirmation_timeout() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(10)).await;
        drop(state_tx);

        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("ConnAck timeout"),
            "Error should mention ConnAck timeout, got: {err_msg}"
        );
    }

    #[tokio::test]
    async fn test_wait_for_connection_survives_transient_failure() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            let _ = state_tx.send(ConnectionState::Disconnected("connection refused".to_string()));
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Reconnecting(1));
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = state_tx.send(ConnectionState::Connected);
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(150))
                .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_reports_last_failure() {
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();
        state_tx
            .send(ConnectionState::Disconnected("connection refused".to_string()))
            .unwrap();

        let result =
            MqttClient::wait_for_connection_confirmation(state_rx, Duration::from_millis(20))
                .await;
        drop(state_tx);

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("connection refused"), "got: {err_msg}");
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let ((_, _), (_shutdown_tx, shutdown_rx)) = MqttClient::setup_connection_channels();
        let result = MqttClient::interruptible_sleep(shutdown_rx, 10).await;
        assert!(result, "Sleep should complete without interruption");
    }

    #[tokio::test]
    async fn test_interruptible_sleep_interrupted() {
        let ((_, _), (shutdown_tx, shutdown_rx)) = MqttClient::setup_connection_channels();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = shutdown_tx.send(true);
        });

        let result = MqttClient::interruptible_sleep(shutdown_rx, 1000).await;
        assert!(!result, "Sleep should be interrupted by shutdown signal");
    }

    #[tokio::test]
    async fn test_forwarded_message_reaches_sender() {
        let client = MqttClient::new(config()).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        client.set_message_sender(tx);

        let ((state_tx, _), (_, _)) = MqttClient::setup_connection_channels();
        let message = InboundMessage {
            topic: "shellyplusht-abc/events/rpc".to_string(),
            payload: bytes::Bytes::from_static(b"{}"),
            retain: false,
        };
        let mut attempts = 0;
        MqttClient::process_event_route(
            EventRoute::MessageReceived(message.clone()),
            &state_tx,
            &mut attempts,
            &client.client,
            &client.subscribed_topics,
            &client.message_forwarder,
        )
        .await;

        assert_eq!(rx.recv().await, Some(message));
    }

    #[tokio::test]
    async fn test_connack_resets_attempts_and_marks_connected() {
        let client = MqttClient::new(config()).unwrap();
        let ((state_tx, state_rx), (_, _)) = MqttClient::setup_connection_channels();
        let mut attempts = 3;

        MqttClient::process_event_route(
            EventRoute::ConnectionAcknowledged {
                session_present: false,
            },
            &state_tx,
            &mut attempts,
            &client.client,
            &client.subscribed_topics,
            &client.message_forwarder,
        )
        .await;

        assert_eq!(attempts, 0);
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connection_state_before_connect() {
        let client = MqttClient::new(config()).unwrap();
        assert!(client.connection_state().is_none());
        assert!(client.state_receiver().is_none());
        assert!(!Transport::is_connected(&client));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let mut client = MqttClient::new(config()).unwrap();
        assert!(client.disconnect().await.is_ok());
    }
}
