//! The bridge: configured sensors, topic routing and cache replay
//!
//! Every inbound publish is written to the cache store, routed to the sensor
//! owning its topic and reconciled onto that sensor's accessory. Failures are
//! logged and counted; none of them stop the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

use crate::accessory::{Accessory, AccessoryInfo, Category, ChangeNotifier, Characteristic};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, SensorError};
use crate::observability::metrics::metrics;
use crate::sensors::{FloodSensor, FloodTopics, HtSensor, Outcome, Sensor, SmokeSensor};
use crate::store::{cache_key, Store};
use crate::transport::{InboundMessage, Transport};

/// Accessory id of the bridge itself
pub const BRIDGE_AID: u64 = 1;

/// Result of replaying the cache at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Topics whose cached payload went through the handler
    pub replayed: usize,
    /// Topics without a cached payload
    pub missed: usize,
    /// Topics whose cached payload could not be read or applied
    pub failed: usize,
}

pub struct Bridge {
    accessory: Accessory,
    floods: Vec<Arc<FloodSensor>>,
    smokes: Vec<Arc<SmokeSensor>>,
    hts: Vec<Arc<HtSensor>>,
    routes: HashMap<String, Arc<dyn Sensor>>,
    store: Arc<dyn Store>,
    notifier: ChangeNotifier,
}

impl Bridge {
    /// Build accessories for every configured serial
    ///
    /// Accessory ids follow the configured order (floods, legacy floods,
    /// smokes, H&Ts) starting after the bridge. Flood numbering continues
    /// from the info-topic floods into the legacy ones.
    pub fn from_config(
        config: &BridgeConfig,
        store: Arc<dyn Store>,
        notifier: ChangeNotifier,
    ) -> Self {
        let accessory = Accessory::new(
            BRIDGE_AID,
            Category::Bridge,
            AccessoryInfo::new(
                config.server.bridge_name.clone(),
                env!("CARGO_PKG_NAME"),
                config.mqtt.client_id.clone(),
            ),
            notifier.clone(),
        );

        let devices = &config.devices;
        let mut next_aid = BRIDGE_AID + 1;
        let mut allocate = || {
            let aid = next_aid;
            next_aid += 1;
            aid
        };

        let floods: Vec<Arc<FloodSensor>> = devices
            .floods
            .iter()
            .map(|serial| (serial, FloodTopics::Info))
            .chain(
                devices
                    .legacy_floods
                    .iter()
                    .map(|serial| (serial, FloodTopics::Legacy)),
            )
            .enumerate()
            .map(|(i, (serial, layout))| {
                Arc::new(FloodSensor::new(
                    allocate(),
                    i + 1,
                    serial,
                    layout,
                    notifier.clone(),
                ))
            })
            .collect();

        let smokes: Vec<Arc<SmokeSensor>> = devices
            .smokes
            .iter()
            .enumerate()
            .map(|(i, serial)| {
                Arc::new(SmokeSensor::new(allocate(), i + 1, serial, notifier.clone()))
            })
            .collect();

        let hts: Vec<Arc<HtSensor>> = devices
            .hts
            .iter()
            .enumerate()
            .map(|(i, serial)| Arc::new(HtSensor::new(allocate(), i + 1, serial, notifier.clone())))
            .collect();

        let mut bridge = Self {
            accessory,
            floods,
            smokes,
            hts,
            routes: HashMap::new(),
            store,
            notifier,
        };
        bridge.build_routes();
        bridge
    }

    fn build_routes(&mut self) {
        let sensors: Vec<Arc<dyn Sensor>> = self
            .floods
            .iter()
            .map(|s| s.clone() as Arc<dyn Sensor>)
            .chain(self.smokes.iter().map(|s| s.clone() as Arc<dyn Sensor>))
            .chain(self.hts.iter().map(|s| s.clone() as Arc<dyn Sensor>))
            .collect();

        for sensor in sensors {
            for topic in sensor.topics() {
                if let Some(existing) = self.routes.get(&topic) {
                    warn!(
                        topic = %topic,
                        shelly = %sensor.serial(),
                        owner = %existing.serial(),
                        "topic already handled by another device, ignoring duplicate"
                    );
                    continue;
                }
                self.routes.insert(topic, sensor.clone());
            }
        }

        info!(
            floods = self.floods.len(),
            smokes = self.smokes.len(),
            hts = self.hts.len(),
            topics = self.routes.len(),
            "bridge accessories created"
        );
    }

    /// Every topic the bridge needs to subscribe to, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Handle one live publish: cache it, then decode and reconcile
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> Result<Outcome, BridgeError> {
        if payload.is_empty() {
            debug!(topic = %topic, "ignoring empty payload");
            metrics().empty_payload();
            return Ok(Outcome::Empty);
        }

        let Some(sensor) = self.routes.get(topic) else {
            warn!(topic = %topic, "message on a topic no device handles");
            metrics().message_ignored();
            return Err(BridgeError::UnknownTopic(topic.to_string()));
        };

        let key = cache_key(topic);
        match self.store.set(&key, payload).await {
            Ok(()) => metrics().cache_written(),
            Err(e) => {
                warn!(topic = %topic, error = %e, "failed to cache payload");
                metrics().cache_write_failed();
            }
        }

        metrics().message_received(sensor.serial());
        let started = Instant::now();
        let result = Self::apply(sensor.as_ref(), topic, payload);
        metrics().record_handling_time(started.elapsed());
        result.map_err(BridgeError::from)
    }

    /// Feed the cached payload of every topic through the handler
    ///
    /// Runs before the broker connection so accessories start with their last
    /// known state. Nothing is written back to the store.
    pub async fn replay_cache(&self) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        for topic in self.topics() {
            let Some(sensor) = self.routes.get(&topic) else {
                continue;
            };
            let key = cache_key(&topic);
            match self.store.get(&key).await {
                Ok(Some(payload)) if !payload.is_empty() => {
                    metrics().cache_replayed();
                    match Self::apply(sensor.as_ref(), &topic, &payload) {
                        Ok(_) => summary.replayed += 1,
                        Err(_) => summary.failed += 1,
                    }
                }
                Ok(_) => {
                    debug!(topic = %topic, "no cached payload");
                    metrics().cache_missed();
                    summary.missed += 1;
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "failed to read cached payload");
                    summary.failed += 1;
                }
            }
        }

        info!(
            replayed = summary.replayed,
            missed = summary.missed,
            failed = summary.failed,
            "cache replay finished"
        );
        summary
    }

    fn apply(sensor: &dyn Sensor, topic: &str, payload: &[u8]) -> Result<Outcome, SensorError> {
        let device_type = sensor.kind().as_str();
        let serial = sensor.serial();

        match sensor.handle(topic, payload) {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Applied { changes } => {
                        debug!(device_type, shelly = %serial, changes = changes, "payload applied");
                        metrics().characteristics_updated(serial, *changes as u64);
                    }
                    Outcome::Ignored { .. } | Outcome::Empty => metrics().message_ignored(),
                }
                Ok(outcome)
            }
            Err(e) if e.is_decode() => {
                error!(
                    device_type,
                    shelly = %serial,
                    topic = %topic,
                    payload = %String::from_utf8_lossy(payload),
                    error = %e,
                    "could not parse payload"
                );
                metrics().decode_failed(serial);
                Err(e)
            }
            Err(e) => {
                error!(device_type, shelly = %serial, topic = %topic, error = %e, "update failed");
                metrics().update_failed(serial);
                Err(e)
            }
        }
    }

    /// Register a channel with the transport and return its receiving end
    pub fn attach<T: Transport>(&self, transport: &T, capacity: usize) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(capacity);
        transport.set_message_sender(tx);
        rx
    }

    /// Dispatch inbound messages until every sender is gone
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InboundMessage>) {
        info!("bridge dispatcher started");
        while let Some(message) = rx.recv().await {
            let span = crate::message_span!(topic = %message.topic, retain = message.retain);
            // already logged and counted
            let _ = self
                .handle_message(&message.topic, &message.payload)
                .instrument(span)
                .await;
        }
        info!("bridge dispatcher stopped");
    }

    /// The bridge accessory followed by every sensor accessory, in aid order
    pub fn accessories(&self) -> impl Iterator<Item = &Accessory> {
        std::iter::once(&self.accessory)
            .chain(self.floods.iter().map(|s| s.accessory()))
            .chain(self.smokes.iter().map(|s| s.accessory()))
            .chain(self.hts.iter().map(|s| s.accessory()))
    }

    pub fn accessory(&self, aid: u64) -> Option<&Accessory> {
        self.accessories().find(|accessory| accessory.aid() == aid)
    }

    pub fn find_characteristic(&self, aid: u64, iid: u64) -> Option<&Arc<Characteristic>> {
        self.accessory(aid)?.find_characteristic(iid)
    }

    /// The `n`-th (1-based) configured flood sensor
    pub fn leak_sensor(&self, n: usize) -> Option<&Arc<FloodSensor>> {
        self.floods.get(n.checked_sub(1)?)
    }

    /// The `n`-th (1-based) configured smoke sensor
    pub fn smoke_sensor(&self, n: usize) -> Option<&Arc<SmokeSensor>> {
        self.smokes.get(n.checked_sub(1)?)
    }

    pub fn ht_sensor(&self, n: usize) -> Option<&Arc<HtSensor>> {
        self.hts.get(n.checked_sub(1)?)
    }

    pub fn bridge_accessory(&self) -> &Accessory {
        &self.accessory
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Number of sensor accessories, excluding the bridge
    pub fn sensor_count(&self) -> usize {
        self.floods.len() + self.smokes.len() + self.hts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::Value;
    use crate::config::DevicesSection;
    use crate::store::MemoryStore;

    fn config() -> BridgeConfig {
        BridgeConfig {
            devices: DevicesSection {
                floods: vec!["244CAB42D00A".to_string()],
                legacy_floods: vec!["244CAB42D00B".to_string()],
                smokes: vec!["80646FD09ED4".to_string()],
                hts: vec!["08B61FCF0A1C".to_string()],
            },
            ..BridgeConfig::default()
        }
    }

    fn bridge() -> (Bridge, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let bridge = Bridge::from_config(&config(), store.clone(), ChangeNotifier::new());
        (bridge, store)
    }

    #[test]
    fn test_aids_and_names_follow_configuration_order() {
        let (bridge, _) = bridge();
        let layout: Vec<(u64, String)> = bridge
            .accessories()
            .map(|a| (a.aid(), a.info().name.clone()))
            .collect();

        assert_eq!(
            layout,
            vec![
                (1, "Shelly Bridge".to_string()),
                (2, "Leak 1".to_string()),
                (3, "Leak 2".to_string()),
                (4, "Smoke 1".to_string()),
                (5, "H&T 1".to_string()),
            ]
        );
        assert_eq!(bridge.sensor_count(), 4);
    }

    #[test]
    fn test_topics_cover_every_layout() {
        let (bridge, _) = bridge();
        let topics = bridge.topics();

        assert!(topics.contains(&"shellies/shellyflood-244CAB42D00A/info".to_string()));
        assert!(topics.contains(&"shellies/shellyflood-244CAB42D00B/sensor/flood".to_string()));
        assert!(topics.contains(&"shellyplussmoke-80646fd09ed4/events".to_string()));
        assert!(topics.contains(&"shellyplusht-08b61fcf0a1c/events/rpc".to_string()));
        // one info topic, five legacy fields, smoke, H&T
        assert_eq!(topics.len(), 8);
    }

    #[test]
    fn test_index_lookup_is_one_based() {
        let (bridge, _) = bridge();
        assert!(bridge.leak_sensor(0).is_none());
        assert_eq!(bridge.leak_sensor(2).unwrap().serial(), "244CAB42D00B");
        assert!(bridge.leak_sensor(3).is_none());
        assert!(bridge.smoke_sensor(1).is_some());
        assert!(bridge.smoke_sensor(2).is_none());
    }

    #[tokio::test]
    async fn test_handle_message_caches_and_applies() {
        let (bridge, store) = bridge();
        let topic = "shellies/shellyflood-244CAB42D00A/info";
        let payload = br#"{"flood":true,"tmp":{"value":19.5},"bat":{"value":80}}"#;

        let outcome = bridge.handle_message(topic, payload).await.unwrap();
        assert!(matches!(outcome, Outcome::Applied { changes } if changes > 0));

        let cached = store.get(&cache_key(topic)).await.unwrap();
        assert_eq!(cached.as_deref(), Some(&payload[..]));
        let leak = bridge.leak_sensor(1).unwrap();
        assert_eq!(leak.leak().leak_detected.value(), Value::Int(1));
    }

    #[tokio::test]
    async fn test_empty_payload_is_not_cached() {
        let (bridge, store) = bridge();
        let outcome = bridge
            .handle_message("shellyplussmoke-80646fd09ed4/events", b"")
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Empty);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_cached_but_not_applied() {
        let (bridge, store) = bridge();
        let topic = "shellyplusht-08b61fcf0a1c/events/rpc";

        let result = bridge.handle_message(topic, b"{not json").await;
        assert!(matches!(result, Err(BridgeError::Sensor(ref e)) if e.is_decode()));
        assert_eq!(store.len().await, 1);
        let ht = bridge.ht_sensor(1).unwrap();
        assert_eq!(ht.temperature().current_temperature.value(), Value::Float(0.0));
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let (bridge, store) = bridge();
        let result = bridge.handle_message("shellies/other/info", b"{}").await;
        assert!(matches!(result, Err(BridgeError::UnknownTopic(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_replay_does_not_rewrite_cache() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &cache_key("shellyplussmoke-80646fd09ed4/events"),
                br#"{"method":"NotifyFullStatus","params":{"smoke:0":{"alarm":true}}}"#,
            )
            .await
            .unwrap();
        let bridge = Bridge::from_config(&config(), store.clone(), ChangeNotifier::new());

        let summary = bridge.replay_cache().await;
        assert_eq!(summary.replayed, 1);
        assert_eq!(summary.missed, 7);
        assert_eq!(store.len().await, 1);
        let smoke = bridge.smoke_sensor(1).unwrap();
        assert_eq!(smoke.smoke().smoke_detected.value(), Value::Int(1));
    }

    #[test]
    fn test_find_characteristic() {
        let (bridge, _) = bridge();
        // iid 1 of every accessory is the information service
        assert!(bridge.find_characteristic(1, 2).is_some());
        assert!(bridge.find_characteristic(9, 2).is_none());
        assert!(bridge.find_characteristic(2, 999).is_none());
    }
}
