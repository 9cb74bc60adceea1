//! End-to-end message handling through a mock transport
//!
//! Publishes are injected as if they came from the broker and the resulting
//! accessory state is checked once the dispatcher has drained.

use shelly_homekit_bridge::accessory::{ChangeNotifier, Value};
use shelly_homekit_bridge::config::{BridgeConfig, DevicesSection};
use shelly_homekit_bridge::store::{cache_key, MemoryStore, Store};
use shelly_homekit_bridge::testing::{FailingStore, MockTransport};
use shelly_homekit_bridge::transport::Transport;
use shelly_homekit_bridge::Bridge;
use std::sync::Arc;
use std::time::Duration;

const FLOOD_INFO: &str = "shellies/shellyflood-244CAB42D00A/info";
const LEGACY_FLOOD: &str = "shellies/shellyflood-244CAB42D00B/sensor/flood";
const LEGACY_BATTERY: &str = "shellies/shellyflood-244CAB42D00B/sensor/battery";
const SMOKE: &str = "shellyplussmoke-80646fd09ed4/events";
const HT: &str = "shellyplusht-08b61fcf0a1c/events/rpc";

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

async fn run_messages(
    bridge: Arc<Bridge>,
    messages: &[(&str, &str)],
) -> MockTransport {
    let mut transport = MockTransport::new();
    let inbound = bridge.attach(&transport, 16);
    let dispatcher = tokio::spawn(bridge.clone().run(inbound));

    transport.connect().await.unwrap();
    transport.subscribe(&bridge.topics()).await.unwrap();
    for (topic, payload) in messages {
        transport.inject(topic, payload.as_bytes()).await.unwrap();
    }

    transport.close();
    tokio::time::timeout(Duration::from_secs(5), dispatcher)
        .await
        .expect("dispatcher should stop once the sender is gone")
        .unwrap();
    transport
}

#[tokio::test]
async fn test_subscribes_to_every_device_topic() {
    let bridge = Arc::new(Bridge::from_config(
        &config(),
        Arc::new(MemoryStore::new()),
        ChangeNotifier::new(),
    ));
    let transport = run_messages(bridge.clone(), &[]).await;

    let subscriptions = transport.get_subscriptions();
    assert_eq!(subscriptions, bridge.topics());
    for topic in [FLOOD_INFO, LEGACY_FLOOD, SMOKE, HT] {
        assert!(subscriptions.contains(&topic.to_string()), "missing {topic}");
    }
}

#[tokio::test]
async fn test_live_messages_update_all_device_families() {
    let store = Arc::new(MemoryStore::new());
    let bridge = Arc::new(Bridge::from_config(
        &config(),
        store.clone(),
        ChangeNotifier::new(),
    ));

    run_messages(
        bridge.clone(),
        &[
            (FLOOD_INFO, r#"{"flood":true,"tmp":{"value":17.25},"bat":{"value":7}}"#),
            (LEGACY_FLOOD, "true"),
            (LEGACY_BATTERY, "55"),
            (
                SMOKE,
                r#"{"src":"shellyplussmoke-80646fd09ed4","method":"NotifyFullStatus","params":{"devicepower:0":{"battery":{"percent":93}},"smoke:0":{"alarm":true,"mute":false}}}"#,
            ),
            (HT, r#"{"Method":"NotifyFullStatus","Battery":64,"Hr":48.0,"Temp":20.5}"#),
        ],
    )
    .await;

    let flood = bridge.leak_sensor(1).unwrap();
    assert_eq!(flood.leak().leak_detected.value(), Value::Int(1));
    assert_eq!(flood.temperature().current_temperature.value(), Value::Float(17.25));
    assert_eq!(flood.battery().status_low_battery.value(), Value::Int(1));

    let legacy = bridge.leak_sensor(2).unwrap();
    assert_eq!(legacy.leak().leak_detected.value(), Value::Int(1));
    assert_eq!(legacy.battery().battery_level.value(), Value::Int(55));

    let smoke = bridge.smoke_sensor(1).unwrap();
    assert_eq!(smoke.smoke().smoke_detected.value(), Value::Int(1));
    assert_eq!(smoke.battery().battery_level.value(), Value::Int(93));

    let ht = bridge.ht_sensor(1).unwrap();
    assert_eq!(ht.humidity().current_relative_humidity.value(), Value::Float(48.0));

    // every non-empty payload is cached under its sanitized topic
    assert_eq!(store.len().await, 5);
    assert!(store
        .get(&cache_key(SMOKE))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_bad_payloads_do_not_stop_the_dispatcher() {
    let bridge = Arc::new(Bridge::from_config(
        &config(),
        Arc::new(MemoryStore::new()),
        ChangeNotifier::new(),
    ));

    run_messages(
        bridge.clone(),
        &[
            (HT, "{broken"),
            (HT, r#"{"method":"NotifyEvent","params":{"temperature:0":{"tC":30.0}}}"#),
            (FLOOD_INFO, r#"{"bat":{"value":250}}"#),
            (SMOKE, ""),
            ("shellies/unknown/info", "{}"),
            (HT, r#"{"method":"NotifyFullStatus","params":{"temperature:0":{"tC":22.0}}}"#),
        ],
    )
    .await;

    let ht = bridge.ht_sensor(1).unwrap();
    assert_eq!(ht.temperature().current_temperature.value(), Value::Float(22.0));
    let flood = bridge.leak_sensor(1).unwrap();
    assert_eq!(flood.battery().battery_level.value(), Value::Int(0));
}

#[tokio::test]
async fn test_cache_failures_are_not_fatal() {
    let bridge = Arc::new(Bridge::from_config(
        &config(),
        Arc::new(FailingStore),
        ChangeNotifier::new(),
    ));

    run_messages(bridge.clone(), &[(LEGACY_FLOOD, "true")]).await;

    let legacy = bridge.leak_sensor(2).unwrap();
    assert_eq!(legacy.leak().leak_detected.value(), Value::Int(1));

    let summary = bridge.replay_cache().await;
    assert_eq!(summary.replayed, 0);
    assert_eq!(summary.failed, bridge.topics().len());
}

#[tokio::test]
async fn test_changes_are_broadcast_once() {
    let notifier = ChangeNotifier::new();
    let mut events = notifier.subscribe();
    let bridge = Arc::new(Bridge::from_config(
        &config(),
        Arc::new(MemoryStore::new()),
        notifier,
    ));

    run_messages(
        bridge.clone(),
        &[(LEGACY_FLOOD, "true"), (LEGACY_FLOOD, "true")],
    )
    .await;

    let event = events.try_recv().unwrap();
    assert_eq!(event.aid, 3);
    assert_eq!(event.value, Value::Int(1));
    assert!(events.try_recv().is_err(), "repeated state must not notify");
}

#[tokio::test]
async fn test_concurrent_handling_across_devices() {
    let bridge = Arc::new(Bridge::from_config(
        &config(),
        Arc::new(MemoryStore::new()),
        ChangeNotifier::new(),
    ));

    let messages = [
        (LEGACY_FLOOD, "true"),
        (LEGACY_BATTERY, "80"),
        (FLOOD_INFO, r#"{"flood":false,"bat":{"value":42}}"#),
        (HT, r#"{"method":"NotifyFullStatus","params":{"humidity:0":{"rh":61.5}}}"#),
    ];
    let results = futures::future::join_all(
        messages
            .iter()
            .map(|(topic, payload)| bridge.handle_message(topic, payload.as_bytes())),
    )
    .await;

    assert!(results.iter().all(|result| result.is_ok()));
    let legacy = bridge.leak_sensor(2).unwrap();
    assert_eq!(legacy.battery().battery_level.value(), Value::Int(80));
    let flood = bridge.leak_sensor(1).unwrap();
    assert_eq!(flood.battery().battery_level.value(), Value::Int(42));
    let ht = bridge.ht_sensor(1).unwrap();
    assert_eq!(ht.humidity().current_relative_humidity.value(), Value::Float(61.5));
}
