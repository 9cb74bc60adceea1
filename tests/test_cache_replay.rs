//! Restart behavior: payloads cached by one bridge restore the next one

use shelly_homekit_bridge::accessory::{ChangeNotifier, Value};
use shelly_homekit_bridge::config::{BridgeConfig, DevicesSection};
use shelly_homekit_bridge::store::{cache_key, FsStore, Store};
use shelly_homekit_bridge::Bridge;
use std::sync::Arc;
use tempfile::TempDir;

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

/// (aid, iid, value) of every characteristic of every accessory
fn snapshot(bridge: &Bridge) -> Vec<(u64, u64, Value)> {
    bridge
        .accessories()
        .flat_map(|accessory| {
            accessory.services().iter().flat_map(move |service| {
                service
                    .characteristics()
                    .iter()
                    .map(move |c| (accessory.aid(), c.iid(), c.value()))
            })
        })
        .collect()
}

async fn open_bridge(dir: &TempDir) -> Bridge {
    let store = Arc::new(FsStore::open(dir.path()).await.unwrap());
    Bridge::from_config(&config(), store, ChangeNotifier::new())
}

#[tokio::test]
async fn test_replay_matches_live_processing() {
    let dir = TempDir::new().unwrap();
    let live = open_bridge(&dir).await;

    let messages: [(&str, &str); 5] = [
        (
            "shellies/shellyflood-244CAB42D00A/info",
            r#"{"flood":false,"tmp":{"value":12.5,"is_valid":true},"bat":{"value":41},"act_reasons":["periodic"]}"#,
        ),
        ("shellies/shellyflood-244CAB42D00B/sensor/temperature", "9.75"),
        ("shellies/shellyflood-244CAB42D00B/sensor/battery", "4"),
        (
            "shellyplussmoke-80646fd09ed4/events",
            r#"{"method":"NotifyFullStatus","params":{"devicepower:0":{"battery":{"V":2.9,"percent":61}},"smoke:0":{"alarm":false,"mute":true}}}"#,
        ),
        (
            "shellyplusht-08b61fcf0a1c/events/rpc",
            r#"{"method":"NotifyFullStatus","params":{"temperature:0":{"tC":23.4},"humidity:0":{"rh":38.5}}}"#,
        ),
    ];
    for (topic, payload) in messages {
        live.handle_message(topic, payload.as_bytes()).await.unwrap();
    }
    let expected = snapshot(&live);
    drop(live);

    let restarted = open_bridge(&dir).await;
    assert_ne!(snapshot(&restarted), expected);

    let summary = restarted.replay_cache().await;
    assert_eq!(summary.replayed, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.missed, restarted.topics().len() - 5);
    assert_eq!(snapshot(&restarted), expected);
}

#[tokio::test]
async fn test_replay_leaves_cache_untouched() {
    let dir = TempDir::new().unwrap();
    let topic = "shellyplusht-08b61fcf0a1c/events/rpc";
    let payload = br#"{"method":"NotifyFullStatus","temp":19.0}"#;
    {
        let store = FsStore::open(dir.path()).await.unwrap();
        store.set(&cache_key(topic), payload).await.unwrap();
    }
    let path = dir.path().join(cache_key(topic));
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

    let bridge = open_bridge(&dir).await;
    bridge.replay_cache().await;

    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    assert_eq!(
        bridge
            .ht_sensor(1)
            .unwrap()
            .temperature()
            .current_temperature
            .value(),
        Value::Float(19.0)
    );
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_skipped() {
    let dir = TempDir::new().unwrap();
    {
        let store = FsStore::open(dir.path()).await.unwrap();
        store
            .set(&cache_key("shellyplussmoke-80646fd09ed4/events"), b"\x00\xff")
            .await
            .unwrap();
        store
            .set(
                &cache_key("shellies/shellyflood-244CAB42D00B/sensor/flood"),
                b"true",
            )
            .await
            .unwrap();
    }

    let bridge = open_bridge(&dir).await;
    let summary = bridge.replay_cache().await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.replayed, 1);
    assert_eq!(
        bridge.leak_sensor(2).unwrap().leak().leak_detected.value(),
        Value::Int(1)
    );
}
