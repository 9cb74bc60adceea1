use tracing::{debug, warn};

use super::reconcile::Reconciler;
use super::{DeviceKind, Outcome, Sensor};
use crate::accessory::{
    Accessory, AccessoryInfo, BatteryService, Category, ChangeNotifier, SmokeService,
};
use crate::error::SensorError;
use crate::shelly::{smoke, Decoded, TopicBuilder};

/// Shelly Plus Smoke exposed as smoke and battery services
#[derive(Debug)]
pub struct SmokeSensor {
    serial: String,
    topic: String,
    accessory: Accessory,
    smoke: SmokeService,
    battery: BatteryService,
}

impl SmokeSensor {
    pub fn new(aid: u64, index: usize, serial: &str, notifier: ChangeNotifier) -> Self {
        let kind = DeviceKind::Smoke;
        let mut accessory = Accessory::new(
            aid,
            Category::Sensor,
            AccessoryInfo::new(kind.display_name(index), kind.as_str(), serial),
            notifier,
        );
        let smoke = SmokeService::attach(&mut accessory);
        let battery = BatteryService::attach(&mut accessory);

        Self {
            serial: serial.to_string(),
            topic: TopicBuilder::smoke_events(serial),
            accessory,
            smoke,
            battery,
        }
    }

    pub fn smoke(&self) -> &SmokeService {
        &self.smoke
    }

    pub fn battery(&self) -> &BatteryService {
        &self.battery
    }

    /// Set the smoke state directly; returns whether it changed
    pub fn force_smoke(&self, detected: bool) -> Result<bool, SensorError> {
        let mut reconciler = Reconciler::new(DeviceKind::Smoke, &self.serial);
        reconciler.set_flag(&self.smoke.smoke_detected, detected)
    }
}

impl Sensor for SmokeSensor {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Smoke
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    fn topics(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    fn handle(&self, topic: &str, payload: &[u8]) -> Result<Outcome, SensorError> {
        if topic != self.topic {
            return Err(SensorError::UnknownTopic {
                serial: self.serial.clone(),
                topic: topic.to_string(),
            });
        }

        let decoded = smoke::decode(payload).map_err(|source| SensorError::Decode {
            serial: self.serial.clone(),
            source,
        })?;
        let reading = match decoded {
            Decoded::Reading(reading) => reading,
            Decoded::Ignored { method } => {
                warn!(
                    device_type = DeviceKind::Smoke.as_str(),
                    shelly = %self.serial,
                    method = %method,
                    "ignoring event"
                );
                return Ok(Outcome::Ignored { method });
            }
        };

        if let Some(muted) = reading.smoke_muted {
            debug!(shelly = %self.serial, muted, "smoke alarm mute state");
        }

        let mut reconciler = Reconciler::new(DeviceKind::Smoke, &self.serial);
        if let Some(percent) = reading.battery {
            reconciler.battery(&self.battery, percent)?;
        }
        if let Some(alarm) = reading.smoke {
            reconciler.set_flag(&self.smoke.smoke_detected, alarm)?;
        }
        Ok(Outcome::Applied {
            changes: reconciler.changes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::Value;

    const TOPIC: &str = "shellyplussmoke-80646fd09ed4/events";

    fn sensor() -> SmokeSensor {
        SmokeSensor::new(3, 1, "80646FD09ED4", ChangeNotifier::new())
    }

    #[test]
    fn test_topic_uses_lowercase_serial() {
        let sensor = sensor();
        assert_eq!(sensor.topics(), vec![TOPIC.to_string()]);
        assert_eq!(sensor.name(), "Smoke 1");
        assert_eq!(sensor.serial(), "80646FD09ED4");
    }

    #[test]
    fn test_alarm_and_battery() {
        let sensor = sensor();
        let outcome = sensor
            .handle(
                TOPIC,
                br#"{"method":"NotifyFullStatus","params":{"devicepower:0":{"battery":{"V":2.99,"percent":97}},"smoke:0":{"id":0,"alarm":true,"mute":false}}}"#,
            )
            .unwrap();

        assert_eq!(outcome, Outcome::Applied { changes: 2 });
        assert_eq!(sensor.smoke().smoke_detected.value(), Value::Int(1));
        assert_eq!(sensor.battery().battery_level.value(), Value::Int(97));
        assert_eq!(sensor.battery().status_low_battery.value(), Value::Int(0));
    }

    #[test]
    fn test_other_method_is_ignored() {
        let sensor = sensor();
        let outcome = sensor
            .handle(
                TOPIC,
                br#"{"method":"NotifyStatus","params":{"smoke:0":{"alarm":true}}}"#,
            )
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Ignored {
                method: "NotifyStatus".to_string()
            }
        );
        assert_eq!(sensor.smoke().smoke_detected.value(), Value::Int(0));
    }

    #[test]
    fn test_malformed_payload() {
        let sensor = sensor();
        let error = sensor.handle(TOPIC, b"[1,2").unwrap_err();
        assert!(error.is_decode());
    }

    #[test]
    fn test_force_smoke() {
        let sensor = sensor();
        assert!(sensor.force_smoke(true).unwrap());
        assert_eq!(sensor.smoke().smoke_detected.value(), Value::Int(1));
        assert!(sensor.force_smoke(false).unwrap());
        assert!(!sensor.force_smoke(false).unwrap());
    }
}
