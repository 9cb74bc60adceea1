use tracing::warn;

use super::reconcile::Reconciler;
use super::{DeviceKind, Outcome, Sensor};
use crate::accessory::{
    Accessory, AccessoryInfo, BatteryService, Category, ChangeNotifier, HumidityService,
    TemperatureService, Value,
};
use crate::error::SensorError;
use crate::shelly::{ht, Decoded, TopicBuilder};

/// Shelly Plus H&T exposed as temperature, humidity and battery services
#[derive(Debug)]
pub struct HtSensor {
    serial: String,
    topic: String,
    accessory: Accessory,
    temperature: TemperatureService,
    humidity: HumidityService,
    battery: BatteryService,
}

impl HtSensor {
    pub fn new(aid: u64, index: usize, serial: &str, notifier: ChangeNotifier) -> Self {
        let kind = DeviceKind::Ht;
        let mut accessory = Accessory::new(
            aid,
            Category::Sensor,
            AccessoryInfo::new(kind.display_name(index), kind.as_str(), serial),
            notifier,
        );
        let temperature = TemperatureService::attach(&mut accessory);
        let humidity = HumidityService::attach(&mut accessory);
        let battery = BatteryService::attach(&mut accessory);

        Self {
            serial: serial.to_string(),
            topic: TopicBuilder::ht_events(serial),
            accessory,
            temperature,
            humidity,
            battery,
        }
    }

    pub fn temperature(&self) -> &TemperatureService {
        &self.temperature
    }

    pub fn humidity(&self) -> &HumidityService {
        &self.humidity
    }

    pub fn battery(&self) -> &BatteryService {
        &self.battery
    }
}

impl Sensor for HtSensor {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Ht
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

        let decoded = ht::decode(payload).map_err(|source| SensorError::Decode {
            serial: self.serial.clone(),
            source,
        })?;
        let reading = match decoded {
            Decoded::Reading(reading) => reading,
            Decoded::Ignored { method } => {
                warn!(
                    device_type = DeviceKind::Ht.as_str(),
                    shelly = %self.serial,
                    method = %method,
                    "ignoring event"
                );
                return Ok(Outcome::Ignored { method });
            }
        };

        let mut reconciler = Reconciler::new(DeviceKind::Ht, &self.serial);
        if let Some(percent) = reading.battery {
            reconciler.battery(&self.battery, percent)?;
        }
        if let Some(celsius) = reading.temperature {
            reconciler.set(&self.temperature.current_temperature, Value::Float(celsius))?;
        }
        if let Some(rh) = reading.humidity {
            reconciler.set(&self.humidity.current_relative_humidity, Value::Float(rh))?;
        }
        Ok(Outcome::Applied {
            changes: reconciler.changes(),
        })
    }
}
