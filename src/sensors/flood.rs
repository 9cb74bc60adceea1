use tracing::{debug, error, info};

use super::reconcile::Reconciler;
use super::{DeviceKind, Outcome, Sensor};
use crate::accessory::{
    Accessory, AccessoryInfo, BatteryService, Category, ChangeNotifier, LeakService,
    TemperatureService, Value,
};
use crate::error::SensorError;
use crate::shelly::{flood, FloodField, SensorReading, TopicBuilder};

/// Which topics a flood sensor publishes on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodTopics {
    /// Single `info` document
    Info,
    /// One topic per field under `sensor/`
    Legacy,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Info,
    Field(FloodField),
}

/// Shelly Flood exposed as leak, temperature and battery services
#[derive(Debug)]
pub struct FloodSensor {
    serial: String,
    accessory: Accessory,
    leak: LeakService,
    temperature: TemperatureService,
    battery: BatteryService,
    topics: Vec<(String, Source)>,
}

impl FloodSensor {
    pub fn new(
        aid: u64,
        index: usize,
        serial: &str,
        layout: FloodTopics,
        notifier: ChangeNotifier,
    ) -> Self {
        let kind = DeviceKind::Flood;
        let mut accessory = Accessory::new(
            aid,
            Category::Sensor,
            AccessoryInfo::new(kind.display_name(index), kind.as_str(), serial),
            notifier,
        );
        let leak = LeakService::attach(&mut accessory);
        let temperature = TemperatureService::attach(&mut accessory);
        let battery = BatteryService::attach(&mut accessory);

        let topics = match layout {
            FloodTopics::Info => vec![(TopicBuilder::flood_info(serial), Source::Info)],
            FloodTopics::Legacy => FloodField::ALL
                .into_iter()
                .map(|field| (TopicBuilder::flood_field(serial, field), Source::Field(field)))
                .collect(),
        };

        Self {
            serial: serial.to_string(),
            accessory,
            leak,
            temperature,
            battery,
            topics,
        }
    }

    pub fn leak(&self) -> &LeakService {
        &self.leak
    }

    pub fn temperature(&self) -> &TemperatureService {
        &self.temperature
    }

    pub fn battery(&self) -> &BatteryService {
        &self.battery
    }

    /// Set the leak state directly; returns whether it changed
    pub fn force_leak(&self, detected: bool) -> Result<bool, SensorError> {
        let mut reconciler = Reconciler::new(DeviceKind::Flood, &self.serial);
        reconciler.set_flag(&self.leak.leak_detected, detected)
    }

    fn apply(&self, reading: &SensorReading) -> Result<usize, SensorError> {
        if let Some(code) = reading.device_fault() {
            error!(
                device_type = DeviceKind::Flood.as_str(),
                shelly = %self.serial,
                code = code,
                "sensor reported an error"
            );
        }
        if let Some(reasons) = &reading.act_reasons {
            info!(
                device_type = DeviceKind::Flood.as_str(),
                shelly = %self.serial,
                reasons = ?reasons,
                "device woke up"
            );
        }

        let mut reconciler = Reconciler::new(DeviceKind::Flood, &self.serial);
        if let Some(percent) = reading.battery {
            reconciler.battery(&self.battery, percent)?;
        }
        if let Some(leak) = reading.leak {
            reconciler.set_flag(&self.leak.leak_detected, leak)?;
        }
        if let Some(celsius) = reading.temperature {
            reconciler.set(&self.temperature.current_temperature, Value::Float(celsius))?;
        }
        Ok(reconciler.changes())
    }
}

impl Sensor for FloodSensor {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Flood
    }

    fn serial(&self) -> &str {
        &self.serial
    }

    fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|(topic, _)| topic.clone()).collect()
    }

    fn handle(&self, topic: &str, payload: &[u8]) -> Result<Outcome, SensorError> {
        let source = self
            .topics
            .iter()
            .find(|(candidate, _)| candidate == topic)
            .map(|(_, source)| *source)
            .ok_or_else(|| SensorError::UnknownTopic {
                serial: self.serial.clone(),
                topic: topic.to_string(),
            })?;

        let decoded = match source {
            Source::Info => flood::decode_info(payload),
            Source::Field(field) => field.decode(payload),
        };
        let reading = decoded.map_err(|source| SensorError::Decode {
            serial: self.serial.clone(),
            source,
        })?;
        debug!(shelly = %self.serial, topic = topic, ?reading, "decoded flood payload");

        let changes = self.apply(&reading)?;
        Ok(Outcome::Applied { changes })
    }
}
