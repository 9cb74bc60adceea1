//! Services group characteristics; typed handles give sensors direct access

use std::sync::Arc;

use super::accessory::Accessory;
use super::characteristic::{Characteristic, CharacteristicType};

/// Service types used by the sensor accessories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    AccessoryInformation,
    Battery,
    TemperatureSensor,
    HumiditySensor,
    LeakSensor,
    SmokeSensor,
}

impl ServiceType {
    /// Short form of the HAP type UUID
    pub fn type_id(&self) -> &'static str {
        match self {
            ServiceType::AccessoryInformation => "3E",
            ServiceType::Battery => "96",
            ServiceType::TemperatureSensor => "8A",
            ServiceType::HumiditySensor => "82",
            ServiceType::LeakSensor => "83",
            ServiceType::SmokeSensor => "87",
        }
    }
}

/// A service instance inside an accessory
#[derive(Debug)]
pub struct Service {
    pub(crate) iid: u64,
    pub(crate) kind: ServiceType,
    pub(crate) characteristics: Vec<Arc<Characteristic>>,
}

impl Service {
    pub fn iid(&self) -> u64 {
        self.iid
    }

    pub fn kind(&self) -> ServiceType {
        self.kind
    }

    pub fn characteristics(&self) -> &[Arc<Characteristic>] {
        &self.characteristics
    }
}

/// Battery level, low battery flag and charging state
#[derive(Debug, Clone)]
pub struct BatteryService {
    pub battery_level: Arc<Characteristic>,
    pub status_low_battery: Arc<Characteristic>,
    pub charging_state: Arc<Characteristic>,
}

impl BatteryService {
    pub fn attach(accessory: &mut Accessory) -> Self {
        let mut chars = accessory.add_service(
            ServiceType::Battery,
            &[
                CharacteristicType::BatteryLevel,
                CharacteristicType::StatusLowBattery,
                CharacteristicType::ChargingState,
            ],
        );
        let charging_state = chars.remove(2);
        let status_low_battery = chars.remove(1);
        let battery_level = chars.remove(0);
        Self {
            battery_level,
            status_low_battery,
            charging_state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemperatureService {
    pub current_temperature: Arc<Characteristic>,
}

impl TemperatureService {
    pub fn attach(accessory: &mut Accessory) -> Self {
        let mut chars = accessory.add_service(
            ServiceType::TemperatureSensor,
            &[CharacteristicType::CurrentTemperature],
        );
        Self {
            current_temperature: chars.remove(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HumidityService {
    pub current_relative_humidity: Arc<Characteristic>,
}

impl HumidityService {
    pub fn attach(accessory: &mut Accessory) -> Self {
        let mut chars = accessory.add_service(
            ServiceType::HumiditySensor,
            &[CharacteristicType::CurrentRelativeHumidity],
        );
        Self {
            current_relative_humidity: chars.remove(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeakService {
    pub leak_detected: Arc<Characteristic>,
}

impl LeakService {
    pub fn attach(accessory: &mut Accessory) -> Self {
        let mut chars =
            accessory.add_service(ServiceType::LeakSensor, &[CharacteristicType::LeakDetected]);
        Self {
            leak_detected: chars.remove(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmokeService {
    pub smoke_detected: Arc<Characteristic>,
}

impl SmokeService {
    pub fn attach(accessory: &mut Accessory) -> Self {
        let mut chars =
            accessory.add_service(ServiceType::SmokeSensor, &[CharacteristicType::SmokeDetected]);
        Self {
            smoke_detected: chars.remove(0),
        }
    }
}
