//! Accessories own services and hand out instance ids

use serde::Serialize;
use std::sync::Arc;

use super::characteristic::{Characteristic, CharacteristicType, Format, Permission, Value};
use super::notify::ChangeNotifier;
use super::service::{Service, ServiceType};

/// HAP accessory category advertised for an accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Bridge,
    Sensor,
}

impl Category {
    pub fn code(&self) -> u8 {
        match self {
            Category::Bridge => 2,
            Category::Sensor => 10,
        }
    }
}

/// Static identification shown in the information service
#[derive(Debug, Clone)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware: String,
}

impl AccessoryInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manufacturer: "Shelly".to_string(),
            model: model.into(),
            serial_number: serial.into(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }
}

/// An accessory exposed through the bridge
#[derive(Debug)]
pub struct Accessory {
    aid: u64,
    category: Category,
    info: AccessoryInfo,
    services: Vec<Service>,
    next_iid: u64,
    notifier: ChangeNotifier,
}

impl Accessory {
    /// Create an accessory with its information service already in place
    pub fn new(aid: u64, category: Category, info: AccessoryInfo, notifier: ChangeNotifier) -> Self {
        let mut accessory = Self {
            aid,
            category,
            info,
            services: Vec::new(),
            next_iid: 1,
            notifier,
        };
        accessory.add_information_service();
        accessory
    }

    fn allocate_iid(&mut self) -> u64 {
        let iid = self.next_iid;
        self.next_iid += 1;
        iid
    }

    fn add_information_service(&mut self) {
        let service_iid = self.allocate_iid();
        let fields = [
            (CharacteristicType::Identify, None),
            (CharacteristicType::Manufacturer, Some(self.info.manufacturer.clone())),
            (CharacteristicType::Model, Some(self.info.model.clone())),
            (CharacteristicType::Name, Some(self.info.name.clone())),
            (CharacteristicType::SerialNumber, Some(self.info.serial_number.clone())),
            (CharacteristicType::FirmwareRevision, Some(self.info.firmware.clone())),
        ];

        let characteristics = fields
            .into_iter()
            .map(|(kind, text)| {
                let iid = self.allocate_iid();
                let characteristic = Characteristic::new(self.aid, iid, kind, self.notifier.clone());
                Arc::new(match text {
                    Some(text) => characteristic.with_value(Value::String(text)),
                    None => characteristic,
                })
            })
            .collect();

        self.services.push(Service {
            iid: service_iid,
            kind: ServiceType::AccessoryInformation,
            characteristics,
        });
    }

    /// Append a service and return its characteristics in the requested order
    pub fn add_service(
        &mut self,
        kind: ServiceType,
        characteristic_types: &[CharacteristicType],
    ) -> Vec<Arc<Characteristic>> {
        let service_iid = self.allocate_iid();
        let characteristics: Vec<Arc<Characteristic>> = characteristic_types
            .iter()
            .map(|kind| {
                let iid = self.allocate_iid();
                Arc::new(Characteristic::new(
                    self.aid,
                    iid,
                    *kind,
                    self.notifier.clone(),
                ))
            })
            .collect();

        self.services.push(Service {
            iid: service_iid,
            kind,
            characteristics: characteristics.clone(),
        });
        characteristics
    }

    pub fn aid(&self) -> u64 {
        self.aid
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn find_characteristic(&self, iid: u64) -> Option<&Arc<Characteristic>> {
        self.services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .find(|characteristic| characteristic.iid() == iid)
    }

    /// Snapshot of the accessory in the `/accessories` layout
    pub fn describe(&self) -> AccessoryDescription {
        AccessoryDescription {
            aid: self.aid,
            services: self
                .services
                .iter()
                .map(|service| ServiceDescription {
                    iid: service.iid,
                    service_type: service.kind.type_id(),
                    characteristics: service
                        .characteristics
                        .iter()
                        .map(|c| CharacteristicDescription::from(c.as_ref()))
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessoryDescription {
    pub aid: u64,
    pub services: Vec<ServiceDescription>,
}

#[derive(Debug, Serialize)]
pub struct ServiceDescription {
    pub iid: u64,
    #[serde(rename = "type")]
    pub service_type: &'static str,
    pub characteristics: Vec<CharacteristicDescription>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicDescription {
    pub iid: u64,
    #[serde(rename = "type")]
    pub characteristic_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub perms: &'static [Permission],
    pub format: Format,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
}

impl From<&Characteristic> for CharacteristicDescription {
    fn from(characteristic: &Characteristic) -> Self {
        let kind = characteristic.kind();
        let perms = kind.permissions();
        let bounds = kind.bounds();
        Self {
            iid: characteristic.iid(),
            characteristic_type: kind.type_id(),
            // write-only characteristics carry no readable value
            value: perms
                .contains(&Permission::Read)
                .then(|| characteristic.value()),
            perms,
            format: kind.format(),
            unit: kind.unit(),
            min_value: bounds.map(|(min, _, _)| min),
            max_value: bounds.map(|(_, max, _)| max),
            min_step: bounds.map(|(_, _, step)| step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::service::{BatteryService, LeakService};

    fn leak_accessory() -> (Accessory, BatteryService, LeakService) {
        let mut accessory = Accessory::new(
            2,
            Category::Sensor,
            AccessoryInfo::new("Leak 1", "shellyflood", "244CAB42D00A"),
            ChangeNotifier::new(),
        );
        let battery = BatteryService::attach(&mut accessory);
        let leak = LeakService::attach(&mut accessory);
        (accessory, battery, leak)
    }

    #[test]
    fn test_information_service_comes_first() {
        let (accessory, _, _) = leak_accessory();
        let info = &accessory.services()[0];
        assert_eq!(info.iid(), 1);
        assert_eq!(info.kind(), ServiceType::AccessoryInformation);
        assert_eq!(info.characteristics().len(), 6);

        let name = accessory.find_characteristic(5).unwrap();
        assert_eq!(name.kind(), CharacteristicType::Name);
        assert_eq!(name.value(), Value::from("Leak 1"));
    }

    #[test]
    fn test_iids_are_sequential_and_unique() {
        let (accessory, battery, leak) = leak_accessory();
        // info service 1, its characteristics 2..=7, battery service 8
        assert_eq!(battery.battery_level.iid(), 9);
        assert_eq!(battery.status_low_battery.iid(), 10);
        assert_eq!(battery.charging_state.iid(), 11);
        assert_eq!(accessory.services()[2].iid(), 12);
        assert_eq!(leak.leak_detected.iid(), 13);

        let mut iids: Vec<u64> = accessory
            .services()
            .iter()
            .flat_map(|s| std::iter::once(s.iid()).chain(s.characteristics().iter().map(|c| c.iid())))
            .collect();
        let total = iids.len();
        iids.sort_unstable();
        iids.dedup();
        assert_eq!(iids.len(), total);
    }

    #[test]
    fn test_typed_handles_share_characteristics() {
        let (accessory, _, leak) = leak_accessory();
        leak.leak_detected.set_value(Value::Int(1)).unwrap();
        let found = accessory.find_characteristic(leak.leak_detected.iid()).unwrap();
        assert_eq!(found.value(), Value::Int(1));
        assert!(accessory.find_characteristic(99).is_none());
    }

    #[test]
    fn test_describe_layout() {
        let (accessory, _, _) = leak_accessory();
        let json = serde_json::to_value(accessory.describe()).unwrap();

        assert_eq!(json["aid"], 2);
        assert_eq!(json["services"][0]["type"], "3E");
        assert_eq!(json["services"][1]["type"], "96");
        assert_eq!(json["services"][2]["type"], "83");

        let identify = &json["services"][0]["characteristics"][0];
        assert_eq!(identify["type"], "14");
        assert!(identify.get("value").is_none());
        assert_eq!(identify["perms"], serde_json::json!(["pw"]));

        let battery_level = &json["services"][1]["characteristics"][0];
        assert_eq!(battery_level["format"], "uint8");
        assert_eq!(battery_level["unit"], "percentage");
        assert_eq!(battery_level["maxValue"], 100.0);
        assert_eq!(battery_level["perms"], serde_json::json!(["pr", "ev"]));
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(Category::Bridge.code(), 2);
        assert_eq!(Category::Sensor.code(), 10);
    }
}
