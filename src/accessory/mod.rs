//! HomeKit accessory model
//!
//! Accessories are addressed by `aid`, and every service and characteristic
//! inside one gets a unique `iid`. Accepted characteristic writes are fanned
//! out through a shared [`ChangeNotifier`].

#[allow(clippy::module_inception)]
pub mod accessory;
pub mod characteristic;
pub mod notify;
pub mod service;

pub use accessory::{Accessory, AccessoryDescription, AccessoryInfo, Category};
pub use characteristic::{
    flag, Characteristic, CharacteristicError, CharacteristicType, Format, Permission, Value,
    CHARGING_STATE_NOT_CHARGEABLE, DETECTED, NOT_DETECTED,
};
pub use notify::{ChangeNotifier, CharacteristicEvent};
pub use service::{
    BatteryService, HumidityService, LeakService, Service, ServiceType, SmokeService,
    TemperatureService,
};
