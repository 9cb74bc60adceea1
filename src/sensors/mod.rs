//! Sensor accessories fed by Shelly payloads
//!
//! Each sensor owns its accessory and the typed handles onto the
//! characteristics it drives. Payloads are decoded by [`crate::shelly`] and
//! reconciled against the held values, so only real changes are written.

pub mod flood;
pub mod ht;
pub mod reconcile;
pub mod smoke;

use std::fmt;

use crate::accessory::Accessory;
use crate::error::SensorError;

pub use flood::{FloodSensor, FloodTopics};
pub use ht::HtSensor;
pub use reconcile::LOW_BATTERY_THRESHOLD;
pub use smoke::SmokeSensor;

/// Device families the bridge understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Flood,
    Smoke,
    Ht,
}

impl DeviceKind {
    /// Shelly model identifier, also used as the `type` log field
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Flood => "shellyflood",
            DeviceKind::Smoke => "shellyplussmoke",
            DeviceKind::Ht => "shellyplusht",
        }
    }

    /// Prefix of the accessory display name
    pub fn name_prefix(&self) -> &'static str {
        match self {
            DeviceKind::Flood => "Leak",
            DeviceKind::Smoke => "Smoke",
            DeviceKind::Ht => "H&T",
        }
    }

    /// Display name for the `index`-th (1-based) device of this kind
    pub fn display_name(&self, index: usize) -> String {
        format!("{} {}", self.name_prefix(), index)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of handling one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload was applied; `changes` characteristics were written
    Applied { changes: usize },
    /// Payload carried a method that holds no state to apply
    Ignored { method: String },
    /// Payload was empty and never reached a decoder
    Empty,
}

/// A configured Shelly device exposed as an accessory
pub trait Sensor: Send + Sync {
    fn kind(&self) -> DeviceKind;

    fn serial(&self) -> &str;

    fn accessory(&self) -> &Accessory;

    /// Topics this device publishes on
    fn topics(&self) -> Vec<String>;

    /// Decode a payload received on `topic` and reconcile it
    fn handle(&self, topic: &str, payload: &[u8]) -> Result<Outcome, SensorError>;

    fn name(&self) -> &str {
        &self.accessory().info().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_names() {
        assert_eq!(DeviceKind::Flood.display_name(1), "Leak 1");
        assert_eq!(DeviceKind::Smoke.display_name(2), "Smoke 2");
        assert_eq!(DeviceKind::Ht.display_name(3), "H&T 3");
        assert_eq!(DeviceKind::Ht.to_string(), "shellyplusht");
    }
}
