//! Change-suppressed characteristic updates

use tracing::info;

use super::DeviceKind;
use crate::accessory::{flag, BatteryService, Characteristic, Value};
use crate::error::SensorError;

/// Battery percentage below which the low battery flag is raised
pub const LOW_BATTERY_THRESHOLD: i64 = 10;

/// Applies decoded values to one device's characteristics
///
/// A value is only written when it differs from the held one. The first
/// rejected write aborts the remaining updates of the payload.
pub(crate) struct Reconciler<'a> {
    kind: DeviceKind,
    serial: &'a str,
    changes: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(kind: DeviceKind, serial: &'a str) -> Self {
        Self {
            kind,
            serial,
            changes: 0,
        }
    }

    /// Number of characteristics actually written
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Write `value` if it differs; returns whether a write happened
    pub fn set(
        &mut self,
        characteristic: &Characteristic,
        value: Value,
    ) -> Result<bool, SensorError> {
        let current = characteristic.value();
        if same_value(&current, &value) {
            return Ok(false);
        }

        characteristic
            .set_value(value.clone())
            .map_err(|source| SensorError::Characteristic {
                serial: self.serial.to_string(),
                characteristic: characteristic.kind().label(),
                source,
            })?;

        info!(
            device_type = self.kind.as_str(),
            shelly = self.serial,
            from = %current,
            to = %value,
            "updated {}",
            characteristic.kind().label()
        );
        self.changes += 1;
        Ok(true)
    }

    pub fn set_flag(
        &mut self,
        characteristic: &Characteristic,
        value: bool,
    ) -> Result<bool, SensorError> {
        self.set(characteristic, Value::Int(flag(value)))
    }

    /// Battery level plus the derived low battery flag
    pub fn battery(&mut self, battery: &BatteryService, percent: i64) -> Result<(), SensorError> {
        self.set(&battery.battery_level, Value::Int(percent))?;
        self.set_flag(
            &battery.status_low_battery,
            percent < LOW_BATTERY_THRESHOLD,
        )?;
        Ok(())
    }
}

/// Equality that treats integers and floats of equal magnitude as the same
fn same_value(current: &Value, new: &Value) -> bool {
    match (current, new) {
        (Value::Float(a), Value::Int(b)) | (Value::Int(b), Value::Float(a)) => *a == *b as f64,
        _ => current == new,
    }
}
