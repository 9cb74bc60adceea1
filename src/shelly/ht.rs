//! Shelly Plus H&T
//!
//! Early firmware sends a flat, method-tagged object (`method`, `battery`,
//! `hr`, `temp`), with either capitalisation of the first letter. Current
//! firmware wraps the components in an RPC envelope instead.

use serde::Deserialize;

use super::rpc::{DevicePower, HumidityStatus, TemperatureStatus, NOTIFY_FULL_STATUS};
use super::{DecodeError, Decoded, SensorReading};

#[derive(Debug, Deserialize)]
struct HtMessage {
    #[serde(default, alias = "Method")]
    method: Option<String>,
    #[serde(default, alias = "Battery")]
    battery: Option<i64>,
    #[serde(default, alias = "Hr")]
    hr: Option<f64>,
    #[serde(default, alias = "Temp")]
    temp: Option<f64>,
    #[serde(default, alias = "Params")]
    params: Option<HtParams>,
}

#[derive(Debug, Default, Deserialize)]
struct HtParams {
    #[serde(rename = "devicepower:0", default)]
    power: Option<DevicePower>,
    #[serde(rename = "temperature:0", default)]
    temperature: Option<TemperatureStatus>,
    #[serde(rename = "humidity:0", default)]
    humidity: Option<HumidityStatus>,
}

/// Decode an `shellyplusht-<serial>/events/rpc` payload
pub fn decode(payload: &[u8]) -> Result<Decoded, DecodeError> {
    let message: HtMessage = serde_json::from_slice(payload)?;

    let method = message.method.unwrap_or_default();
    if method != NOTIFY_FULL_STATUS {
        return Ok(Decoded::Ignored { method });
    }

    let params = message.params.unwrap_or_default();
    Ok(Decoded::Reading(SensorReading {
        battery: params
            .power
            .as_ref()
            .and_then(DevicePower::percent)
            .or(message.battery),
        temperature: params
            .temperature
            .and_then(|temperature| temperature.celsius)
            .or(message.temp),
        humidity: params.humidity.and_then(|humidity| humidity.rh).or(message.hr),
        ..Default::default()
    }))
}
