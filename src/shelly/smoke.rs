//! Shelly Plus Smoke

use serde::Deserialize;

use super::rpc::{DevicePower, RpcEnvelope};
use super::{DecodeError, Decoded, SensorReading};

#[derive(Debug, Default, Deserialize)]
struct SmokeParams {
    #[serde(rename = "devicepower:0", default)]
    power: Option<DevicePower>,
    #[serde(rename = "smoke:0", default)]
    smoke: Option<SmokeStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct SmokeStatus {
    #[serde(default)]
    alarm: Option<bool>,
    #[serde(default)]
    mute: Option<bool>,
}

/// Decode an `shellyplussmoke-<serial>/events` payload
pub fn decode(payload: &[u8]) -> Result<Decoded, DecodeError> {
    let envelope: RpcEnvelope<SmokeParams> = serde_json::from_slice(payload)?;
    if !envelope.is_full_status() {
        return Ok(Decoded::Ignored {
            method: envelope.method_name(),
        });
    }

    let params = envelope.params.unwrap_or_default();
    let (smoke, smoke_muted) = params
        .smoke
        .map(|status| (status.alarm, status.mute))
        .unwrap_or_default();

    Ok(Decoded::Reading(SensorReading {
        battery: params.power.as_ref().and_then(DevicePower::percent),
        smoke,
        smoke_muted,
        ..Default::default()
    }))
}
