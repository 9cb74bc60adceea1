//! Manual test endpoints forcing the leak and smoke state
//!
//! `/leak/<n>/<action>` and `/smoke/<n>/<action>` accept any HTTP method;
//! `n` is the 1-based position of the sensor in the configuration.

use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

use super::with_bridge;
use crate::bridge::Bridge;
use crate::error::SensorError;
use crate::observability::metrics::metrics;
use crate::sensors::Sensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Detected,
    Cleared,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Detected => "detected",
            ControlAction::Cleared => "cleared",
        }
    }

    fn is_detected(&self) -> bool {
        matches!(self, ControlAction::Detected)
    }
}

impl FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(ControlAction::Detected),
            "cleared" => Ok(ControlAction::Cleared),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

#[derive(Debug, Serialize)]
struct ControlResponse<'a> {
    name: &'a str,
    state: &'static str,
    changed: bool,
}

#[derive(Debug, Serialize)]
struct ControlError {
    error: String,
}

pub fn routes(
    bridge: Arc<Bridge>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let leak = warp::path!("leak" / usize / ControlAction)
        .and(with_bridge(bridge.clone()))
        .map(|n: usize, action: ControlAction, bridge: Arc<Bridge>| {
            match bridge.leak_sensor(n) {
                Some(sensor) => {
                    let result = sensor.force_leak(action.is_detected());
                    respond(sensor.as_ref(), action, result)
                }
                None => not_found("leak", n),
            }
        });

    let smoke = warp::path!("smoke" / usize / ControlAction)
        .and(with_bridge(bridge))
        .map(|n: usize, action: ControlAction, bridge: Arc<Bridge>| {
            match bridge.smoke_sensor(n) {
                Some(sensor) => {
                    let result = sensor.force_smoke(action.is_detected());
                    respond(sensor.as_ref(), action, result)
                }
                None => not_found("smoke", n),
            }
        });

    leak.or(smoke).unify()
}

fn respond(
    sensor: &dyn Sensor,
    action: ControlAction,
    result: Result<bool, SensorError>,
) -> WithStatus<Json> {
    metrics().control_command();
    match result {
        Ok(changed) => {
            info!(
                device_type = sensor.kind().as_str(),
                shelly = %sensor.serial(),
                state = action.as_str(),
                changed = changed,
                "state forced via control endpoint"
            );
            warp::reply::with_status(
                warp::reply::json(&ControlResponse {
                    name: sensor.name(),
                    state: action.as_str(),
                    changed,
                }),
                StatusCode::OK,
            )
        }
        Err(e) => {
            error!(shelly = %sensor.serial(), error = %e, "control command failed");
            warp::reply::with_status(
                warp::reply::json(&ControlError {
                    error: e.to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

fn not_found(family: &str, n: usize) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&ControlError {
            error: format!("no {family} sensor with index {n}"),
        }),
        StatusCode::NOT_FOUND,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!("detected".parse::<ControlAction>(), Ok(ControlAction::Detected));
        assert_eq!("cleared".parse::<ControlAction>(), Ok(ControlAction::Cleared));
        assert!("Detected".parse::<ControlAction>().is_err());
        assert!("toggle".parse::<ControlAction>().is_err());
    }
}
