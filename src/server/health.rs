//! Health, readiness, liveness and metrics endpoints
//!
//! Provides HTTP endpoints for monitoring the bridge, supporting both human
//! operators and container orchestration platforms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use warp::http::StatusCode;
use warp::Filter;

use super::with_bridge;
use crate::bridge::Bridge;
use crate::observability::metrics::{current_timestamp, metrics};

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

impl HealthCheck {
    fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.into()),
            last_check: current_timestamp(),
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
            last_check: current_timestamp(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    bridge: String,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: HashMap<String, String>,
}

pub fn routes(
    bridge: Arc<Bridge>,
    mqtt_connected: Arc<AtomicBool>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let health_connected = mqtt_connected.clone();
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_bridge(bridge))
        .map(move |bridge: Arc<Bridge>| {
            let status = health_status(&bridge, health_connected.load(Ordering::Relaxed));
            let code = if status.status == "healthy" {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            warp::reply::with_status(warp::reply::json(&status), code)
        });

    // GET /metrics - complete metrics export
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()));

    // GET /ready - Kubernetes readiness probe
    let ready_route = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let ready = mqtt_connected.load(Ordering::Relaxed);
            let response = ReadinessResponse {
                ready,
                timestamp: current_timestamp(),
            };
            let code = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            warp::reply::with_status(warp::reply::json(&response), code)
        });

    // GET /live - Kubernetes liveness probe
    let live_route = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            })
        });

    // GET / - API documentation
    let root_route = warp::path::end().and(warp::get()).map(|| {
        let endpoints = [
            ("/accessories", "Accessory database"),
            ("/characteristics?id=<aid>.<iid>", "Characteristic values"),
            ("/events", "Server-sent characteristic changes"),
            ("/health", "Overall health status with detailed checks"),
            ("/metrics", "Message, cache and MQTT statistics"),
            ("/ready", "Readiness probe for Kubernetes"),
            ("/live", "Liveness probe for Kubernetes"),
            ("/leak/<n>/{detected,cleared}", "Force a leak sensor state"),
            ("/smoke/<n>/{detected,cleared}", "Force a smoke sensor state"),
        ]
        .into_iter()
        .map(|(path, description)| (path.to_string(), description.to_string()))
        .collect();
        warp::reply::json(&ApiDocumentationResponse { endpoints })
    });

    health_route
        .or(metrics_route)
        .or(ready_route)
        .or(live_route)
        .or(root_route)
}

fn health_status(bridge: &Bridge, mqtt_connected: bool) -> HealthStatus {
    let mut checks = HashMap::new();

    let mqtt_check = if mqtt_connected {
        HealthCheck::healthy("MQTT connection established")
    } else {
        HealthCheck::unhealthy("MQTT connection failed or disconnected")
    };
    checks.insert("mqtt".to_string(), mqtt_check);

    let count = bridge.sensor_count();
    let sensors_check = if count > 0 {
        HealthCheck::healthy(format!("{count} sensor accessories configured"))
    } else {
        HealthCheck::unhealthy("No sensors configured")
    };
    checks.insert("sensors".to_string(), sensors_check);

    let overall_healthy = checks.values().all(|check| check.status == "healthy");
    let snapshot = metrics().get_metrics();

    HealthStatus {
        status: if overall_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: snapshot.timestamp,
        bridge: bridge.bridge_accessory().info().name.clone(),
        uptime_seconds: snapshot.uptime_seconds,
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::ChangeNotifier;
    use crate::config::BridgeConfig;
    use crate::store::MemoryStore;

    fn bridge(smokes: &[&str]) -> Bridge {
        let mut config = BridgeConfig::default();
        config.devices.smokes = smokes.iter().map(|s| s.to_string()).collect();
        Bridge::from_config(&config, Arc::new(MemoryStore::new()), ChangeNotifier::new())
    }

    #[test]
    fn test_health_status_follows_connection() {
        let bridge = bridge(&["80646fd09ed4"]);

        let status = health_status(&bridge, true);
        assert_eq!(status.status, "healthy");
        assert_eq!(status.bridge, "Shelly Bridge");

        let status = health_status(&bridge, false);
        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["mqtt"].status, "unhealthy");
    }

    #[test]
    fn test_bridge_without_sensors_is_degraded() {
        let status = health_status(&bridge(&[]), true);
        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["sensors"].status, "unhealthy");
    }
}
