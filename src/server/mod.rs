//! HTTP accessory server
//!
//! Serves the accessory database and characteristic values as JSON, streams
//! accepted changes as server-sent events, and carries the health endpoints
//! and manual control routes.

pub mod accessories;
pub mod control;
pub mod health;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::bridge::Bridge;
use crate::error::BridgeError;

pub use accessories::{STATUS_RESOURCE_DOES_NOT_EXIST, STATUS_WRITE_ONLY};
pub use control::ControlAction;

/// HTTP server exposing the bridge accessories
#[derive(Clone)]
pub struct AccessoryServer {
    bridge: Arc<Bridge>,
    mqtt_connected: Arc<AtomicBool>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl AccessoryServer {
    pub fn new(bridge: Arc<Bridge>, mqtt_connected: Arc<AtomicBool>) -> Self {
        Self {
            bridge,
            mqtt_connected,
        }
    }

    /// All routes with CORS and JSON error replies
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static
    {
        accessories::routes(self.bridge.clone())
            .or(control::routes(self.bridge.clone()))
            .or(health::routes(self.bridge.clone(), self.mqtt_connected.clone()))
            .with(warp::cors().allow_any_origin())
            .recover(handle_rejection)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<S>(self, addr: SocketAddr, shutdown: S) -> Result<(), BridgeError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| BridgeError::internal(format!("failed to bind {addr}: {e}")))?;

        info!(addr = %bound, "accessory server listening");
        server.await;
        info!("accessory server stopped");
        Ok(())
    }
}

pub(crate) fn with_bridge(
    bridge: Arc<Bridge>,
) -> impl Filter<Extract = (Arc<Bridge>,), Error = Infallible> + Clone {
    warp::any().map(move || bridge.clone())
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<warp::filters::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unhandled rejection: {rejection:?}"),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { error: message }),
        code,
    ))
}
