//! Shelly HomeKit Bridge
//!
//! Subscribes to the MQTT topics of Shelly flood, smoke and H&T sensors and
//! mirrors their telemetry onto HomeKit-style accessories.
//!
//! # Overview
//!
//! - [`shelly`] decodes the payload formats of each device generation
//! - [`sensors`] reconciles decoded readings onto accessory characteristics
//! - [`accessory`] holds the accessory, service and characteristic model
//! - [`bridge`] routes topics to sensors and replays the payload cache
//! - [`transport`] wraps the MQTT connection
//! - [`server`] serves accessories, change events, health and control routes
//! - [`discovery`] advertises the bridge over mDNS
//!
//! # Quick Start
//!
//! ```rust
//! use shelly_homekit_bridge::accessory::{ChangeNotifier, Value};
//! use shelly_homekit_bridge::sensors::{FloodSensor, FloodTopics, Outcome, Sensor};
//!
//! let sensor = FloodSensor::new(2, 1, "244CAB42D00A", FloodTopics::Info, ChangeNotifier::new());
//! let outcome = sensor
//!     .handle(
//!         "shellies/shellyflood-244CAB42D00A/info",
//!         br#"{"flood":true,"tmp":{"value":21.5},"bat":{"value":90}}"#,
//!     )
//!     .unwrap();
//!
//! assert!(matches!(outcome, Outcome::Applied { .. }));
//! assert_eq!(sensor.leak().leak_detected.value(), Value::Int(1));
//! ```

pub mod accessory;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod observability;
pub mod sensors;
pub mod server;
pub mod shelly;
pub mod store;
pub mod testing;
pub mod transport;

pub use bridge::{Bridge, ReplaySummary};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, SensorError};
pub use transport::mqtt::MqttClient;
