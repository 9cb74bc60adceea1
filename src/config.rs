//! Bridge configuration
//!
//! Configuration comes from environment variables (the usual container
//! deployment) or from a TOML file passed with `--config`. Both produce the
//! same [`BridgeConfig`].

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main bridge configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub devices: DevicesSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker host name or address
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    /// Broker TCP port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Seconds to wait for the first ConnAck before giving up
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "homekit_shelly".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username_env: None,
            password_env: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Serial numbers of the sensors to expose, per device family
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevicesSection {
    /// Shelly Flood (gen1) publishing the `info` document
    #[serde(default)]
    pub floods: Vec<String>,
    /// Shelly Flood (gen1) publishing one topic per field
    #[serde(default)]
    pub legacy_floods: Vec<String>,
    /// Shelly Plus Smoke
    #[serde(default)]
    pub smokes: Vec<String>,
    /// Shelly Plus H&T
    #[serde(default)]
    pub hts: Vec<String>,
}

impl DevicesSection {
    pub fn is_empty(&self) -> bool {
        self.floods.is_empty()
            && self.legacy_floods.is_empty()
            && self.smokes.is_empty()
            && self.hts.is_empty()
    }

    fn all_serials(&self) -> impl Iterator<Item = &String> {
        self.floods
            .iter()
            .chain(&self.legacy_floods)
            .chain(&self.smokes)
            .chain(&self.hts)
    }
}

/// Accessory server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Address the accessory HTTP server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Advertise the bridge over mDNS
    #[serde(default = "default_mdns")]
    pub mdns: bool,
    /// Display name of the bridge accessory
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_mdns() -> bool {
    true
}

fn default_bridge_name() -> String {
    "Shelly Bridge".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            mdns: default_mdns(),
            bridge_name: default_bridge_name(),
        }
    }
}

/// Payload cache location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvValue { name: String, value: String },
    #[error("Invalid serial number: {0}")]
    InvalidSerial(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// Recognised variables: `MQTT_HOST`, `MQTT_PORT`, `MQTT_CLIENT_ID`,
    /// `MQTT_USERNAME_ENV`, `MQTT_PASSWORD_ENV`, `FLOODS`, `LEGACY_FLOODS`,
    /// `SMOKES`, `HTS`, `HTTP_ADDR`, `MDNS`, `BRIDGE_NAME`, `DB_PATH`.
    /// Unset variables fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BridgeConfig::default();

        if let Some(host) = lookup("MQTT_HOST") {
            config.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            config.mqtt.port = parse_env("MQTT_PORT", &port)?;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        config.mqtt.username_env = lookup("MQTT_USERNAME_ENV");
        config.mqtt.password_env = lookup("MQTT_PASSWORD_ENV");

        config.devices.floods = lookup("FLOODS").map(|v| parse_list(&v)).unwrap_or_default();
        config.devices.legacy_floods = lookup("LEGACY_FLOODS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();
        config.devices.smokes = lookup("SMOKES").map(|v| parse_list(&v)).unwrap_or_default();
        config.devices.hts = lookup("HTS").map(|v| parse_list(&v)).unwrap_or_default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            config.server.listen_addr = parse_env("HTTP_ADDR", &addr)?;
        }
        if let Some(mdns) = lookup("MDNS") {
            config.server.mdns = parse_bool("MDNS", &mdns)?;
        }
        if let Some(name) = lookup("BRIDGE_NAME") {
            config.server.bridge_name = name;
        }
        if let Some(path) = lookup("DB_PATH") {
            config.store.path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate serial numbers and required fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.host must not be empty".to_string(),
            ));
        }
        if self.server.bridge_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "server.bridge_name must not be empty".to_string(),
            ));
        }
        for serial in self.devices.all_serials() {
            validate_serial(serial)?;
        }
        Ok(())
    }
}

/// Split a comma separated list, dropping blanks
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Serials end up inside MQTT topics and cache file names
fn validate_serial(serial: &str) -> Result<(), ConfigError> {
    if serial.is_empty() || !serial.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidSerial(format!(
            "'{serial}' must match [a-zA-Z0-9]+"
        )));
    }
    Ok(())
}
