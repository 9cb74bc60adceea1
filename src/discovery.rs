//! mDNS advertisement of the accessory server
//!
//! The bridge announces itself as a `_hap._tcp` service. The device id in the
//! TXT record is generated once and persisted in the store so controllers
//! recognise the bridge across restarts.

use std::collections::HashMap;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{debug, info, warn};

use crate::accessory::Category;
use crate::error::BridgeError;
use crate::store::Store;

/// mDNS service type for HomeKit accessory servers
pub const SERVICE_TYPE: &str = "_hap._tcp.local.";

/// Store key of the persisted device id
pub const DEVICE_ID_KEY: &str = "device-id";

/// Load the device id from the store, generating and saving one if missing
pub async fn device_id(store: &dyn Store) -> Result<String, BridgeError> {
    if let Some(bytes) = store.get(DEVICE_ID_KEY).await? {
        let id = String::from_utf8_lossy(&bytes).trim().to_string();
        if is_device_id(&id) {
            return Ok(id);
        }
        warn!(device_id = %id, "stored device id is malformed, generating a new one");
    }

    let id = generate_device_id();
    store.set(DEVICE_ID_KEY, id.as_bytes()).await?;
    info!(device_id = %id, "generated bridge device id");
    Ok(id)
}

/// Six colon separated upper-case hex octets
fn is_device_id(id: &str) -> bool {
    let octets: Vec<&str> = id.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

fn generate_device_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    // RandomState is seeded per process
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_i64(chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
    let bits = hasher.finish();
    (0..6)
        .map(|i| format!("{:02X}", (bits >> (i * 8)) & 0xff))
        .collect::<Vec<_>>()
        .join(":")
}

/// TXT record advertised for the bridge
pub fn txt_record(device_id: &str, name: &str, config_number: u32) -> HashMap<String, String> {
    [
        ("c#", config_number.to_string()),
        ("ff", "0".to_string()),
        ("id", device_id.to_string()),
        ("md", name.to_string()),
        ("pv", "1.1".to_string()),
        ("s#", "1".to_string()),
        ("sf", "1".to_string()),
        ("ci", Category::Bridge.code().to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

/// Host label derived from the bridge name
fn host_name(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}.local.", label.trim_matches('-').to_lowercase())
}

/// Advertise the accessory server via mDNS
pub struct ServiceAdvertiser {
    mdns: ServiceDaemon,
    fullname: Option<String>,
}

impl ServiceAdvertiser {
    pub fn new() -> Result<Self, BridgeError> {
        let mdns = ServiceDaemon::new().map_err(|e| BridgeError::discovery(e.to_string()))?;
        Ok(Self {
            mdns,
            fullname: None,
        })
    }

    /// Register the service; addresses are filled in by the daemon
    pub fn register(&mut self, name: &str, port: u16, device_id: &str) -> Result<(), BridgeError> {
        let properties = txt_record(device_id, name, 1);
        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            name,
            &host_name(name),
            "",
            port,
            properties,
        )
        .map_err(|e| BridgeError::discovery(e.to_string()))?
        .enable_addr_auto();

        let fullname = service_info.get_fullname().to_string();
        self.mdns
            .register(service_info)
            .map_err(|e| BridgeError::discovery(e.to_string()))?;

        info!(service = %fullname, port = port, device_id = %device_id, "advertising bridge via mDNS");
        self.fullname = Some(fullname);
        Ok(())
    }

    /// Stop advertising
    pub fn unregister(&mut self) -> Result<(), BridgeError> {
        if let Some(fullname) = self.fullname.take() {
            self.mdns
                .unregister(&fullname)
                .map_err(|e| BridgeError::discovery(e.to_string()))?;
            debug!(service = %fullname, "mDNS service unregistered");
        }
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.fullname.is_some()
    }
}

impl Drop for ServiceAdvertiser {
    fn drop(&mut self) {
        let _ = self.unregister();
        let _ = self.mdns.shutdown();
    }
}
