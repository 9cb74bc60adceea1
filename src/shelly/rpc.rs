//! Envelope used by Plus-generation devices for RPC notifications
//!
//! ```json
//! {"src":"shellyplussmoke-80646fd09ed4","dst":"shellyplussmoke-80646fd09ed4/events",
//!  "method":"NotifyFullStatus","params":{"devicepower:0":{"battery":{"V":2.99,"percent":97}}}}
//! ```

use serde::Deserialize;

/// Method carrying a complete state snapshot
pub const NOTIFY_FULL_STATUS: &str = "NotifyFullStatus";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcEnvelope<P> {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub dst: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default = "Option::default")]
    pub params: Option<P>,
}

impl<P> RpcEnvelope<P> {
    /// Whether the message is a full status snapshot
    pub fn is_full_status(&self) -> bool {
        self.method.as_deref() == Some(NOTIFY_FULL_STATUS)
    }

    pub fn method_name(&self) -> String {
        self.method.clone().unwrap_or_default()
    }
}

/// `devicepower:<n>` component
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicePower {
    #[serde(default)]
    pub battery: Option<BatteryStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatteryStatus {
    #[serde(rename = "V", default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub percent: Option<i64>,
}

impl DevicePower {
    pub fn percent(&self) -> Option<i64> {
        self.battery.as_ref().and_then(|battery| battery.percent)
    }
}

/// `temperature:<n>` component
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemperatureStatus {
    #[serde(rename = "tC", default)]
    pub celsius: Option<f64>,
}

/// `humidity:<n>` component
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HumidityStatus {
    #[serde(default)]
    pub rh: Option<f64>,
}
