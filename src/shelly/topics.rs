//! MQTT topics published by Shelly devices

use super::flood::FloodField;

/// Builds the topics a device publishes on
///
/// First generation devices keep the serial as configured; Plus devices use
/// the lower-cased serial in their topic prefix.
pub struct TopicBuilder;

impl TopicBuilder {
    /// `shellies/shellyflood-{serial}/info`
    pub fn flood_info(serial: &str) -> String {
        format!("shellies/shellyflood-{serial}/info")
    }

    /// `shellies/shellyflood-{serial}/sensor/{field}`
    pub fn flood_field(serial: &str, field: FloodField) -> String {
        format!("shellies/shellyflood-{serial}/sensor/{}", field.suffix())
    }

    /// `shellyplusht-{serial}/events/rpc`
    pub fn ht_events(serial: &str) -> String {
        format!("shellyplusht-{}/events/rpc", serial.to_lowercase())
    }

    /// `shellyplussmoke-{serial}/events`
    pub fn smoke_events(serial: &str) -> String {
        format!("shellyplussmoke-{}/events", serial.to_lowercase())
    }
}

/// Store key for the last payload of a topic
pub fn cache_key(topic: &str) -> String {
    topic.replace('/', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flood_topics_keep_serial_case() {
        assert_eq!(
            TopicBuilder::flood_info("244CAB42D00A"),
            "shellies/shellyflood-244CAB42D00A/info"
        );
        assert_eq!(
            TopicBuilder::flood_field("244CAB42D00A", FloodField::ActReasons),
            "shellies/shellyflood-244CAB42D00A/sensor/act_reasons"
        );
    }

    #[test]
    fn test_plus_topics_lowercase_serial() {
        assert_eq!(
            TopicBuilder::smoke_events("80646FD09ED4"),
            "shellyplussmoke-80646fd09ed4/events"
        );
        assert_eq!(
            TopicBuilder::ht_events("08B61FCF0A1C"),
            "shellyplusht-08b61fcf0a1c/events/rpc"
        );
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(
            cache_key("shellies/shellyflood-244CAB42D00A/info"),
            "shellies-shellyflood-244CAB42D00A-info"
        );
        assert_eq!(cache_key("no-slashes"), "no-slashes");
    }
}
