//! Thread-safe metrics collection system
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! message handling, characteristic updates, the payload cache and the MQTT
//! connection.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

const MAX_HANDLING_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Message handling
    messages_received: AtomicU64,
    messages_ignored: AtomicU64,
    empty_payloads: AtomicU64,
    decode_failures: AtomicU64,
    characteristics_updated: AtomicU64,
    update_failures: AtomicU64,
    control_commands: AtomicU64,

    // Payload cache
    cache_writes: AtomicU64,
    cache_write_failures: AtomicU64,
    cache_replays: AtomicU64,
    cache_misses: AtomicU64,

    // MQTT
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connection_start_time: AtomicU64,

    // Handling times in microseconds
    handling_times: Mutex<Vec<u64>>,

    // Per device statistics keyed by serial
    device_stats: Mutex<HashMap<String, DeviceStats>>,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            empty_payloads: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            characteristics_updated: AtomicU64::new(0),
            update_failures: AtomicU64::new(0),
            control_commands: AtomicU64::new(0),
            cache_writes: AtomicU64::new(0),
            cache_write_failures: AtomicU64::new(0),
            cache_replays: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            handling_times: Mutex::new(Vec::new()),
            device_stats: Mutex::new(HashMap::new()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Message handling metrics
    pub fn message_received(&self, serial: &str) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.with_device(serial, |stats| {
            stats.messages += 1;
            stats.last_message = current_timestamp();
        });
    }

    pub fn message_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn empty_payload(&self) {
        self.empty_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self, serial: &str) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        self.with_device(serial, |stats| stats.failures += 1);
    }

    pub fn characteristics_updated(&self, serial: &str, count: u64) {
        if count == 0 {
            return;
        }
        self.characteristics_updated
            .fetch_add(count, Ordering::Relaxed);
        self.with_device(serial, |stats| stats.updates += count);
    }

    pub fn update_failed(&self, serial: &str) {
        self.update_failures.fetch_add(1, Ordering::Relaxed);
        self.with_device(serial, |stats| stats.failures += 1);
    }

    pub fn control_command(&self) {
        self.control_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handling_time(&self, duration: Duration) {
        if let Ok(mut times) = self.handling_times.lock() {
            times.push(duration.as_micros() as u64);

            if times.len() > MAX_HANDLING_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Cache metrics
    pub fn cache_written(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_write_failed(&self) {
        self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_replayed(&self) {
        self.cache_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_missed(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    // MQTT metrics
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn is_mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::Relaxed)
    }

    fn with_device(&self, serial: &str, update: impl FnOnce(&mut DeviceStats)) {
        if let Ok(mut stats) = self.device_stats.lock() {
            let entry = stats.entry(serial.to_string()).or_default();
            update(entry);
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.messages_ignored,
            &self.empty_payloads,
            &self.decode_failures,
            &self.characteristics_updated,
            &self.update_failures,
            &self.control_commands,
            &self.cache_writes,
            &self.cache_write_failures,
            &self.cache_replays,
            &self.cache_misses,
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.connection_start_time,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.handling_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.device_stats.lock() {
            stats.clear();
        }
    }

    /// Average, p50 and p95 handling time in microseconds
    fn handling_time_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.handling_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();
        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
        )
    }

    fn connection_duration(&self, now: u64) -> u64 {
        let start = self.connection_start_time.load(Ordering::Relaxed);
        if start > 0 && self.mqtt_connected.load(Ordering::Relaxed) {
            now.saturating_sub(start)
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95) = self.handling_time_statistics();
        let devices = self
            .device_stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default();

        MetricsSnapshot {
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                ignored: self.messages_ignored.load(Ordering::Relaxed),
                empty: self.empty_payloads.load(Ordering::Relaxed),
                decode_failures: self.decode_failures.load(Ordering::Relaxed),
                characteristics_updated: self.characteristics_updated.load(Ordering::Relaxed),
                update_failures: self.update_failures.load(Ordering::Relaxed),
                control_commands: self.control_commands.load(Ordering::Relaxed),
                avg_handling_time_us: avg,
                handling_time_p50_us: p50,
                handling_time_p95_us: p95,
            },
            cache: CacheMetrics {
                writes: self.cache_writes.load(Ordering::Relaxed),
                write_failures: self.cache_write_failures.load(Ordering::Relaxed),
                replays: self.cache_replays.load(Ordering::Relaxed),
                misses: self.cache_misses.load(Ordering::Relaxed),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.connection_duration(now),
            },
            devices,
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceStats {
    pub messages: u64,
    pub updates: u64,
    pub failures: u64,
    pub last_message: u64,
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub messages: MessageMetrics,
    pub cache: CacheMetrics,
    pub mqtt: MqttMetrics,
    pub devices: HashMap<String, DeviceStats>,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub ignored: u64,
    pub empty: u64,
    pub decode_failures: u64,
    pub characteristics_updated: u64,
    pub update_failures: u64,
    pub control_commands: u64,
    pub avg_handling_time_us: f64,
    pub handling_time_p50_us: f64,
    pub handling_time_p95_us: f64,
}

#[derive(Debug, Serialize)]
pub struct CacheMetrics {
    pub writes: u64,
    pub write_failures: u64,
    pub replays: u64,
    pub misses: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connection_duration_seconds: u64,
}

// Helper functions
pub(crate) fn current_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_value = sorted_data[index.floor() as usize] as f64;
        let upper_value = sorted_data[index.ceil() as usize] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_message_metrics() {
        let collector = MetricsCollector::new();

        collector.message_received("244CAB42D00A");
        collector.message_received("244CAB42D00A");
        collector.decode_failed("244CAB42D00A");
        collector.characteristics_updated("244CAB42D00A", 3);
        collector.characteristics_updated("244CAB42D00A", 0);
        collector.message_ignored();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.messages.received, 2);
        assert_eq!(metrics.messages.decode_failures, 1);
        assert_eq!(metrics.messages.characteristics_updated, 3);
        assert_eq!(metrics.messages.ignored, 1);

        let device = metrics.devices.get("244CAB42D00A").unwrap();
        assert_eq!(device.messages, 2);
        assert_eq!(device.updates, 3);
        assert_eq!(device.failures, 1);
        assert!(device.last_message > 0);
    }

    #[test]
    fn test_mqtt_metrics() {
        let collector = MetricsCollector::new();

        collector.mqtt_connection_attempt();
        collector.mqtt_connection_established();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.mqtt.connection_attempts, 1);
        assert_eq!(metrics.mqtt.connections_established, 1);
        assert!(metrics.mqtt.connected);

        collector.mqtt_connection_lost();
        assert!(!collector.is_mqtt_connected());
    }

    #[test]
    fn test_cache_metrics() {
        let collector = MetricsCollector::new();
        collector.cache_written();
        collector.cache_write_failed();
        collector.cache_replayed();
        collector.cache_missed();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.cache.writes, 1);
        assert_eq!(metrics.cache.write_failures, 1);
        assert_eq!(metrics.cache.replays, 1);
        assert_eq!(metrics.cache.misses, 1);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.message_received(&format!("device-{}", i % 2));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.messages.received, 1000);
        assert_eq!(metrics.devices.len(), 2);
        assert_eq!(metrics.devices["device-0"].messages, 500);
    }

    #[test]
    fn test_handling_time_bounds() {
        let collector = MetricsCollector::new();

        for i in 0..1500 {
            collector.record_handling_time(Duration::from_micros(i));
        }

        assert_eq!(
            collector.handling_times.lock().unwrap().len(),
            MAX_HANDLING_SAMPLES
        );
        let metrics = collector.get_metrics();
        assert!(metrics.messages.avg_handling_time_us > 500.0);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        let p50 = percentile(&data, 50.0);
        let p95 = percentile(&data, 95.0);

        assert!((p50 - 5.5).abs() < 0.1, "P50: expected ~5.5, got {p50}");
        assert!((p95 - 9.5).abs() < 0.1, "P95: expected ~9.5, got {p95}");
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.message_received("abc");
        collector.mqtt_connection_established();

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.messages.received, 0);
        assert!(!metrics.mqtt.connected);
        assert!(metrics.devices.is_empty());
    }
}
