//! Observability: structured logging and bridge metrics
//!
//! The HTTP side (health probes and the metrics export) lives in
//! [`crate::server::health`].

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

pub use logging::{lifecycle_span, message_span};
