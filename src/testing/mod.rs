//! Testing utilities and mock implementations
//!
//! Mocks for exercising the bridge without an MQTT broker or a writable
//! cache directory.

pub mod mocks;

pub use mocks::*;
