//! Metrics Module
//!
//! Prometheus counters for connections and broadcasts.

pub mod collector;

pub use collector::RelayMetrics;
