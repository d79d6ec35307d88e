//! Metrics Collector

use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use tracing::error;

use crate::Result;

/// Prometheus counters for the relay
pub struct RelayMetrics {
    prometheus_registry: Registry,

    connections_total: IntCounter,
    active_connections: IntGauge,
    messages_received_total: IntCounter,
    deliveries_total: IntCounter,
    delivery_failures_total: IntCounter,
    replaced_connections_total: IntCounter,
}

impl RelayMetrics {
    /// Create a collector with every metric registered
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let connections_total = IntCounter::new(
            "relay_connections_total",
            "Total number of relay connections opened",
        )?;
        let active_connections = IntGauge::new(
            "relay_active_connections",
            "Number of currently open relay connections",
        )?;
        let messages_received_total = IntCounter::new(
            "relay_messages_received_total",
            "Total messages received from clients",
        )?;
        let deliveries_total = IntCounter::new(
            "relay_deliveries_total",
            "Total messages queued to recipients",
        )?;
        let delivery_failures_total = IntCounter::new(
            "relay_delivery_failures_total",
            "Total recipient sends that failed and were skipped",
        )?;
        let replaced_connections_total = IntCounter::new(
            "relay_replaced_connections_total",
            "Total registrations that overwrote an existing connection id",
        )?;

        prometheus_registry.register(Box::new(connections_total.clone()))?;
        prometheus_registry.register(Box::new(active_connections.clone()))?;
        prometheus_registry.register(Box::new(messages_received_total.clone()))?;
        prometheus_registry.register(Box::new(deliveries_total.clone()))?;
        prometheus_registry.register(Box::new(delivery_failures_total.clone()))?;
        prometheus_registry.register(Box::new(replaced_connections_total.clone()))?;

        Ok(Self {
            prometheus_registry,
            connections_total,
            active_connections,
            messages_received_total,
            deliveries_total,
            delivery_failures_total,
            replaced_connections_total,
        })
    }

    pub fn connection_opened(&self, replaced: bool) {
        self.connections_total.inc();
        if replaced {
            self.replaced_connections_total.inc();
        } else {
            self.active_connections.inc();
        }
    }

    pub fn connection_closed(&self) {
        self.active_connections.dec();
    }

    pub fn message_received(&self) {
        self.messages_received_total.inc();
    }

    pub fn record_broadcast(&self, delivered: usize, failed: usize) {
        self.deliveries_total.inc_by(delivered as u64);
        self.delivery_failures_total.inc_by(failed as u64);
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.get()
    }

    pub fn total_connections(&self) -> u64 {
        self.connections_total.get()
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.get()
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries_total.get()
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures_total.get()
    }

    pub fn replaced_connections(&self) -> u64 {
        self.replaced_connections_total.get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = RelayMetrics::new().unwrap();

        metrics.connection_opened(false);
        metrics.connection_opened(false);
        metrics.connection_opened(true);
        assert_eq!(metrics.total_connections(), 3);
        assert_eq!(metrics.active_connections(), 2);
        assert_eq!(metrics.replaced_connections(), 1);

        metrics.connection_closed();
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn test_broadcast_counters() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.message_received();
        metrics.record_broadcast(2, 1);
        metrics.record_broadcast(3, 0);

        assert_eq!(metrics.messages_received(), 1);
        assert_eq!(metrics.deliveries(), 5);
        assert_eq!(metrics.delivery_failures(), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.connection_opened(false);

        let output = metrics.export_prometheus();
        assert!(output.contains("relay_connections_total 1"));
        assert!(output.contains("relay_active_connections 1"));
        assert!(output.contains("relay_delivery_failures_total 0"));
    }
}
