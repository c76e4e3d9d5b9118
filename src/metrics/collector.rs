//! Metrics Collector

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use prometheus::{Gauge, Histogram, IntCounter, Registry, TextEncoder};
use serde::Serialize;
use tracing::error;

use crate::dispatch::DispatchOutcome;

/// Point-in-time view of the relay counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub online_users: u64,
    pub identify_events: u64,
    pub replaced_identities: u64,
    pub messages_delivered: u64,
    pub messages_offline: u64,
    pub messages_dropped: u64,
    pub messages_rejected: u64,
    pub malformed_frames: u64,
}

/// Collects and exports metrics
pub struct Metrics {
    prometheus_registry: Registry,

    // Prometheus metrics
    connections_total: IntCounter,
    active_connections: Gauge,
    online_users: Gauge,
    identify_total: IntCounter,
    replaced_identities_total: IntCounter,
    messages_delivered_total: IntCounter,
    messages_offline_total: IntCounter,
    messages_dropped_total: IntCounter,
    messages_rejected_total: IntCounter,
    malformed_frames_total: IntCounter,
    connection_duration: Histogram,

    // Internal counters
    active: AtomicU64,
    online: AtomicU64,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("Failed to create counter");
    registry.register(Box::new(counter.clone())).expect("Failed to register counter");
    counter
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).expect("Failed to create gauge");
    registry.register(Box::new(gauge.clone())).expect("Failed to register gauge");
    gauge
}

impl Metrics {
    /// Create a new metrics collector with its own Prometheus registry
    pub fn new() -> Self {
        let registry = Registry::new();

        let connections_total = counter(
            &registry,
            "chatrelay_connections_total",
            "Total number of WebSocket connections accepted",
        );
        let active_connections = gauge(
            &registry,
            "chatrelay_active_connections",
            "Number of currently open WebSocket connections",
        );
        let online_users = gauge(
            &registry,
            "chatrelay_online_users",
            "Number of identities with a live connection",
        );
        let identify_total = counter(
            &registry,
            "chatrelay_identify_total",
            "Total identify events processed",
        );
        let replaced_identities_total = counter(
            &registry,
            "chatrelay_replaced_identities_total",
            "Identify events that moved an identity off another connection",
        );
        let messages_delivered_total = counter(
            &registry,
            "chatrelay_messages_delivered_total",
            "Messages queued on the recipient's connection",
        );
        let messages_offline_total = counter(
            &registry,
            "chatrelay_messages_offline_total",
            "Messages dropped because the recipient was offline",
        );
        let messages_dropped_total = counter(
            &registry,
            "chatrelay_messages_dropped_total",
            "Messages dropped because the recipient's queue was full",
        );
        let messages_rejected_total = counter(
            &registry,
            "chatrelay_messages_rejected_total",
            "Messages refused because of the sender's connection state",
        );
        let malformed_frames_total = counter(
            &registry,
            "chatrelay_malformed_frames_total",
            "Inbound frames that could not be decoded",
        );

        let connection_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "chatrelay_connection_duration_seconds",
                "Lifetime of WebSocket connections in seconds",
            ).buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0, 86400.0])
        ).expect("Failed to create connection_duration histogram");
        registry.register(Box::new(connection_duration.clone()))
            .expect("Failed to register connection_duration");

        Self {
            prometheus_registry: registry,
            connections_total,
            active_connections,
            online_users,
            identify_total,
            replaced_identities_total,
            messages_delivered_total,
            messages_offline_total,
            messages_dropped_total,
            messages_rejected_total,
            malformed_frames_total,
            connection_duration,
            active: AtomicU64::new(0),
            online: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.inc();
        self.active_connections.inc();
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self, lifetime: Duration) {
        self.active_connections.dec();
        let _ = self.active.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.connection_duration.observe(lifetime.as_secs_f64());
    }

    pub fn identified(&self, replaced: bool) {
        self.identify_total.inc();
        if replaced {
            self.replaced_identities_total.inc();
        }
    }

    /// Refreshed from the presence registry whenever metrics are read
    pub fn set_online_users(&self, count: usize) {
        self.online_users.set(count as f64);
        self.online.store(count as u64, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered { .. } => self.messages_delivered_total.inc(),
            DispatchOutcome::RecipientOffline => self.messages_offline_total.inc(),
            DispatchOutcome::QueueFull => self.messages_dropped_total.inc(),
            DispatchOutcome::Rejected { .. } => self.messages_rejected_total.inc(),
        }
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames_total.inc();
    }

    pub fn get_active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn get_total_connections(&self) -> u64 {
        self.connections_total.get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.connections_total.get(),
            active_connections: self.active.load(Ordering::Relaxed),
            online_users: self.online.load(Ordering::Relaxed),
            identify_events: self.identify_total.get(),
            replaced_identities: self.replaced_identities_total.get(),
            messages_delivered: self.messages_delivered_total.get(),
            messages_offline: self.messages_offline_total.get(),
            messages_dropped: self.messages_dropped_total.get(),
            messages_rejected: self.messages_rejected_total.get(),
            malformed_frames: self.malformed_frames_total.get(),
        }
    }

    /// Export metrics in Prometheus text format
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
