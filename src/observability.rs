//! Logging setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Each line carries its module path, which names the emitting component.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    deliveries_received: AtomicU64,
    deliveries_acked: AtomicU64,
    deliveries_rejected: AtomicU64,
    events_published: AtomicU64,
    reconnects: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivery_received(&self) {
        self.deliveries_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "deliveries_received", "Metric incremented");
    }

    pub fn delivery_acked(&self) {
        self.deliveries_acked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "deliveries_acked", "Metric incremented");
    }

    pub fn delivery_rejected(&self) {
        self.deliveries_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "deliveries_rejected", "Metric incremented");
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "events_published", "Metric incremented");
    }

    pub fn reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "reconnects", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            deliveries_received: self.deliveries_received.load(Ordering::Relaxed),
            deliveries_acked: self.deliveries_acked.load(Ordering::Relaxed),
            deliveries_rejected: self.deliveries_rejected.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub deliveries_received: u64,
    pub deliveries_acked: u64,
    pub deliveries_rejected: u64,
    pub events_published: u64,
    pub reconnects: u64,
}
