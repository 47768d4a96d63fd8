//! Process-wide pipeline metrics.
//!
//! Everything here is a relaxed atomic; the janitor logs a snapshot on every
//! pass and `/api/health` exposes the queue gauges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bounds of the latency buckets, in milliseconds. The last bucket also
/// takes everything slower.
pub const LATENCY_BOUNDS_MS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1_000, 5_000, 10_000];

/// Monotonic count of occurrences.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Point-in-time level, never below zero.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn set(&self, level: u64) {
        self.value.store(level, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Bucketed latency distribution.
#[derive(Debug, Default)]
pub struct Histogram {
    hits: [AtomicU64; LATENCY_BOUNDS_MS.len()],
    total_ms: AtomicU64,
    observations: AtomicU64,
}

impl Histogram {
    pub fn observe(&self, ms: u64) {
        let slot = LATENCY_BOUNDS_MS
            .partition_point(|&bound| bound < ms)
            .min(LATENCY_BOUNDS_MS.len() - 1);
        self.hits[slot].fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.observations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observations(&self) -> u64 {
        self.observations.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.observations() {
            0 => 0.0,
            n => self.total_ms.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// Hits per bucket, paired with the bucket's upper bound.
    pub fn distribution(&self) -> Vec<(u64, u64)> {
        LATENCY_BOUNDS_MS
            .iter()
            .zip(&self.hits)
            .map(|(&bound, hits)| (bound, hits.load(Ordering::Relaxed)))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    // Accept path
    pub events_received: Counter,
    pub events_rejected: Counter,
    pub jobs_enqueued: Counter,
    pub enqueue_errors: Counter,

    // Workers
    pub jobs_claimed: Counter,
    pub jobs_completed: Counter,
    pub jobs_duplicate: Counter,
    pub jobs_retried: Counter,
    pub jobs_failed: Counter,
    pub jobs_reclaimed: Counter,

    // Reporting
    pub reports_served: Counter,
    pub reports_not_found: Counter,

    pub ingest_latency_ms: Histogram,
    pub write_latency_ms: Histogram,
    pub report_latency_ms: Histogram,

    pub jobs_in_flight: Gauge,
    pub queue_available: Gauge,
    pub queue_failed: Gauge,
}

/// Copy of the counters taken at `taken_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub events_received: u64,
    pub events_rejected: u64,
    pub jobs_enqueued: u64,
    pub enqueue_errors: u64,
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_duplicate: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub jobs_reclaimed: u64,
    pub reports_served: u64,
    pub reports_not_found: u64,
    pub ingest_latency_mean_ms: f64,
    pub write_latency_mean_ms: f64,
    pub report_latency_mean_ms: f64,
    pub jobs_in_flight: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            taken_at: Utc::now(),
            events_received: self.events_received.get(),
            events_rejected: self.events_rejected.get(),
            jobs_enqueued: self.jobs_enqueued.get(),
            enqueue_errors: self.enqueue_errors.get(),
            jobs_claimed: self.jobs_claimed.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_duplicate: self.jobs_duplicate.get(),
            jobs_retried: self.jobs_retried.get(),
            jobs_failed: self.jobs_failed.get(),
            jobs_reclaimed: self.jobs_reclaimed.get(),
            reports_served: self.reports_served.get(),
            reports_not_found: self.reports_not_found.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean_ms(),
            write_latency_mean_ms: self.write_latency_ms.mean_ms(),
            report_latency_mean_ms: self.report_latency_ms.mean_ms(),
            jobs_in_flight: self.jobs_in_flight.get(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

/// The process-wide registry.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
