use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for the aggregator's apply/dispatch path
#[derive(Default)]
pub struct AggregatorMetrics {
    updates_applied: AtomicU64,
    updates_rejected: AtomicU64,
    dispatches: AtomicU64,
    abandoned_cycles: AtomicU64,
    invocation_errors: AtomicU64,
    total_dispatch_us: AtomicU64,
    dispatch_samples: AtomicU64,
}

impl AggregatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates_applied(&self) -> u64 {
        self.updates_applied.load(Ordering::Relaxed)
    }

    pub fn updates_rejected(&self) -> u64 {
        self.updates_rejected.load(Ordering::Relaxed)
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn abandoned_cycles(&self) -> u64 {
        self.abandoned_cycles.load(Ordering::Relaxed)
    }

    pub fn invocation_errors(&self) -> u64 {
        self.invocation_errors.load(Ordering::Relaxed)
    }

    pub fn record_update_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_rejected(&self) {
        self.updates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invocation_error(&self) {
        self.invocation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_dispatch(&self) -> Instant {
        Instant::now()
    }

    /// Count a successful dispatch and its latency from `start`
    pub fn finish_dispatch(&self, start: Instant) {
        let latency_us = start.elapsed().as_micros() as u64;
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        self.total_dispatch_us.fetch_add(latency_us, Ordering::Relaxed);
        self.dispatch_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_dispatch_latency_us(&self) -> u64 {
        let samples = self.dispatch_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0;
        }
        self.total_dispatch_us.load(Ordering::Relaxed) / samples
    }
}

/// Per-channel counters
pub struct ChannelMetrics {
    channel: String,
    updates: AtomicU64,
    faults: AtomicU64,
}

impl ChannelMetrics {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            updates: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }
}
