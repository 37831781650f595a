use std::collections::BTreeMap;
use std::sync::Arc;
use super::{AggregatorMetrics, ChannelMetrics};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub channel: String,
    pub updates: u64,
    pub faults: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub updates_applied: u64,
    pub updates_rejected: u64,
    pub dispatches: u64,
    pub abandoned_cycles: u64,
    pub invocation_errors: u64,
    pub avg_dispatch_latency_us: u64,
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

/// Shared handle to every counter of one aggregator
#[derive(Clone, Default)]
pub struct MetricsCollector {
    aggregator: Arc<AggregatorMetrics>,
    channels: BTreeMap<String, Arc<ChannelMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_channels<'a>(channels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut collector = Self::new();
        for channel in channels {
            collector.register(channel);
        }
        collector
    }

    pub fn register(&mut self, channel: impl Into<String>) -> Arc<ChannelMetrics> {
        let channel = channel.into();
        self.channels
            .entry(channel.clone())
            .or_insert_with(|| Arc::new(ChannelMetrics::new(channel)))
            .clone()
    }

    pub fn aggregator(&self) -> &Arc<AggregatorMetrics> {
        &self.aggregator
    }

    pub fn channel(&self, channel: &str) -> Option<Arc<ChannelMetrics>> {
        self.channels.get(channel).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let agg = &self.aggregator;
        MetricsSnapshot {
            updates_applied: agg.updates_applied(),
            updates_rejected: agg.updates_rejected(),
            dispatches: agg.dispatches(),
            abandoned_cycles: agg.abandoned_cycles(),
            invocation_errors: agg.invocation_errors(),
            avg_dispatch_latency_us: agg.avg_dispatch_latency_us(),
            channels: self
                .channels
                .iter()
                .map(|(name, metrics)| {
                    (
                        name.clone(),
                        ChannelSnapshot {
                            channel: metrics.channel().to_string(),
                            updates: metrics.updates(),
                            faults: metrics.faults(),
                        },
                    )
                })
                .collect(),
        }
    }
}
