pub mod metrics;
pub mod collector;
pub mod monitor;

pub use metrics::{AggregatorMetrics, ChannelMetrics};
pub use collector::{ChannelSnapshot, MetricsCollector, MetricsSnapshot};
pub use monitor::AggregatorMonitor;
