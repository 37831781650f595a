use anyhow::Result;
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::core::Value;

/// Item delivered by a channel subscription
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A newly published value
    Update { value: Value, timestamp: Instant },
    /// Terminal or transient fault reported by the source (e.g. connection lost)
    Fault { message: String },
}

/// A named, independently updating feed of values.
///
/// Events of one subscription arrive in publication order. Nothing is assumed
/// about the thread the source publishes from.
#[async_trait]
pub trait ChannelSource: Send {
    /// Channel name this source publishes
    fn channel(&self) -> &str;

    /// Start delivering events
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<SourceEvent>>;

    /// Stop delivering events. Idempotent, and safe after the source stopped
    /// on its own.
    async fn unsubscribe(&mut self) -> Result<()>;
}
