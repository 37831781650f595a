use anyhow::{anyhow, Result};
use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ChannelSource, SourceEvent};
use crate::core::Value;

const DEFAULT_CAPACITY: usize = 64;

/// Handle given to callback code that publishes values from any thread
#[derive(Clone)]
pub struct Publisher {
    channel: String,
    tx: Sender<SourceEvent>,
}

impl Publisher {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish a value stamped with the current time.
    ///
    /// Returns `false` once the source has been dropped.
    pub fn publish(&self, value: impl Into<Value>) -> bool {
        self.publish_at(value, Instant::now())
    }

    pub fn publish_at(&self, value: impl Into<Value>, timestamp: Instant) -> bool {
        self.tx
            .send(SourceEvent::Update {
                value: value.into(),
                timestamp,
            })
            .is_ok()
    }

    /// Report a fault, e.g. a lost connection
    pub fn fault(&self, message: impl Into<String>) -> bool {
        self.tx
            .send(SourceEvent::Fault {
                message: message.into(),
            })
            .is_ok()
    }
}

/// Adapter for callback-style feeds.
///
/// Callbacks publish through a [`Publisher`] into a crossbeam channel; while
/// subscribed, a blocking task forwards events into the async subscription.
/// Values published while unsubscribed wait for the next subscription.
pub struct PushSource {
    channel: String,
    tx: Sender<SourceEvent>,
    rx: Receiver<SourceEvent>,
    capacity: usize,
    stop_tx: Option<Sender<()>>,
}

impl PushSource {
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_capacity(channel, DEFAULT_CAPACITY)
    }

    /// `capacity` bounds the async side of the subscription
    pub fn with_capacity(channel: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            channel: channel.into(),
            tx,
            rx,
            capacity: capacity.max(1),
            stop_tx: None,
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            channel: self.channel.clone(),
            tx: self.tx.clone(),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.stop_tx.is_some()
    }
}

#[async_trait]
impl ChannelSource for PushSource {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn subscribe(&mut self) -> Result<mpsc::Receiver<SourceEvent>> {
        if self.stop_tx.is_some() {
            return Err(anyhow!("Channel {} is already subscribed", self.channel));
        }

        let (out_tx, out_rx) = mpsc::channel(self.capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let events = self.rx.clone();
        let channel = self.channel.clone();

        tokio::task::spawn_blocking(move || {
            loop {
                crossbeam_channel::select! {
                    recv(events) -> msg => match msg {
                        Ok(event) => {
                            if out_tx.blocking_send(event).is_err() {
                                break; // subscriber went away
                            }
                        }
                        Err(_) => break,
                    },
                    recv(stop_rx) -> _ => break,
                }
            }
            debug!(channel = %channel, "push forwarder finished");
        });

        self.stop_tx = Some(stop_tx);
        Ok(out_rx)
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // forwarder may already be gone
            let _ = stop_tx.try_send(());
        }
        Ok(())
    }
}
