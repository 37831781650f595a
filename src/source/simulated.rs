use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};

use super::{ChannelSource, SourceEvent};
use crate::core::Value;

/// Produces the value for the n-th publication
pub type ValueGenerator = Arc<dyn Fn(u64) -> Value + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationMode {
    Periodic { interval_ms: u64 },
    Manual,
}

/// Simulated channel publishing generated values, periodically or on demand
pub struct SimulatedChannel {
    channel: String,
    mode: SimulationMode,
    generator: ValueGenerator,
    /// Report a fault instead of the n-th value
    fault_at: Option<u64>,
    manual_trigger_tx: mpsc::Sender<()>,
    manual_trigger_rx: Option<mpsc::Receiver<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl SimulatedChannel {
    pub fn new(channel: impl Into<String>, generator: ValueGenerator) -> Self {
        let (tx, rx) = mpsc::channel(16);
        Self {
            channel: channel.into(),
            mode: SimulationMode::Periodic { interval_ms: 1000 },
            generator,
            fault_at: None,
            manual_trigger_tx: tx,
            manual_trigger_rx: Some(rx),
            stop_tx: None,
        }
    }

    /// Channel that always publishes the same value
    pub fn constant(channel: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(channel, Arc::new(move |_: u64| value.clone()))
    }

    pub fn with_mode(mut self, mode: SimulationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply `{"mode": "periodic" | "manual", "interval_ms": .., "fault_at": ..}`
    pub fn configure(&mut self, config: JsonValue) -> Result<()> {
        if self.stop_tx.is_some() {
            return Err(anyhow!("Cannot configure channel {} while subscribed", self.channel));
        }

        let mode = config["mode"].as_str().unwrap_or("periodic");
        self.mode = match mode {
            "periodic" => {
                let interval_ms = config["interval_ms"].as_u64().unwrap_or(1000);
                SimulationMode::Periodic { interval_ms }
            }
            "manual" => SimulationMode::Manual,
            _ => return Err(anyhow!("Unknown simulation mode: {}", mode)),
        };
        self.fault_at = config["fault_at"].as_u64();

        Ok(())
    }

    /// Publish the next value (manual mode only)
    pub fn trigger(&self) {
        let _ = self.manual_trigger_tx.try_send(());
    }
}

#[async_trait]
impl ChannelSource for SimulatedChannel {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn subscribe(&mut self) -> Result<mpsc::Receiver<SourceEvent>> {
        if self.stop_tx.is_some() {
            return Err(anyhow!("Channel {} is already subscribed", self.channel));
        }
        let mut manual_rx = match self.mode {
            SimulationMode::Manual => Some(
                self.manual_trigger_rx
                    .take()
                    .ok_or_else(|| anyhow!("Manual trigger for {} already consumed", self.channel))?,
            ),
            SimulationMode::Periodic { .. } => None,
        };

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mode = self.mode.clone();
        let generator = self.generator.clone();
        let fault_at = self.fault_at;

        tokio::spawn(async move {
            let mut counter = 0u64;
            loop {
                let tick = async {
                    match (&mode, manual_rx.as_mut()) {
                        (SimulationMode::Periodic { interval_ms }, _) => {
                            sleep(Duration::from_millis(*interval_ms)).await;
                            true
                        }
                        (SimulationMode::Manual, Some(trigger)) => trigger.recv().await.is_some(),
                        (SimulationMode::Manual, None) => false,
                    }
                };

                let fired = tokio::select! {
                    _ = &mut stop_rx => break,
                    fired = tick => fired,
                };
                if !fired {
                    break;
                }

                let event = if fault_at == Some(counter) {
                    SourceEvent::Fault {
                        message: format!("simulated fault after {} values", counter),
                    }
                } else {
                    SourceEvent::Update {
                        value: generator(counter),
                        timestamp: Instant::now(),
                    }
                };
                counter += 1;

                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        Ok(rx)
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        // the previous trigger receiver went away with the publishing task
        if self.manual_trigger_rx.is_none() {
            let (tx, rx) = mpsc::channel(16);
            self.manual_trigger_tx = tx;
            self.manual_trigger_rx = Some(rx);
        }
        Ok(())
    }
}
