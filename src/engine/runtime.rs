use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::aggregator::{SnapshotAggregator, UpdateOutcome};
use super::state::{RuntimeState, ShutdownMode};
use crate::config::AcquisitionConfig;
use crate::core::{ChannelUpdate, PipelineInvocation};
use crate::error::AggregatorError;
use crate::observability::{AggregatorMonitor, MetricsCollector};
use crate::source::{ChannelSource, SourceEvent};

const ERROR_STREAM_CAPACITY: usize = 64;

/// Connects channel sources to a [`SnapshotAggregator`].
///
/// Each source gets a reader task forwarding its events into one bounded
/// queue; a single consumer task owns the aggregator and applies the queued
/// updates in arrival order. Errors that do not stop acquisition (source
/// faults, rejected updates, failed invocations) are surfaced on the error
/// stream returned by [`take_errors`](Self::take_errors).
pub struct AggregatorRuntime<P> {
    /// Present whenever the consumer task is not running
    aggregator: Option<SnapshotAggregator<P>>,

    metrics: MetricsCollector,

    state: RuntimeState,

    shutdown_tx: Option<broadcast::Sender<ShutdownMode>>,

    reader_handles: Vec<JoinHandle<()>>,

    consumer_handle: Option<JoinHandle<SnapshotAggregator<P>>>,

    errors_tx: mpsc::Sender<AggregatorError>,
    errors_rx: Option<mpsc::Receiver<AggregatorError>>,
}

impl<P: PipelineInvocation + 'static> AggregatorRuntime<P> {
    pub fn new(config: Arc<AcquisitionConfig>, invocation: P) -> Self {
        Self::from_aggregator(SnapshotAggregator::new(config, invocation))
    }

    pub fn from_aggregator(aggregator: SnapshotAggregator<P>) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_STREAM_CAPACITY);
        Self {
            metrics: aggregator.metrics().clone(),
            aggregator: Some(aggregator),
            state: RuntimeState::Idle,
            shutdown_tx: None,
            reader_handles: Vec::new(),
            consumer_handle: None,
            errors_tx,
            errors_rx: Some(errors_rx),
        }
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Move to `target` if the lifecycle allows it
    fn transition_to(&mut self, target: RuntimeState) -> Result<(), AggregatorError> {
        if !self.state.can_transition_to(&target) {
            return Err(AggregatorError::InvalidTransition {
                from: self.state.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.state = target;
        Ok(())
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn monitor(&self) -> AggregatorMonitor {
        AggregatorMonitor::new(self.metrics.clone())
    }

    /// The aggregator, while the runtime is not running
    pub fn aggregator(&self) -> Option<&SnapshotAggregator<P>> {
        self.aggregator.as_ref()
    }

    /// Stream of non-fatal errors. Can be taken once.
    ///
    /// Errors are dropped (and logged) while the stream is full, so an
    /// unread stream holds at most a fixed number of them.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<AggregatorError>> {
        self.errors_rx.take()
    }

    /// Subscribe every source and start applying their updates.
    ///
    /// A source that fails to subscribe is reported on the error stream and
    /// skipped; starting fails only when no source could be subscribed.
    pub async fn start(&mut self, sources: Vec<Box<dyn ChannelSource>>) -> Result<(), AggregatorError> {
        if matches!(self.state, RuntimeState::Running { .. } | RuntimeState::Stopping { .. }) {
            return Err(AggregatorError::AlreadyRunning);
        }
        if matches!(self.state, RuntimeState::Error { .. }) {
            self.transition_to(RuntimeState::Idle)?;
        }

        let Some(aggregator) = self.aggregator.take() else {
            return Err(AggregatorError::AlreadyRunning);
        };
        let config = aggregator.config().clone();

        if let Some(unknown) = sources.iter().find(|s| config.channel(s.channel()).is_none()) {
            let channel = unknown.channel().to_string();
            self.aggregator = Some(aggregator);
            return Err(AggregatorError::UnknownChannel(channel));
        }

        let (shutdown_tx, _) = broadcast::channel(16);
        let (updates_tx, updates_rx) = mpsc::channel(config.queue_capacity);
        let total = sources.len();
        let mut first_failure = None;

        for mut source in sources {
            let channel = source.channel().to_string();
            match source.subscribe().await {
                Ok(events) => {
                    let handle = spawn_reader(
                        source,
                        events,
                        updates_tx.clone(),
                        shutdown_tx.subscribe(),
                        self.errors_tx.clone(),
                        self.metrics.clone(),
                    );
                    self.reader_handles.push(handle);
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "failed to subscribe channel source");
                    if let Some(m) = self.metrics.channel(&channel) {
                        m.record_fault();
                    }
                    let err = AggregatorError::ChannelSource {
                        channel,
                        message: format!("{:#}", e),
                    };
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    } else {
                        report(&self.errors_tx, err);
                    }
                }
            }
        }

        let subscriptions = self.reader_handles.len();
        if subscriptions == 0 {
            self.aggregator = Some(aggregator);
            let err = first_failure.unwrap_or_else(|| AggregatorError::ChannelSource {
                channel: String::new(),
                message: "no channel sources given".to_string(),
            });
            self.transition_to(RuntimeState::Error {
                error_msg: err.to_string(),
            })?;
            return Err(err);
        }
        if let Some(err) = first_failure {
            report(&self.errors_tx, err);
        }

        self.consumer_handle = Some(tokio::spawn(run_consumer(
            aggregator,
            updates_rx,
            shutdown_tx.subscribe(),
            self.errors_tx.clone(),
        )));
        self.shutdown_tx = Some(shutdown_tx);
        self.transition_to(RuntimeState::Running {
            start_time: Some(Instant::now()),
            subscriptions,
        })?;

        info!(subscriptions, total, "aggregator runtime started");
        Ok(())
    }

    /// Stop taking updates and unsubscribe every source.
    ///
    /// `Graceful` waits for an in-flight dispatch to finish; `Hard` abandons
    /// it. Calling this on a stopped runtime is a no-op.
    pub async fn shutdown(&mut self, mode: ShutdownMode) -> Result<(), AggregatorError> {
        let start_time = match &self.state {
            RuntimeState::Running { start_time, .. } => *start_time,
            RuntimeState::Stopped { .. } => return Ok(()),
            _ => return Err(AggregatorError::NotRunning),
        };

        self.transition_to(RuntimeState::Stopping { mode })?;
        info!(?mode, "stopping aggregator runtime");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(mode);
        }

        while let Some(handle) = self.reader_handles.pop() {
            if let Err(e) = handle.await {
                error!(error = %e, "channel reader task failed");
            }
        }

        if let Some(consumer) = self.consumer_handle.take() {
            match consumer.await {
                Ok(aggregator) => self.aggregator = Some(aggregator),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => error!(error = %e, "consumer task cancelled"),
            }
        }

        let uptime = start_time.map(|t| t.elapsed());
        self.transition_to(RuntimeState::Stopped { uptime })?;
        info!(?uptime, "aggregator runtime stopped");
        Ok(())
    }
}

/// Dropping a running runtime only signals a graceful stop; it cannot wait for
/// the tasks. Call [`AggregatorRuntime::shutdown`] first.
impl<P> Drop for AggregatorRuntime<P> {
    fn drop(&mut self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(ShutdownMode::Graceful);
        }
    }
}

/// Queue a non-fatal error without blocking; dropped when nobody keeps up
fn report(errors: &mpsc::Sender<AggregatorError>, err: AggregatorError) {
    match errors.try_send(err) {
        Ok(()) => {}
        Err(TrySendError::Full(err)) => warn!(error = %err, "error stream full, dropping error"),
        Err(TrySendError::Closed(_)) => {}
    }
}

fn spawn_reader(
    mut source: Box<dyn ChannelSource>,
    mut events: mpsc::Receiver<SourceEvent>,
    updates: mpsc::Sender<ChannelUpdate>,
    mut shutdown_rx: broadcast::Receiver<ShutdownMode>,
    errors: mpsc::Sender<AggregatorError>,
    metrics: MetricsCollector,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let channel = source.channel().to_string();
        let channel_metrics = metrics.channel(&channel);

        loop {
            let event = tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = events.recv() => event,
            };

            match event {
                Some(SourceEvent::Update { value, timestamp }) => {
                    let update = ChannelUpdate::new(channel.clone(), value).with_timestamp(timestamp);
                    let sent = tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        sent = updates.send(update) => sent,
                    };
                    if sent.is_err() {
                        report(&errors, AggregatorError::QueueClosed);
                        break;
                    }
                }
                Some(SourceEvent::Fault { message }) => {
                    warn!(channel = %channel, message = %message, "channel source fault");
                    if let Some(m) = &channel_metrics {
                        m.record_fault();
                    }
                    report(
                        &errors,
                        AggregatorError::ChannelSource {
                            channel: channel.clone(),
                            message,
                        },
                    );
                }
                None => {
                    info!(channel = %channel, "channel source closed");
                    break;
                }
            }
        }

        // a forwarder blocked on a full subscription is released by dropping it
        drop(events);
        if let Err(e) = source.unsubscribe().await {
            warn!(channel = %channel, error = %e, "failed to unsubscribe channel source");
        }
        debug!(channel = %channel, "channel reader stopped");
    })
}

async fn run_consumer<P: PipelineInvocation>(
    mut aggregator: SnapshotAggregator<P>,
    mut updates: mpsc::Receiver<ChannelUpdate>,
    mut shutdown_rx: broadcast::Receiver<ShutdownMode>,
    errors: mpsc::Sender<AggregatorError>,
) -> SnapshotAggregator<P> {
    let mut stop_requested = None;

    loop {
        let update = tokio::select! {
            biased;
            mode = shutdown_rx.recv() => {
                debug!(?mode, "consumer received shutdown");
                break;
            }
            update = updates.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };

        let result = tokio::select! {
            result = aggregator.on_update(update) => Some(result),
            _ = watch_for_hard_stop(&mut shutdown_rx, &mut stop_requested) => None,
        };

        match result {
            Some(Ok(UpdateOutcome::Abandoned { generation, reason })) => {
                debug!(generation, reason = %reason, "collection cycle abandoned");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => report(&errors, e),
            None => {
                warn!(
                    generation = aggregator.store().generation(),
                    "hard shutdown, in-flight dispatch abandoned"
                );
                break;
            }
        }

        if stop_requested.is_some() {
            break;
        }
    }

    aggregator
}

/// Resolves on a hard stop; a graceful stop is only recorded.
async fn watch_for_hard_stop(
    shutdown_rx: &mut broadcast::Receiver<ShutdownMode>,
    stop_requested: &mut Option<ShutdownMode>,
) {
    loop {
        match shutdown_rx.recv().await {
            Ok(ShutdownMode::Hard) => {
                *stop_requested = Some(ShutdownMode::Hard);
                return;
            }
            Ok(ShutdownMode::Graceful) => *stop_requested = Some(ShutdownMode::Graceful),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
