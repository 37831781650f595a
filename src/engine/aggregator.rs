use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::store::SnapshotStore;
use crate::config::AcquisitionConfig;
use crate::core::{ChannelUpdate, PipelineInvocation};
use crate::error::{AggregatorError, ImagingError};
use crate::observability::MetricsCollector;
use crate::prepare::prepare_snapshot;

/// What a single applied update led to
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Snapshot still waiting on `missing` channels (or already dispatched)
    Collecting { generation: u64, missing: usize },
    /// The completed generation was handed to the pipeline
    Dispatched { generation: u64 },
    /// The completed generation could not be prepared; nothing was invoked
    Abandoned { generation: u64, reason: ImagingError },
}

/// Single-writer snapshot aggregator.
///
/// Every mutation goes through `on_update(&mut self, ..)`; the update that
/// completes a snapshot also runs the whole dispatch (freeze, reset, prepare,
/// invoke) before returning, so no other update can interleave with it.
pub struct SnapshotAggregator<P> {
    config: Arc<AcquisitionConfig>,
    store: SnapshotStore,
    invocation: P,
    metrics: MetricsCollector,
}

impl<P: PipelineInvocation> SnapshotAggregator<P> {
    pub fn new(config: Arc<AcquisitionConfig>, invocation: P) -> Self {
        let metrics = MetricsCollector::for_channels(config.channel_names());
        Self {
            store: SnapshotStore::new(config.clone()),
            config,
            invocation,
            metrics,
        }
    }

    pub fn config(&self) -> &Arc<AcquisitionConfig> {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn invocation(&self) -> &P {
        &self.invocation
    }

    /// Apply one channel update and dispatch if it completed the snapshot.
    ///
    /// A rejected update (unknown channel, wrong value kind) leaves the
    /// snapshot untouched. A failed invocation is returned as an error, but
    /// the snapshot has already been reset by then.
    pub async fn on_update(&mut self, update: ChannelUpdate) -> Result<UpdateOutcome, AggregatorError> {
        let channel = update.channel.clone();

        let completed = match self.store.apply(update) {
            Ok(completed) => completed,
            Err(e) => {
                self.metrics.aggregator().record_update_rejected();
                warn!(channel = %channel, error = %e, "update rejected");
                return Err(e);
            }
        };

        self.metrics.aggregator().record_update_applied();
        if let Some(m) = self.metrics.channel(&channel) {
            m.record_update();
        }

        if !completed {
            let missing = self.store.missing().len();
            debug!(channel = %channel, generation = self.store.generation(), missing, "update applied");
            return Ok(UpdateOutcome::Collecting {
                generation: self.store.generation(),
                missing,
            });
        }

        self.dispatch().await
    }

    async fn dispatch(&mut self) -> Result<UpdateOutcome, AggregatorError> {
        let Some(frozen) = self.store.freeze() else {
            return Ok(UpdateOutcome::Collecting {
                generation: self.store.generation(),
                missing: self.store.missing().len(),
            });
        };
        let generation = frozen.generation;

        // The frozen copy is owned by this dispatch; start collecting the next
        // generation right away.
        self.store.reset();

        let start = self.metrics.aggregator().start_dispatch();
        let config = self.config.clone();
        let joined = tokio::task::spawn_blocking(move || prepare_snapshot(frozen, &config)).await;
        let prepared = match preparation_result(generation, joined) {
            Ok(result) => result,
            Err(e) => {
                self.metrics.aggregator().record_abandoned();
                warn!(generation, error = %e, "snapshot preparation did not run, cycle abandoned");
                return Err(e);
            }
        };

        let snapshot = match prepared {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                self.metrics.aggregator().record_abandoned();
                warn!(generation, error = %reason, "snapshot preparation failed, cycle abandoned");
                return Ok(UpdateOutcome::Abandoned { generation, reason });
            }
        };

        info!(generation, inputs = snapshot.values.len(), "dispatching snapshot");

        match self.invocation.invoke(snapshot).await {
            Ok(()) => {
                self.metrics.aggregator().finish_dispatch(start);
                info!(generation, "pipeline invocation completed");
                Ok(UpdateOutcome::Dispatched { generation })
            }
            Err(source) => {
                self.metrics.aggregator().record_invocation_error();
                error!(generation, error = %source, "pipeline invocation failed");
                Err(AggregatorError::PipelineInvocation { generation, source })
            }
        }
    }
}

/// Unwrap the preparation task: panics are re-raised, cancellation (the
/// blocking pool shutting down) becomes an error.
fn preparation_result<T>(generation: u64, joined: Result<T, JoinError>) -> Result<T, AggregatorError> {
    match joined {
        Ok(result) => Ok(result),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(AggregatorError::PreparationCancelled { generation }),
    }
}
