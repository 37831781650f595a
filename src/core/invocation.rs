use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::prepare::CalibratedSnapshot;

/// Downstream entry point that receives every completed snapshot.
///
/// The aggregator awaits `invoke` before it applies the next update, so an
/// implementation may take as long as it needs. It is called once per
/// completed collection cycle and must tolerate repeated calls.
#[async_trait]
pub trait PipelineInvocation: Send + Sync {
    async fn invoke(&self, snapshot: CalibratedSnapshot) -> Result<()>;
}

#[async_trait]
impl<T: PipelineInvocation + ?Sized> PipelineInvocation for std::sync::Arc<T> {
    async fn invoke(&self, snapshot: CalibratedSnapshot) -> Result<()> {
        (**self).invoke(snapshot).await
    }
}

/// Invocation that only logs a summary of each snapshot
pub struct LoggingInvocation {
    label: String,
}

impl LoggingInvocation {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl Default for LoggingInvocation {
    fn default() -> Self {
        Self::new("pipeline")
    }
}

#[async_trait]
impl PipelineInvocation for LoggingInvocation {
    async fn invoke(&self, snapshot: CalibratedSnapshot) -> Result<()> {
        info!(
            label = %self.label,
            generation = snapshot.generation,
            collected_at = %snapshot.collection_isotime,
            inputs = snapshot.values.len(),
            "snapshot dispatched"
        );

        for (name, value) in &snapshot.values {
            info!(label = %self.label, "  {} = {}", name, value.summary());
        }

        if let Some(dist) = &snapshot.distribution {
            let (rows, cols) = dist.pixel_data.dim();
            info!(
                label = %self.label,
                "  distribution {}x{} px, x=[{:.3}, {:.3}] y=[{:.3}, {:.3}] {}",
                rows,
                cols,
                dist.bounds.min_x,
                dist.bounds.max_x,
                dist.bounds.min_y,
                dist.bounds.max_y,
                dist.bounds.units
            );
        }

        Ok(())
    }
}
