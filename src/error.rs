use thiserror::Error;

use crate::core::ValueKind;

/// Projection axis used when locating the isolated region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Cols,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Rows => write!(f, "row"),
            Axis::Cols => write!(f, "column"),
        }
    }
}

/// Failures of frame isolation, calibration and frame assembly.
///
/// All of these abandon the current collection cycle; none of them stop the
/// aggregator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImagingError {
    #[error("frame has zero dynamic range (min={min}, max={max})")]
    DegenerateFrame { min: f64, max: f64 },

    #[error("isolation mask has no nonzero {axis} projection")]
    EmptyRegion { axis: Axis },

    #[error("resolution must be finite and positive, got {0}")]
    InvalidResolution(f64),

    #[error("frame of {len} samples cannot be shaped as {rows}x{cols}")]
    FrameShape { len: usize, rows: usize, cols: usize },

    #[error("frame field `{field}` is missing or has the wrong type")]
    MissingFrameField { field: String },
}

/// Errors surfaced by the snapshot aggregator and its runtime
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("update for unconfigured channel `{0}`")]
    UnknownChannel(String),

    #[error("channel `{channel}` expects {expected:?} values, got {actual:?}")]
    ValueKind {
        channel: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("channel source `{channel}` reported a fault: {message}")]
    ChannelSource { channel: String, message: String },

    #[error("pipeline invocation failed for generation {generation}")]
    PipelineInvocation {
        generation: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("snapshot preparation for generation {generation} was cancelled")]
    PreparationCancelled { generation: u64 },

    #[error("aggregator runtime is already running")]
    AlreadyRunning,

    #[error("aggregator runtime is not running")]
    NotRunning,

    #[error("update queue closed")]
    QueueClosed,

    #[error("invalid runtime state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
