pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod observability;
pub mod prepare;
pub mod source;

pub use config::AcquisitionConfig;
pub use engine::{AggregatorRuntime, ShutdownMode, SnapshotAggregator, UpdateOutcome};
pub use error::{AggregatorError, ImagingError};
