pub mod aggregator;
pub mod runtime;
pub mod state;
pub mod store;

pub use aggregator::{SnapshotAggregator, UpdateOutcome};
pub use runtime::AggregatorRuntime;
pub use state::{RuntimeState, ShutdownMode};
pub use store::{ChannelReading, CollectionStart, FrozenSnapshot, SnapshotStore};
