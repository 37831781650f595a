pub mod push;
pub mod simulated;
pub mod traits;

pub use push::{PushSource, Publisher};
pub use simulated::{SimulatedChannel, SimulationMode, ValueGenerator};
pub use traits::{ChannelSource, SourceEvent};
