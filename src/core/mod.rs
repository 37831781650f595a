pub mod invocation;
pub mod value;

pub use invocation::{LoggingInvocation, PipelineInvocation};
pub use value::{ChannelUpdate, Value, ValueKind};
