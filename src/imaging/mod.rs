pub mod calibrate;
pub mod filters;
pub mod isolate;
pub mod watershed;

pub use calibrate::{calibrate, Bounds, DistributionDescriptor, IMAGE2D};
pub use isolate::{isolate, IsolatedRegion, RawFrame};
