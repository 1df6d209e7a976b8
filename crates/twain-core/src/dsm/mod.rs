//! Data source manager layer.

pub mod mock;
#[cfg(windows)]
pub mod native;
pub mod traits;

pub use mock::{MockCall, MockDsm, MockPage};
#[cfg(windows)]
pub use native::Win32Dsm;
pub use traits::{CapabilityRequest, DsmEntry};
