//! Capability module - container codec and negotiation.

pub mod codec;
pub mod negotiator;

pub use codec::{CapabilityResult, ContainerType, ItemType, ItemValue};
pub use negotiator::{BasicValue, Capability, Negotiated};
