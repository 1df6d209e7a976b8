//! Protocol module - TWAIN protocol definitions.

pub mod codes;
pub mod constants;
pub mod fix32;
pub mod types;
pub mod values;

pub use codes::{ConditionCode, ReturnCode};
pub use constants::*;
pub use fix32::Fix32;
pub use types::{
    Frame, Identity, ImageInfo, ImageLayout, ImageMemXfer, MemHandle, Memory, PendingXfers,
    PlatformMessage, SetupMemXfer, UserInterface, Version, WindowHandle,
};
pub use values::{
    CapabilityId, Duplex, FlipRotation, Orientation, PageSize, PixelType, TransferMechanism,
    TwainValue, Units,
};
