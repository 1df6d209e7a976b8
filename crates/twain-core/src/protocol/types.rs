//! Protocol data structures, in host form.
//!
//! These mirror the `TW_*` structures field for field but own their data;
//! the packed wire layouts live with the backend that needs them.

use std::fmt;

use super::constants::{DG_CONTROL, DG_IMAGE, PROTOCOL_MAJOR, PROTOCOL_MINOR, TWCP_NONE};
use super::fix32::Fix32;
use super::values::PixelType;

/// Opaque platform window handle (an `HWND` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub const NULL: Self = Self(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// `TW_VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub language: u16,
    pub country: u16,
    pub info: String,
}

/// `TW_IDENTITY`: describes either the application or a source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    /// Assigned by the manager; zero until then.
    pub id: u32,
    pub version: Version,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    pub supported_groups: u32,
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
}

impl Identity {
    /// Identity this crate presents to the manager.
    pub fn application(product_name: &str) -> Self {
        Self {
            id: 0,
            version: Version {
                major: 1,
                minor: 0,
                // TWLG_USA / TWCY_USA
                language: 13,
                country: 1,
                info: env!("CARGO_PKG_VERSION").to_string(),
            },
            protocol_major: PROTOCOL_MAJOR,
            protocol_minor: PROTOCOL_MINOR,
            supported_groups: DG_CONTROL | DG_IMAGE,
            manufacturer: "twain-rs".to_string(),
            product_family: "twain-rs".to_string(),
            product_name: product_name.to_string(),
        }
    }

    /// Whether the manager has assigned this identity an id.
    pub fn is_assigned(&self) -> bool {
        self.id != 0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, id={})", self.product_name, self.manufacturer, self.id)
    }
}

/// `TW_FRAME`, in the source's current units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    pub left: Fix32,
    pub top: Fix32,
    pub right: Fix32,
    pub bottom: Fix32,
}

/// `TW_IMAGELAYOUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageLayout {
    pub frame: Frame,
    pub document_number: u32,
    pub page_number: u32,
    pub frame_number: u32,
}

/// `TW_IMAGEINFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub x_resolution: Fix32,
    pub y_resolution: Fix32,
    pub image_width: i32,
    pub image_length: i32,
    pub samples_per_pixel: i16,
    pub bits_per_sample: [i16; 8],
    pub bits_per_pixel: i16,
    pub planar: bool,
    pub pixel_type: u16,
    pub compression: u16,
}

impl ImageInfo {
    pub fn pixel_type(&self) -> Option<PixelType> {
        use super::values::TwainValue;
        PixelType::from_raw(self.pixel_type as u32)
    }
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            x_resolution: Fix32::default(),
            y_resolution: Fix32::default(),
            image_width: 0,
            image_length: 0,
            samples_per_pixel: 0,
            bits_per_sample: [0; 8],
            bits_per_pixel: 0,
            planar: false,
            pixel_type: 0,
            compression: TWCP_NONE,
        }
    }
}

/// `TW_SETUPMEMXFER`: buffer sizes the source accepts for memory transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupMemXfer {
    pub min_buf_size: u32,
    pub max_buf_size: u32,
    pub preferred: u32,
}

/// Handle to a block allocated through the manager's memory entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct MemHandle(pub usize);

impl MemHandle {
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// `TW_MEMORY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Memory {
    pub flags: u32,
    pub length: u32,
    pub the_mem: MemHandle,
}

/// `TW_IMAGEMEMXFER`: one strip of a memory transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageMemXfer {
    pub compression: u16,
    pub bytes_per_row: u32,
    pub columns: u32,
    pub rows: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub bytes_written: u32,
    pub memory: Memory,
}

/// `TW_PENDINGXFERS`. A count of -1 means "more, but unknown how many".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingXfers {
    pub count: i16,
}

impl PendingXfers {
    pub fn has_more(&self) -> bool {
        self.count != 0
    }
}

/// `TW_USERINTERFACE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserInterface {
    pub show_ui: bool,
    pub modal_ui: bool,
    pub parent: WindowHandle,
}

/// A platform message as delivered by the host message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformMessage {
    pub hwnd: WindowHandle,
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
    pub time: u32,
    pub x: i32,
    pub y: i32,
}
