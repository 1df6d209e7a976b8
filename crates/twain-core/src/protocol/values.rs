//! Capability identifiers and the typed value sets negotiated through them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::fix32::Fix32;
use crate::capability::codec::ItemType;

/// Identifier of a negotiable capability (`CAP_*` / `ICAP_*`).
///
/// Kept open-ended: sources report vendor capabilities (0x8000+) in their
/// supported-capability lists and those must survive a round trip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId(pub u16);

impl CapabilityId {
    pub const XFER_COUNT: Self = Self(0x0001);
    pub const COMPRESSION: Self = Self(0x0100);
    pub const PIXEL_TYPE: Self = Self(0x0101);
    pub const UNITS: Self = Self(0x0102);
    pub const XFER_MECH: Self = Self(0x0103);
    pub const FEEDER_ENABLED: Self = Self(0x1002);
    pub const FEEDER_LOADED: Self = Self(0x1003);
    pub const SUPPORTED_CAPS: Self = Self(0x1005);
    pub const EXTENDED_CAPS: Self = Self(0x1006);
    pub const AUTO_FEED: Self = Self(0x1007);
    pub const INDICATORS: Self = Self(0x100B);
    pub const PAPER_DETECTABLE: Self = Self(0x100D);
    pub const UI_CONTROLLABLE: Self = Self(0x100E);
    pub const AUTO_SCAN: Self = Self(0x1010);
    pub const DUPLEX: Self = Self(0x1012);
    pub const DUPLEX_ENABLED: Self = Self(0x1013);
    pub const ORIENTATION: Self = Self(0x1110);
    pub const X_RESOLUTION: Self = Self(0x1118);
    pub const Y_RESOLUTION: Self = Self(0x1119);
    pub const SUPPORTED_SIZES: Self = Self(0x1122);
    pub const BIT_DEPTH: Self = Self(0x112B);
    pub const FLIP_ROTATION: Self = Self(0x1136);
    pub const AUTOMATIC_BORDER_DETECTION: Self = Self(0x1150);
    pub const AUTOMATIC_DESKEW: Self = Self(0x1151);
    pub const AUTOMATIC_ROTATE: Self = Self(0x1152);

    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Symbolic name from `twain.h`, if this is a capability we know.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::XFER_COUNT => "CAP_XFERCOUNT",
            Self::COMPRESSION => "ICAP_COMPRESSION",
            Self::PIXEL_TYPE => "ICAP_PIXELTYPE",
            Self::UNITS => "ICAP_UNITS",
            Self::XFER_MECH => "ICAP_XFERMECH",
            Self::FEEDER_ENABLED => "CAP_FEEDERENABLED",
            Self::FEEDER_LOADED => "CAP_FEEDERLOADED",
            Self::SUPPORTED_CAPS => "CAP_SUPPORTEDCAPS",
            Self::EXTENDED_CAPS => "CAP_EXTENDEDCAPS",
            Self::AUTO_FEED => "CAP_AUTOFEED",
            Self::INDICATORS => "CAP_INDICATORS",
            Self::PAPER_DETECTABLE => "CAP_PAPERDETECTABLE",
            Self::UI_CONTROLLABLE => "CAP_UICONTROLLABLE",
            Self::AUTO_SCAN => "CAP_AUTOSCAN",
            Self::DUPLEX => "CAP_DUPLEX",
            Self::DUPLEX_ENABLED => "CAP_DUPLEXENABLED",
            Self::ORIENTATION => "ICAP_ORIENTATION",
            Self::X_RESOLUTION => "ICAP_XRESOLUTION",
            Self::Y_RESOLUTION => "ICAP_YRESOLUTION",
            Self::SUPPORTED_SIZES => "ICAP_SUPPORTEDSIZES",
            Self::BIT_DEPTH => "ICAP_BITDEPTH",
            Self::FLIP_ROTATION => "ICAP_FLIPROTATION",
            Self::AUTOMATIC_BORDER_DETECTION => "ICAP_AUTOMATICBORDERDETECTION",
            Self::AUTOMATIC_DESKEW => "ICAP_AUTOMATICDESKEW",
            Self::AUTOMATIC_ROTATE => "ICAP_AUTOMATICROTATE",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({self})")
    }
}

/// A capability value with a fixed wire item type.
pub trait TwainValue: Copy + PartialEq + fmt::Debug {
    const ITEM_TYPE: ItemType;

    fn to_raw(self) -> u32;

    fn from_raw(raw: u32) -> Option<Self>;
}

impl TwainValue for bool {
    const ITEM_TYPE: ItemType = ItemType::Bool;

    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        // TW_BOOL is 16 bits wide; ignore whatever the source left above it.
        Some(raw & 0xFFFF != 0)
    }
}

impl TwainValue for i16 {
    const ITEM_TYPE: ItemType = ItemType::Int16;

    fn to_raw(self) -> u32 {
        self as u16 as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        Some(raw as u16 as i16)
    }
}

impl TwainValue for u16 {
    const ITEM_TYPE: ItemType = ItemType::UInt16;

    fn to_raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Option<Self> {
        Some(raw as u16)
    }
}

impl TwainValue for Fix32 {
    const ITEM_TYPE: ItemType = ItemType::Fix32;

    fn to_raw(self) -> u32 {
        self.raw()
    }

    fn from_raw(raw: u32) -> Option<Self> {
        Some(Fix32::from_raw(raw))
    }
}

/// Declares a `TWTY_UINT16` value set and its `TwainValue` mapping.
macro_rules! twain_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl TwainValue for $name {
            const ITEM_TYPE: ItemType = ItemType::UInt16;

            fn to_raw(self) -> u32 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            fn from_raw(raw: u32) -> Option<Self> {
                match raw & 0xFFFF {
                    $(v if v == $value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

twain_enum! {
    /// `ICAP_UNITS` (TWUN_*).
    Units {
        Inches = 0,
        Centimeters = 1,
        Picas = 2,
        Points = 3,
        Twips = 4,
        Pixels = 5,
        Millimeters = 6,
    }
}

twain_enum! {
    /// `ICAP_PIXELTYPE` (TWPT_*).
    PixelType {
        BlackAndWhite = 0,
        Grey = 1,
        Rgb = 2,
        Palette = 3,
        Cmy = 4,
        Cmyk = 5,
        Yuv = 6,
        Yuvk = 7,
        CieXyz = 8,
        Lab = 9,
        Srgb = 10,
        Infrared = 16,
    }
}

twain_enum! {
    /// `ICAP_XFERMECH` (TWSX_*).
    TransferMechanism {
        Native = 0,
        File = 1,
        Memory = 2,
        MemFile = 4,
    }
}

twain_enum! {
    /// `ICAP_FLIPROTATION` (TWFR_*).
    FlipRotation {
        Book = 0,
        FanFold = 1,
    }
}

twain_enum! {
    /// `ICAP_ORIENTATION` (TWOR_*). Portrait is ROT0, landscape is ROT270.
    Orientation {
        Portrait = 0,
        Rot90 = 1,
        Rot180 = 2,
        Landscape = 3,
        Auto = 4,
    }
}

twain_enum! {
    /// `ICAP_SUPPORTEDSIZES` (TWSS_*).
    PageSize {
        None = 0,
        A4 = 1,
        JisB5 = 2,
        UsLetter = 3,
        UsLegal = 4,
        A5 = 5,
        IsoB4 = 6,
        IsoB6 = 7,
        UsLedger = 9,
        UsExecutive = 10,
        A3 = 11,
        IsoB3 = 12,
        A6 = 13,
    }
}

twain_enum! {
    /// `CAP_DUPLEX` (TWDX_*).
    Duplex {
        None = 0,
        OnePass = 1,
        TwoPass = 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names() {
        assert_eq!(CapabilityId::UNITS.to_string(), "ICAP_UNITS");
        assert_eq!(CapabilityId(0x8001).to_string(), "0x8001");
        assert_eq!(CapabilityId::XFER_MECH.raw(), 0x0103);
    }

    #[test]
    fn test_enum_raw_mapping() {
        assert_eq!(Units::Millimeters.to_raw(), 6);
        assert_eq!(Units::from_raw(5), Some(Units::Pixels));
        assert_eq!(TransferMechanism::from_raw(3), None);
        assert_eq!(Orientation::from_raw(3), Some(Orientation::Landscape));
        // Upper half of a widened 16-bit item is ignored.
        assert_eq!(PixelType::from_raw(0xABCD_0002), Some(PixelType::Rgb));
        assert_eq!(<bool as TwainValue>::from_raw(0xFFFF_0000), Some(false));
        assert_eq!(<i16 as TwainValue>::from_raw((-1i16).to_raw()), Some(-1));
    }
}
