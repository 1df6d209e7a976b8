//! Capability container codec.
//!
//! A capability value travels in one of four container shapes. All of them
//! start with a 16-bit item type; the rest of the layout depends on the shape:
//!
//! ```text
//! TW_ONEVALUE    : type(2) item(4, or the full item for strings/frames)
//! TW_RANGE       : type(2) min(4) max(4) step(4) default(4) current(4)
//! TW_ENUMERATION : type(2) count(4) current_idx(4) default_idx(4) items...
//! TW_ARRAY       : type(2) count(4) items...
//! ```
//!
//! Enumeration and array items are packed at their natural size.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TwainError};
use crate::protocol::constants::*;
use crate::protocol::{Fix32, Frame};

/// `TWTY_*` item type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    Bool,
    Fix32,
    Frame,
    Str32,
    Str64,
    Str128,
    Str255,
    Handle,
}

impl ItemType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        let ty = match raw {
            TWTY_INT8 => Self::Int8,
            TWTY_INT16 => Self::Int16,
            TWTY_INT32 => Self::Int32,
            TWTY_UINT8 => Self::UInt8,
            TWTY_UINT16 => Self::UInt16,
            TWTY_UINT32 => Self::UInt32,
            TWTY_BOOL => Self::Bool,
            TWTY_FIX32 => Self::Fix32,
            TWTY_FRAME => Self::Frame,
            TWTY_STR32 => Self::Str32,
            TWTY_STR64 => Self::Str64,
            TWTY_STR128 => Self::Str128,
            TWTY_STR255 => Self::Str255,
            TWTY_HANDLE => Self::Handle,
            _ => return None,
        };
        Some(ty)
    }

    pub fn raw(&self) -> u16 {
        match self {
            Self::Int8 => TWTY_INT8,
            Self::Int16 => TWTY_INT16,
            Self::Int32 => TWTY_INT32,
            Self::UInt8 => TWTY_UINT8,
            Self::UInt16 => TWTY_UINT16,
            Self::UInt32 => TWTY_UINT32,
            Self::Bool => TWTY_BOOL,
            Self::Fix32 => TWTY_FIX32,
            Self::Frame => TWTY_FRAME,
            Self::Str32 => TWTY_STR32,
            Self::Str64 => TWTY_STR64,
            Self::Str128 => TWTY_STR128,
            Self::Str255 => TWTY_STR255,
            Self::Handle => TWTY_HANDLE,
        }
    }

    /// Size of one packed item in bytes.
    pub fn item_size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Bool => 2,
            Self::Int32 | Self::UInt32 | Self::Fix32 | Self::Handle => 4,
            Self::Frame => 16,
            Self::Str32 => 34,
            Self::Str64 => 66,
            Self::Str128 => 130,
            Self::Str255 => 256,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::Str32 | Self::Str64 | Self::Str128 | Self::Str255)
    }

    /// Whether items of this type fit in the 32-bit scalar slot.
    pub fn is_scalar(&self) -> bool {
        self.item_size() <= 4
    }
}

/// `TWON_*` container shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    Array,
    Enumeration,
    OneValue,
    Range,
}

impl ContainerType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            TWON_ARRAY => Some(Self::Array),
            TWON_ENUMERATION => Some(Self::Enumeration),
            TWON_ONEVALUE => Some(Self::OneValue),
            TWON_RANGE => Some(Self::Range),
            _ => None,
        }
    }

    pub fn raw(&self) -> u16 {
        match self {
            Self::Array => TWON_ARRAY,
            Self::Enumeration => TWON_ENUMERATION,
            Self::OneValue => TWON_ONEVALUE,
            Self::Range => TWON_RANGE,
        }
    }
}

/// A single decoded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValue {
    /// Any type up to 32 bits, zero-extended.
    Scalar(u32),
    Frame(Frame),
    Text(String),
}

impl ItemValue {
    pub fn as_scalar(&self) -> Option<u32> {
        match self {
            ItemValue::Scalar(raw) => Some(*raw),
            _ => None,
        }
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemValue::Scalar(raw) => write!(f, "{raw}"),
            ItemValue::Frame(frame) => write!(
                f,
                "[{}, {}, {}, {}]",
                frame.left, frame.top, frame.right, frame.bottom
            ),
            ItemValue::Text(text) => write!(f, "{text:?}"),
        }
    }
}

/// A decoded capability container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityResult {
    Basic {
        item_type: ItemType,
        value: ItemValue,
    },
    Range {
        item_type: ItemType,
        min: u32,
        max: u32,
        step: u32,
        default: u32,
        current: u32,
    },
    Enumeration {
        item_type: ItemType,
        current_index: u32,
        default_index: u32,
        items: Vec<ItemValue>,
    },
    Array {
        item_type: ItemType,
        items: Vec<ItemValue>,
    },
}

impl CapabilityResult {
    pub fn item_type(&self) -> ItemType {
        match self {
            CapabilityResult::Basic { item_type, .. }
            | CapabilityResult::Range { item_type, .. }
            | CapabilityResult::Enumeration { item_type, .. }
            | CapabilityResult::Array { item_type, .. } => *item_type,
        }
    }

    pub fn container_type(&self) -> ContainerType {
        match self {
            CapabilityResult::Basic { .. } => ContainerType::OneValue,
            CapabilityResult::Range { .. } => ContainerType::Range,
            CapabilityResult::Enumeration { .. } => ContainerType::Enumeration,
            CapabilityResult::Array { .. } => ContainerType::Array,
        }
    }

    /// The scalar value the source currently applies, where the shape has one.
    pub fn current_scalar(&self) -> Option<u32> {
        match self {
            CapabilityResult::Basic { value, .. } => value.as_scalar(),
            CapabilityResult::Range { current, .. } => Some(*current),
            CapabilityResult::Enumeration {
                current_index,
                items,
                ..
            } => items
                .get(*current_index as usize)
                .and_then(ItemValue::as_scalar),
            CapabilityResult::Array { .. } => None,
        }
    }

    /// Every scalar value this container permits.
    ///
    /// Ranges are expanded step by step (capped at 4096 values); a
    /// degenerate step yields only the bounds.
    pub fn allowed_scalars(&self) -> Vec<u32> {
        match self {
            CapabilityResult::Basic { value, .. } => value.as_scalar().into_iter().collect(),
            CapabilityResult::Range {
                item_type,
                min,
                max,
                step,
                ..
            } => {
                let lo = numeric(*item_type, *min);
                let hi = numeric(*item_type, *max);
                let inc = numeric(*item_type, *step);
                if inc <= 0.0 || hi < lo {
                    return vec![*min, *max];
                }
                let mut values = Vec::new();
                let mut i = 0u32;
                while values.len() < 4096 {
                    let v = lo + inc * i as f64;
                    if v > hi + RANGE_TOLERANCE {
                        break;
                    }
                    values.push(from_numeric(*item_type, v));
                    i += 1;
                }
                values
            }
            CapabilityResult::Enumeration { items, .. } | CapabilityResult::Array { items, .. } => {
                items.iter().filter_map(ItemValue::as_scalar).collect()
            }
        }
    }

    /// Whether `raw` is an acceptable value for this container.
    ///
    /// Range bounds are compared numerically, so signed and fixed-point
    /// ranges behave.
    pub fn permits(&self, raw: u32) -> bool {
        match self {
            CapabilityResult::Range {
                item_type,
                min,
                max,
                step,
                ..
            } => {
                let v = numeric(*item_type, raw);
                let lo = numeric(*item_type, *min);
                let hi = numeric(*item_type, *max);
                let inc = numeric(*item_type, *step);
                if v < lo - RANGE_TOLERANCE || v > hi + RANGE_TOLERANCE {
                    return false;
                }
                if inc <= 0.0 {
                    return true;
                }
                let steps = (v - lo) / inc;
                (steps - steps.round()).abs() * inc <= RANGE_TOLERANCE
            }
            _ => self.allowed_scalars().contains(&raw),
        }
    }

    /// Items of an array or enumeration, interpreted as 16-bit values.
    pub fn u16_items(&self) -> Vec<u16> {
        match self {
            CapabilityResult::Enumeration { items, .. } | CapabilityResult::Array { items, .. } => {
                items
                    .iter()
                    .filter_map(ItemValue::as_scalar)
                    .map(|raw| raw as u16)
                    .collect()
            }
            CapabilityResult::Basic { value, .. } => {
                value.as_scalar().map(|raw| raw as u16).into_iter().collect()
            }
            CapabilityResult::Range { .. } => Vec::new(),
        }
    }

    /// Serialize back to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.write_u16::<LittleEndian>(self.item_type().raw()).ok();
        match self {
            CapabilityResult::Basic { item_type, value } => {
                write_one_value(&mut out, *item_type, value);
            }
            CapabilityResult::Range {
                min,
                max,
                step,
                default,
                current,
                ..
            } => {
                for v in [min, max, step, default, current] {
                    out.write_u32::<LittleEndian>(*v).ok();
                }
            }
            CapabilityResult::Enumeration {
                item_type,
                current_index,
                default_index,
                items,
            } => {
                out.write_u32::<LittleEndian>(items.len() as u32).ok();
                out.write_u32::<LittleEndian>(*current_index).ok();
                out.write_u32::<LittleEndian>(*default_index).ok();
                for item in items {
                    write_item(&mut out, *item_type, item);
                }
            }
            CapabilityResult::Array { item_type, items } => {
                out.write_u32::<LittleEndian>(items.len() as u32).ok();
                for item in items {
                    write_item(&mut out, *item_type, item);
                }
            }
        }
        out
    }

    fn encoded_len(&self) -> usize {
        let item_type = self.item_type();
        match self {
            CapabilityResult::Basic { .. } => 2 + item_type.item_size().max(4),
            CapabilityResult::Range { .. } => RANGE_LEN,
            CapabilityResult::Enumeration { items, .. } => {
                ENUMERATION_HEADER_LEN + items.len() * item_type.item_size()
            }
            CapabilityResult::Array { items, .. } => {
                ARRAY_HEADER_LEN + items.len() * item_type.item_size()
            }
        }
    }
}

impl fmt::Display for CapabilityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityResult::Basic { item_type, value } => {
                write!(f, "OneValue<{item_type:?}> {value}")
            }
            CapabilityResult::Range {
                item_type,
                min,
                max,
                step,
                default,
                current,
            } => write!(
                f,
                "Range<{item_type:?}> {min}..={max} step {step} default {default} current {current}"
            ),
            CapabilityResult::Enumeration {
                item_type,
                current_index,
                default_index,
                items,
            } => {
                write!(
                    f,
                    "Enumeration<{item_type:?}> current #{current_index} default #{default_index} ["
                )?;
                write_items(f, items)?;
                write!(f, "]")
            }
            CapabilityResult::Array { item_type, items } => {
                write!(f, "Array<{item_type:?}> [")?;
                write_items(f, items)?;
                write!(f, "]")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[ItemValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Slack for fixed-point range arithmetic.
const RANGE_TOLERANCE: f64 = Fix32::EPSILON;

/// Numeric value of a scalar slot, honouring sign and fixed point.
pub fn numeric(item_type: ItemType, raw: u32) -> f64 {
    match item_type {
        ItemType::Int8 => raw as u8 as i8 as f64,
        ItemType::Int16 => raw as u16 as i16 as f64,
        ItemType::Int32 => raw as i32 as f64,
        ItemType::UInt8 => (raw & 0xFF) as f64,
        ItemType::UInt16 | ItemType::Bool => (raw & 0xFFFF) as f64,
        ItemType::Fix32 => Fix32::from_raw(raw).to_f64(),
        _ => raw as f64,
    }
}

/// Inverse of [`numeric`].
pub fn from_numeric(item_type: ItemType, value: f64) -> u32 {
    match item_type {
        ItemType::Int8 => value.round() as i8 as u8 as u32,
        ItemType::Int16 => value.round() as i16 as u16 as u32,
        ItemType::Int32 => value.round() as i32 as u32,
        ItemType::Fix32 => Fix32::from_f64(value).raw(),
        _ => value.round() as u32,
    }
}

const RANGE_LEN: usize = 22;
const ENUMERATION_HEADER_LEN: usize = 14;
const ARRAY_HEADER_LEN: usize = 6;
const ONE_VALUE_LEN: usize = 6;

/// Decode a container of the given `TWON_*` shape.
pub fn decode(con_type: u16, data: &[u8]) -> Result<CapabilityResult> {
    let shape = ContainerType::from_raw(con_type).ok_or(TwainError::UnsupportedContainer(con_type))?;
    let mut reader = Reader::new(data);

    let raw_type = reader.u16()?;
    let item_type = ItemType::from_raw(raw_type).ok_or(TwainError::UnsupportedType(raw_type))?;

    match shape {
        ContainerType::OneValue => {
            let value = if item_type.is_scalar() {
                ItemValue::Scalar(reader.u32()?)
            } else {
                reader.item(item_type)?
            };
            Ok(CapabilityResult::Basic { item_type, value })
        }
        ContainerType::Range => Ok(CapabilityResult::Range {
            item_type,
            min: reader.u32()?,
            max: reader.u32()?,
            step: reader.u32()?,
            default: reader.u32()?,
            current: reader.u32()?,
        }),
        ContainerType::Enumeration => {
            let count = reader.u32()? as usize;
            let current_index = reader.u32()?;
            let default_index = reader.u32()?;
            reader.require(count.saturating_mul(item_type.item_size()))?;
            let items = (0..count)
                .map(|_| reader.item(item_type))
                .collect::<Result<Vec<_>>>()?;
            Ok(CapabilityResult::Enumeration {
                item_type,
                current_index,
                default_index,
                items,
            })
        }
        ContainerType::Array => {
            let count = reader.u32()? as usize;
            reader.require(count.saturating_mul(item_type.item_size()))?;
            let items = (0..count)
                .map(|_| reader.item(item_type))
                .collect::<Result<Vec<_>>>()?;
            Ok(CapabilityResult::Array { item_type, items })
        }
    }
}

/// Build a 6-byte `TW_ONEVALUE` holding a scalar, ready for `MSG_SET`.
pub fn encode_one(item_type: ItemType, raw: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(ONE_VALUE_LEN);
    out.write_u16::<LittleEndian>(item_type.raw()).ok();
    out.write_u32::<LittleEndian>(raw).ok();
    out
}

fn write_one_value(out: &mut Vec<u8>, item_type: ItemType, value: &ItemValue) {
    match value {
        ItemValue::Scalar(raw) => {
            out.write_u32::<LittleEndian>(*raw).ok();
        }
        other => write_item(out, item_type, other),
    }
}

fn write_item(out: &mut Vec<u8>, item_type: ItemType, value: &ItemValue) {
    let size = item_type.item_size();
    match value {
        ItemValue::Scalar(raw) => {
            out.extend_from_slice(&raw.to_le_bytes()[..size.min(4)]);
        }
        ItemValue::Frame(frame) => {
            for v in [frame.left, frame.top, frame.right, frame.bottom] {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        ItemValue::Text(text) => {
            let mut bytes = text.as_bytes().to_vec();
            // Leave room for the terminator.
            bytes.truncate(size.saturating_sub(1));
            bytes.resize(size, 0);
            out.extend_from_slice(&bytes);
        }
    }
}

/// Bounds-checked little-endian reader over a container buffer.
struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }

    fn require(&self, needed: usize) -> Result<()> {
        let actual = self.remaining();
        if actual < needed {
            return Err(TwainError::MalformedContainer {
                needed: self.cursor.position() as usize + needed,
                actual: self.cursor.get_ref().len(),
            });
        }
        Ok(())
    }

    fn u16(&mut self) -> Result<u16> {
        self.require(2)?;
        self.cursor.read_u16::<LittleEndian>().map_err(|_| self.short(2))
    }

    fn u32(&mut self) -> Result<u32> {
        self.require(4)?;
        self.cursor.read_u32::<LittleEndian>().map_err(|_| self.short(4))
    }

    fn item(&mut self, item_type: ItemType) -> Result<ItemValue> {
        let value = match item_type.item_size() {
            1 => {
                self.require(1)?;
                ItemValue::Scalar(self.cursor.read_u8().map_err(|_| self.short(1))? as u32)
            }
            2 => ItemValue::Scalar(self.u16()? as u32),
            4 => ItemValue::Scalar(self.u32()?),
            16 => {
                let left = Fix32::from_raw(self.u32()?);
                let top = Fix32::from_raw(self.u32()?);
                let right = Fix32::from_raw(self.u32()?);
                let bottom = Fix32::from_raw(self.u32()?);
                ItemValue::Frame(Frame {
                    left,
                    top,
                    right,
                    bottom,
                })
            }
            size => {
                self.require(size)?;
                let mut buf = vec![0u8; size];
                self.cursor.read_exact(&mut buf).map_err(|_| self.short(size))?;
                let end = buf.iter().position(|&b| b == 0).unwrap_or(size);
                ItemValue::Text(String::from_utf8_lossy(&buf[..end]).into_owned())
            }
        };
        Ok(value)
    }

    fn short(&self, needed: usize) -> TwainError {
        TwainError::MalformedContainer {
            needed: self.cursor.position() as usize + needed,
            actual: self.cursor.get_ref().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_sizes() {
        assert_eq!(ItemType::Int8.item_size(), 1);
        assert_eq!(ItemType::Bool.item_size(), 2);
        assert_eq!(ItemType::Fix32.item_size(), 4);
        assert_eq!(ItemType::Handle.item_size(), 4);
        assert_eq!(ItemType::Frame.item_size(), 16);
        assert_eq!(ItemType::Str32.item_size(), 34);
        assert_eq!(ItemType::Str64.item_size(), 66);
        assert_eq!(ItemType::Str128.item_size(), 130);
        assert_eq!(ItemType::Str255.item_size(), 256);
        assert_eq!(ItemType::from_raw(0x000D), None);
    }

    #[test]
    fn test_encode_one_layout() {
        let bytes = encode_one(ItemType::UInt16, 2);
        assert_eq!(bytes, vec![0x04, 0x00, 0x02, 0x00, 0x00, 0x00]);

        let decoded = decode(TWON_ONEVALUE, &bytes).unwrap();
        assert_eq!(decoded.item_type(), ItemType::UInt16);
        assert_eq!(decoded.current_scalar(), Some(2));
    }

    #[test]
    fn test_decode_range() {
        let mut data = vec![0x07, 0x00];
        for v in [75u32, 600, 75, 150, 300] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(data.len(), RANGE_LEN);

        let range = decode(TWON_RANGE, &data).unwrap();
        assert_eq!(range.current_scalar(), Some(300));
        assert!(range.permits(225));
        assert!(!range.permits(200));
        assert!(!range.permits(675));
        assert_eq!(range.allowed_scalars(), vec![75, 150, 225, 300, 375, 450, 525, 600]);
    }

    #[test]
    fn test_fix32_and_signed_ranges() {
        let dpi = CapabilityResult::Range {
            item_type: ItemType::Fix32,
            min: Fix32::from_f32(50.0).raw(),
            max: Fix32::from_f32(1200.0).raw(),
            step: Fix32::from_f32(0.5).raw(),
            default: Fix32::from_f32(300.0).raw(),
            current: Fix32::from_f32(300.0).raw(),
        };
        assert!(dpi.permits(Fix32::from_f32(150.5).raw()));
        assert!(!dpi.permits(Fix32::from_f32(150.25).raw()));
        assert!(!dpi.permits(Fix32::from_f32(1600.0).raw()));

        let brightness = CapabilityResult::Range {
            item_type: ItemType::Int16,
            min: (-1000i16) as u16 as u32,
            max: 1000,
            step: 500,
            default: 0,
            current: 0,
        };
        assert!(brightness.permits((-500i16) as u16 as u32));
        assert_eq!(brightness.allowed_scalars().len(), 5);
        assert_eq!(numeric(ItemType::Int16, brightness.allowed_scalars()[0]), -1000.0);
    }

    #[test]
    fn test_decode_enumeration_of_u16() {
        // UInt16, 3 items, current #1, default #0, items 0 2 5
        let data = [
            0x04, 0x00, 3, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 5, 0,
        ];
        let result = decode(TWON_ENUMERATION, &data).unwrap();
        assert_eq!(result.u16_items(), vec![0, 2, 5]);
        assert_eq!(result.current_scalar(), Some(2));
        assert!(result.permits(5));
        assert!(!result.permits(1));
    }

    #[test]
    fn test_decode_array_and_strings() {
        let array = CapabilityResult::Array {
            item_type: ItemType::UInt16,
            items: vec![ItemValue::Scalar(0x0101), ItemValue::Scalar(0x1118)],
        };
        let bytes = array.encode();
        assert_eq!(bytes.len(), ARRAY_HEADER_LEN + 4);
        assert_eq!(decode(TWON_ARRAY, &bytes).unwrap(), array);

        let text = CapabilityResult::Basic {
            item_type: ItemType::Str32,
            value: ItemValue::Text("Flatbed".into()),
        };
        let bytes = text.encode();
        assert_eq!(bytes.len(), 2 + 34);
        assert_eq!(decode(TWON_ONEVALUE, &bytes).unwrap(), text);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            decode(TWON_ONEVALUE, &[0x0D, 0x00, 0, 0, 0, 0]),
            Err(TwainError::UnsupportedType(0x0D))
        ));
        assert!(matches!(
            decode(9, &[0x04, 0x00]),
            Err(TwainError::UnsupportedContainer(9))
        ));
        // Enumeration claiming more items than it carries.
        let short = [0x04, 0x00, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0];
        assert!(matches!(
            decode(TWON_ENUMERATION, &short),
            Err(TwainError::MalformedContainer { .. })
        ));
        assert!(decode(TWON_RANGE, &[0x04]).is_err());
    }

    #[test]
    fn test_frame_items_roundtrip() {
        let frame = Frame {
            left: Fix32::from_f32(0.0),
            top: Fix32::from_f32(0.5),
            right: Fix32::from_f32(8.5),
            bottom: Fix32::from_f32(11.0),
        };
        let result = CapabilityResult::Enumeration {
            item_type: ItemType::Frame,
            current_index: 0,
            default_index: 0,
            items: vec![ItemValue::Frame(frame)],
        };
        let bytes = result.encode();
        assert_eq!(bytes.len(), ENUMERATION_HEADER_LEN + 16);
        assert_eq!(decode(TWON_ENUMERATION, &bytes).unwrap(), result);
        assert_eq!(result.current_scalar(), None);
    }
}
