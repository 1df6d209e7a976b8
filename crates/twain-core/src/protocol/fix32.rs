//! `TW_FIX32`: 16.16 fixed point with a signed whole part.

use std::fmt;

/// Fixed-point value used for resolutions and frame coordinates.
///
/// On the wire the whole part comes first, so reading the four bytes as a
/// little-endian `u32` puts `whole` in the low half and `frac` in the high
/// half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Fix32 {
    pub whole: i16,
    pub frac: u16,
}

impl Fix32 {
    /// Quantization step of the format.
    pub const EPSILON: f64 = 1.0 / 65536.0;

    pub const fn new(whole: i16, frac: u16) -> Self {
        Self { whole, frac }
    }

    /// Nearest representable value, saturating outside `[-32768, 32768)`.
    pub fn from_f32(value: f32) -> Self {
        Self::from_f64(value as f64)
    }

    pub fn from_f64(value: f64) -> Self {
        let scaled = if value < 0.0 {
            value * 65536.0 - 0.5
        } else {
            value * 65536.0 + 0.5
        };
        // `as` saturates, which clamps out-of-range requests.
        let fixed = scaled as i32;
        Self {
            whole: (fixed >> 16) as i16,
            frac: (fixed & 0xFFFF) as u16,
        }
    }

    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    pub fn to_f64(&self) -> f64 {
        self.whole as f64 + self.frac as f64 / 65536.0
    }

    /// Decode from the 32-bit item slot of a capability container.
    pub fn from_raw(raw: u32) -> Self {
        Self {
            whole: (raw & 0xFFFF) as u16 as i16,
            frac: (raw >> 16) as u16,
        }
    }

    /// Encode into the 32-bit item slot of a capability container.
    pub fn raw(&self) -> u32 {
        (self.whole as u16 as u32) | ((self.frac as u32) << 16)
    }

    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.raw().to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self::from_raw(u32::from_le_bytes(bytes))
    }
}

impl From<f32> for Fix32 {
    fn from(value: f32) -> Self {
        Self::from_f32(value)
    }
}

impl fmt::Display for Fix32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_roundtrip_within_quantization() {
        for value in [0.0f64, 1.0, 75.0, 300.0, 8.5, 11.69, -1.25, -0.001, 32767.99, -32768.0] {
            let fixed = Fix32::from_f64(value);
            assert!(
                (fixed.to_f64() - value).abs() <= Fix32::EPSILON,
                "{value} -> {fixed:?} -> {}",
                fixed.to_f64()
            );
        }
    }

    #[test]
    fn test_raw_roundtrip_is_exact() {
        for raw in [0u32, 1, 0x0001_012C, 0x8000_FFFF, 0xFFFF_FFFF, 0x1234_5678] {
            assert_eq!(Fix32::from_raw(raw).raw(), raw);
        }
        let dpi = Fix32::from_f32(300.0);
        assert_eq!(dpi, Fix32::new(300, 0));
        assert_eq!(dpi.raw(), 300);
        assert_eq!(Fix32::from_le_bytes(dpi.to_le_bytes()), dpi);
    }

    #[test]
    fn test_negative_values_keep_positive_fraction() {
        let fixed = Fix32::from_f64(-1.25);
        assert_eq!(fixed.whole, -2);
        assert_eq!(fixed.frac, 0xC000);
        assert_eq!(fixed.to_f64(), -1.25);
    }
}
