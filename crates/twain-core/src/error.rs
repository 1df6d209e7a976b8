//! Error types for the TWAIN driver layer.

use thiserror::Error;

use crate::capability::codec::ItemType;
use crate::protocol::{CapabilityId, ConditionCode, ReturnCode};

#[derive(Error, Debug)]
pub enum TwainError {
    #[error("Data source manager unavailable: {0}")]
    ManagerUnavailable(String),

    #[error("Failed to open data source manager: {rc} ({cc})")]
    ManagerOpen { rc: ReturnCode, cc: ConditionCode },

    #[error("Failed to open source '{product}': {rc} ({cc})")]
    SourceOpen {
        product: String,
        rc: ReturnCode,
        cc: ConditionCode,
    },

    #[error("Failed to enable source: {rc} ({cc})")]
    SourceEnable { rc: ReturnCode, cc: ConditionCode },

    #[error("Document feeder is empty")]
    FeederEmpty,

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("No source selected")]
    NoSource,

    #[error("Capability {capability} not supported: {rc} ({cc})")]
    UnsupportedCapability {
        capability: CapabilityId,
        rc: ReturnCode,
        cc: ConditionCode,
    },

    #[error("Capability {capability} has type {actual:?}, expected {expected:?}")]
    CapabilityTypeMismatch {
        capability: CapabilityId,
        expected: ItemType,
        actual: ItemType,
    },

    #[error("Capability {0} has no scalar value")]
    NotScalar(CapabilityId),

    #[error("Unsupported item type: 0x{0:04X}")]
    UnsupportedType(u16),

    #[error("Unsupported container type: {0}")]
    UnsupportedContainer(u16),

    #[error("Malformed container: need {needed} bytes, got {actual}")]
    MalformedContainer { needed: usize, actual: usize },

    #[error("Failed to set capability {capability}: {rc} ({cc})")]
    CapabilitySet {
        capability: CapabilityId,
        rc: ReturnCode,
        cc: ConditionCode,
    },

    #[error("{operation} failed: {rc} ({cc})")]
    Transfer {
        operation: &'static str,
        rc: ReturnCode,
        cc: ConditionCode,
    },

    #[error("Failed to allocate {0} byte transfer buffer")]
    BufferAllocation(u32),

    #[error("Unsupported pixel format: {0} bits per pixel")]
    UnsupportedPixelFormat(u16),

    #[error("Image data truncated: need {needed} bytes, got {actual}")]
    TruncatedImageData { needed: usize, actual: usize },

    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),

    #[error("Scan observer panicked: {0}")]
    ObserverPanicked(String),

    #[error("{operation} failed: {rc} ({cc})")]
    Protocol {
        operation: &'static str,
        rc: ReturnCode,
        cc: ConditionCode,
    },
}

impl TwainError {
    /// Whether this error only means "the source does not offer that knob".
    ///
    /// Negotiation swallows these; everything else is a hard failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            TwainError::UnsupportedCapability { .. }
                | TwainError::CapabilityTypeMismatch { .. }
                | TwainError::NotScalar(_)
                | TwainError::UnsupportedType(_)
                | TwainError::UnsupportedContainer(_)
                | TwainError::MalformedContainer { .. }
        )
    }

    /// Protocol return code carried by this error, if any.
    pub fn return_code(&self) -> Option<ReturnCode> {
        match self {
            TwainError::ManagerOpen { rc, .. }
            | TwainError::SourceOpen { rc, .. }
            | TwainError::SourceEnable { rc, .. }
            | TwainError::UnsupportedCapability { rc, .. }
            | TwainError::CapabilitySet { rc, .. }
            | TwainError::Transfer { rc, .. }
            | TwainError::Protocol { rc, .. } => Some(*rc),
            _ => None,
        }
    }

    /// Device-reported condition code carried by this error, if any.
    pub fn condition_code(&self) -> Option<ConditionCode> {
        match self {
            TwainError::ManagerOpen { cc, .. }
            | TwainError::SourceOpen { cc, .. }
            | TwainError::SourceEnable { cc, .. }
            | TwainError::UnsupportedCapability { cc, .. }
            | TwainError::CapabilitySet { cc, .. }
            | TwainError::Transfer { cc, .. }
            | TwainError::Protocol { cc, .. } => Some(*cc),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TwainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_classification() {
        let absent = TwainError::UnsupportedCapability {
            capability: CapabilityId::DUPLEX,
            rc: ReturnCode::Failure,
            cc: ConditionCode::CapUnsupported,
        };
        assert!(absent.is_unsupported());
        assert!(TwainError::UnsupportedType(0x42).is_unsupported());

        let hard = TwainError::Transfer {
            operation: "Native transfer",
            rc: ReturnCode::Failure,
            cc: ConditionCode::PaperJam,
        };
        assert!(!hard.is_unsupported());
        assert_eq!(hard.condition_code(), Some(ConditionCode::PaperJam));
        assert_eq!(hard.to_string(), "Native transfer failed: Failure (PaperJam)");
        assert!(!TwainError::FeederEmpty.is_unsupported());
        assert_eq!(TwainError::FeederEmpty.return_code(), None);
    }
}
