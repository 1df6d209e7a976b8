//! Return codes (`TWRC_*`) and condition codes (`TWCC_*`).
//!
//! Every `DSM_Entry` call yields a return code. When it reports a failure,
//! a follow-up `DG_CONTROL / DAT_STATUS / MSG_GET` yields the condition
//! code that explains it.

use std::fmt;

/// Result of a single protocol triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Success,
    Failure,
    CheckStatus,
    Cancel,
    DsEvent,
    NotDsEvent,
    XferDone,
    EndOfList,
    InfoNotSupported,
    DataNotAvailable,
    Busy,
    ScannerLocked,
    Unknown(u16),
}

impl ReturnCode {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::Failure,
            2 => Self::CheckStatus,
            3 => Self::Cancel,
            4 => Self::DsEvent,
            5 => Self::NotDsEvent,
            6 => Self::XferDone,
            7 => Self::EndOfList,
            8 => Self::InfoNotSupported,
            9 => Self::DataNotAvailable,
            10 => Self::Busy,
            11 => Self::ScannerLocked,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> u16 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::CheckStatus => 2,
            Self::Cancel => 3,
            Self::DsEvent => 4,
            Self::NotDsEvent => 5,
            Self::XferDone => 6,
            Self::EndOfList => 7,
            Self::InfoNotSupported => 8,
            Self::DataNotAvailable => 9,
            Self::Busy => 10,
            Self::ScannerLocked => 11,
            Self::Unknown(raw) => *raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "TWRC({raw})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Device-reported reason for the last failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionCode {
    #[default]
    Success,
    Bummer,
    LowMemory,
    NoDs,
    MaxConnections,
    OperationError,
    BadCap,
    BadProtocol,
    BadValue,
    SeqError,
    BadDest,
    CapUnsupported,
    CapBadOperation,
    CapSeqError,
    Denied,
    FileExists,
    FileNotFound,
    NotEmpty,
    PaperJam,
    PaperDoubleFeed,
    FileWriteError,
    CheckDeviceOnline,
    Interlock,
    DamagedCorner,
    FocusError,
    DocTooLight,
    DocTooDark,
    NoMedia,
    Unknown(u16),
}

impl ConditionCode {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::Bummer,
            2 => Self::LowMemory,
            3 => Self::NoDs,
            4 => Self::MaxConnections,
            5 => Self::OperationError,
            6 => Self::BadCap,
            9 => Self::BadProtocol,
            10 => Self::BadValue,
            11 => Self::SeqError,
            12 => Self::BadDest,
            13 => Self::CapUnsupported,
            14 => Self::CapBadOperation,
            15 => Self::CapSeqError,
            16 => Self::Denied,
            17 => Self::FileExists,
            18 => Self::FileNotFound,
            19 => Self::NotEmpty,
            20 => Self::PaperJam,
            21 => Self::PaperDoubleFeed,
            22 => Self::FileWriteError,
            23 => Self::CheckDeviceOnline,
            24 => Self::Interlock,
            25 => Self::DamagedCorner,
            26 => Self::FocusError,
            27 => Self::DocTooLight,
            28 => Self::DocTooDark,
            29 => Self::NoMedia,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> u16 {
        match self {
            Self::Success => 0,
            Self::Bummer => 1,
            Self::LowMemory => 2,
            Self::NoDs => 3,
            Self::MaxConnections => 4,
            Self::OperationError => 5,
            Self::BadCap => 6,
            Self::BadProtocol => 9,
            Self::BadValue => 10,
            Self::SeqError => 11,
            Self::BadDest => 12,
            Self::CapUnsupported => 13,
            Self::CapBadOperation => 14,
            Self::CapSeqError => 15,
            Self::Denied => 16,
            Self::FileExists => 17,
            Self::FileNotFound => 18,
            Self::NotEmpty => 19,
            Self::PaperJam => 20,
            Self::PaperDoubleFeed => 21,
            Self::FileWriteError => 22,
            Self::CheckDeviceOnline => 23,
            Self::Interlock => 24,
            Self::DamagedCorner => 25,
            Self::FocusError => 26,
            Self::DocTooLight => 27,
            Self::DocTooDark => 28,
            Self::NoMedia => 29,
            Self::Unknown(raw) => *raw,
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "TWCC({raw})"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_raw_mapping() {
        for raw in 0..=11u16 {
            assert_eq!(ReturnCode::from_raw(raw).raw(), raw);
        }
        assert_eq!(ReturnCode::from_raw(42), ReturnCode::Unknown(42));
        assert!(ReturnCode::from_raw(0).is_success());
        assert_eq!(ReturnCode::XferDone.to_string(), "XferDone");
    }

    #[test]
    fn test_condition_code_gaps_are_unknown() {
        // 7 and 8 are unassigned in the protocol.
        assert_eq!(ConditionCode::from_raw(7), ConditionCode::Unknown(7));
        assert_eq!(ConditionCode::from_raw(13), ConditionCode::CapUnsupported);
        assert_eq!(ConditionCode::CapUnsupported.raw(), 13);
        assert_eq!(ConditionCode::Unknown(99).to_string(), "TWCC(99)");
    }
}
