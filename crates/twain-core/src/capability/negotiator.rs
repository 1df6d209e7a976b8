//! Per-capability get/set policy.
//!
//! A [`Capability`] binds one capability id to an open source. Reads the
//! source rejects with a capability condition code (`CapUnsupported`,
//! `CapBadOperation`, `CapSeqError`, `BadCap`) are reported as unsupported
//! and negotiation reports the value the source kept instead. Any other
//! failure is a protocol error and is returned.

use tracing::{debug, info};

use super::codec::{self, CapabilityResult, ItemType};
use crate::dsm::{CapabilityRequest, DsmEntry};
use crate::error::{Result, TwainError};
use crate::protocol::constants::{
    MSG_GET, MSG_GETCURRENT, MSG_GETDEFAULT, MSG_RESET, MSG_SET, TWON_ONEVALUE,
};
use crate::protocol::{CapabilityId, ConditionCode, Fix32, Identity, ReturnCode, TwainValue};

/// Scalar value of a capability together with its wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicValue {
    pub item_type: ItemType,
    pub raw: u32,
}

impl BasicValue {
    /// Interpret as `T`, failing when the wire type differs.
    pub fn get<T: TwainValue>(&self, capability: CapabilityId) -> Result<T> {
        if self.item_type != T::ITEM_TYPE {
            return Err(TwainError::CapabilityTypeMismatch {
                capability,
                expected: T::ITEM_TYPE,
                actual: self.item_type,
            });
        }
        T::from_raw(self.raw).ok_or(TwainError::NotScalar(capability))
    }
}

/// Outcome of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Negotiated<T> {
    /// Value the source applies after negotiation; `None` when unreadable.
    pub current: Option<T>,
    /// Whether the requested value is now in effect.
    pub satisfied: bool,
}

impl<T> Negotiated<T> {
    fn unsupported() -> Self {
        Self {
            current: None,
            satisfied: false,
        }
    }
}

/// One capability of an open source.
pub struct Capability<'a, D: DsmEntry + ?Sized> {
    dsm: &'a D,
    app: &'a Identity,
    source: &'a Identity,
    id: CapabilityId,
}

/// Condition codes a source uses to say it does not offer a capability, or
/// not in the way it was asked for.
fn is_capability_condition(cc: ConditionCode) -> bool {
    matches!(
        cc,
        ConditionCode::CapUnsupported
            | ConditionCode::CapBadOperation
            | ConditionCode::CapSeqError
            | ConditionCode::BadCap
    )
}

impl<'a, D: DsmEntry + ?Sized> Capability<'a, D> {
    pub fn new(dsm: &'a D, app: &'a Identity, source: &'a Identity, id: CapabilityId) -> Self {
        Self {
            dsm,
            app,
            source,
            id,
        }
    }

    pub fn id(&self) -> CapabilityId {
        self.id
    }

    fn status(&self) -> ConditionCode {
        self.dsm.status(self.app, Some(self.source))
    }

    fn query(&self, msg: u16) -> Result<CapabilityResult> {
        let mut request = CapabilityRequest::query(self.id);
        let rc = self.dsm.capability(self.app, self.source, msg, &mut request);
        if !rc.is_success() {
            let cc = self.status();
            debug!(capability = %self.id, %rc, %cc, "Capability query failed");
            return Err(if rc == ReturnCode::Failure && is_capability_condition(cc) {
                TwainError::UnsupportedCapability {
                    capability: self.id,
                    rc,
                    cc,
                }
            } else {
                TwainError::Protocol {
                    operation: "Get capability",
                    rc,
                    cc,
                }
            });
        }
        let data = request.container.unwrap_or_default();
        codec::decode(request.con_type, &data)
    }

    /// `MSG_GET`: current value plus whatever constraint the source reports.
    pub fn get(&self) -> Result<CapabilityResult> {
        self.query(MSG_GET)
    }

    /// `MSG_GETCURRENT`.
    pub fn get_current(&self) -> Result<CapabilityResult> {
        self.query(MSG_GETCURRENT)
    }

    /// `MSG_GETDEFAULT`.
    pub fn get_default(&self) -> Result<CapabilityResult> {
        self.query(MSG_GETDEFAULT)
    }

    /// `MSG_RESET`: restore the power-on value and return it.
    pub fn reset(&self) -> Result<CapabilityResult> {
        self.query(MSG_RESET)
    }

    /// Current scalar value. Enumerations and ranges are re-read with
    /// `MSG_GETCURRENT`.
    pub fn get_basic_value(&self) -> Result<BasicValue> {
        let mut result = self.get()?;
        if matches!(
            result,
            CapabilityResult::Enumeration { .. } | CapabilityResult::Range { .. }
        ) {
            result = self.get_current()?;
        }
        match result {
            CapabilityResult::Basic { item_type, value } => match value.as_scalar() {
                Some(raw) => Ok(BasicValue { item_type, raw }),
                None => Err(TwainError::NotScalar(self.id)),
            },
            _ => Err(TwainError::NotScalar(self.id)),
        }
    }

    /// `MSG_SET` with a one-value container.
    ///
    /// `CheckStatus` means the source applied a nearby value; that is not an
    /// error.
    pub fn set_value(&self, item_type: ItemType, raw: u32) -> Result<()> {
        debug!(capability = %self.id, raw, ?item_type, "Setting capability");
        let mut request =
            CapabilityRequest::set(self.id, TWON_ONEVALUE, codec::encode_one(item_type, raw));
        let rc = self.dsm.capability(self.app, self.source, MSG_SET, &mut request);
        match rc {
            ReturnCode::Success => Ok(()),
            ReturnCode::CheckStatus => {
                debug!(capability = %self.id, "Value changed but not to requested value");
                Ok(())
            }
            ReturnCode::Failure => {
                let cc = self.status();
                tracing::error!(capability = %self.id, %cc, "Failed to set capability");
                Err(TwainError::CapabilitySet {
                    capability: self.id,
                    rc,
                    cc,
                })
            }
            other => {
                let cc = self.status();
                tracing::error!(capability = %self.id, rc = %other, %cc, "Failed to set capability");
                Err(TwainError::CapabilitySet {
                    capability: self.id,
                    rc: other,
                    cc,
                })
            }
        }
    }

    /// Set a scalar and return the value the source actually applied.
    ///
    /// The wire type must match the source's. Nothing is sent when the
    /// source already holds `raw`.
    pub fn set_scalar(&self, item_type: ItemType, raw: u32) -> Result<u32> {
        let current = self.get_basic_value()?;
        if current.item_type != item_type {
            return Err(TwainError::CapabilityTypeMismatch {
                capability: self.id,
                expected: item_type,
                actual: current.item_type,
            });
        }
        if current.raw == raw {
            return Ok(raw);
        }

        self.set_value(item_type, raw)?;

        let applied = self.get_basic_value()?.raw;
        if applied != raw {
            info!(
                capability = %self.id,
                requested = raw,
                current = applied,
                "Unable to set specified value"
            );
        }
        Ok(applied)
    }

    /// Read the current value and the permitted values, then set `requested`
    /// if the source offers it.
    ///
    /// Never fails because the source lacks the capability or reports it
    /// with a different type; only hard protocol failures are returned.
    pub fn negotiate<T: TwainValue>(&self, requested: Option<T>) -> Result<Negotiated<T>> {
        let shape = match self.get() {
            Ok(shape) => shape,
            Err(e) if e.is_unsupported() => {
                debug!(capability = %self.id, error = %e, "Capability not negotiable");
                return Ok(Negotiated::unsupported());
            }
            Err(e) => return Err(e),
        };

        if shape.item_type() != T::ITEM_TYPE {
            debug!(
                capability = %self.id,
                expected = ?T::ITEM_TYPE,
                actual = ?shape.item_type(),
                "Capability type mismatch, treating as unsupported"
            );
            return Ok(Negotiated::unsupported());
        }

        let current = self.current_of(&shape)?;
        let Some(requested) = requested else {
            return Ok(Negotiated {
                current,
                satisfied: false,
            });
        };

        if current == Some(requested) {
            return Ok(Negotiated {
                current,
                satisfied: true,
            });
        }

        let offered = match &shape {
            CapabilityResult::Array { .. } => false,
            CapabilityResult::Basic { .. } => true,
            CapabilityResult::Range { .. } | CapabilityResult::Enumeration { .. } => {
                shape.permits(requested.to_raw())
            }
        };
        if !offered {
            debug!(
                capability = %self.id,
                requested = ?requested,
                current = ?current,
                "Requested value not offered"
            );
            return Ok(Negotiated {
                current,
                satisfied: false,
            });
        }

        match self.set_value(T::ITEM_TYPE, requested.to_raw()) {
            Ok(()) => {}
            Err(e) if e.is_unsupported() => {
                return Ok(Negotiated {
                    current,
                    satisfied: false,
                });
            }
            Err(e) => return Err(e),
        }

        // Confirm; a source that cannot report back is trusted.
        let applied = match self.get_basic_value() {
            Ok(value) => T::from_raw(value.raw),
            Err(_) => Some(requested),
        };
        Ok(Negotiated {
            current: applied,
            satisfied: applied == Some(requested),
        })
    }

    fn current_of<T: TwainValue>(&self, shape: &CapabilityResult) -> Result<Option<T>> {
        if let Some(raw) = shape.current_scalar() {
            return Ok(T::from_raw(raw));
        }
        match self.get_current() {
            Ok(current) => Ok(current.current_scalar().and_then(T::from_raw)),
            Err(e) if e.is_unsupported() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn negotiate_bool(&self, requested: Option<bool>) -> Result<Negotiated<bool>> {
        self.negotiate(requested)
    }

    pub fn negotiate_enum<T: TwainValue>(&self, requested: Option<T>) -> Result<Negotiated<T>> {
        self.negotiate(requested)
    }

    /// Fixed-point negotiation from a float request.
    pub fn negotiate_fix32(&self, requested: Option<f32>) -> Result<Negotiated<Fix32>> {
        self.negotiate(requested.map(Fix32::from_f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::codec::ItemValue;
    use crate::dsm::MockDsm;
    use crate::protocol::constants::MSG_OPENDS;
    use crate::protocol::{Units, WindowHandle};

    fn open(mock: &MockDsm) -> (Identity, Identity) {
        let mut source = mock.add_source("Scanner");
        let mut app = Identity::application("test");
        mock.open_dsm(&mut app, WindowHandle::NULL);
        mock.identity(&app, MSG_OPENDS, &mut source);
        (app, source)
    }

    fn units_enum(current: u32) -> CapabilityResult {
        CapabilityResult::Enumeration {
            item_type: ItemType::UInt16,
            current_index: current,
            default_index: 0,
            items: vec![ItemValue::Scalar(0), ItemValue::Scalar(1), ItemValue::Scalar(5)],
        }
    }

    #[test]
    fn test_get_basic_value_rereads_current() {
        let mock = MockDsm::new();
        let (app, source) = open(&mock);
        mock.add_capability(CapabilityId::UNITS, units_enum(2));

        let cap = Capability::new(&mock, &app, &source, CapabilityId::UNITS);
        let value = cap.get_basic_value().unwrap();
        assert_eq!(value.raw, 5);
        assert_eq!(value.get::<Units>(CapabilityId::UNITS).unwrap(), Units::Pixels);
        assert_eq!(mock.call_count(crate::protocol::DAT_CAPABILITY, MSG_GETCURRENT), 1);
    }

    #[test]
    fn test_negotiate_enum_outcomes() {
        let mock = MockDsm::new();
        let (app, source) = open(&mock);
        mock.add_capability(CapabilityId::UNITS, units_enum(0));
        let cap = Capability::new(&mock, &app, &source, CapabilityId::UNITS);

        let none = cap.negotiate_enum::<Units>(None).unwrap();
        assert_eq!(none.current, Some(Units::Inches));
        assert!(!none.satisfied);

        let same = cap.negotiate_enum(Some(Units::Inches)).unwrap();
        assert!(same.satisfied);

        let unoffered = cap.negotiate_enum(Some(Units::Millimeters)).unwrap();
        assert_eq!(unoffered.current, Some(Units::Inches));
        assert!(!unoffered.satisfied);

        mock.clear_calls();
        let set = cap.negotiate_enum(Some(Units::Centimeters)).unwrap();
        assert_eq!(set.current, Some(Units::Centimeters));
        assert!(set.satisfied);
        assert_eq!(mock.call_count(crate::protocol::DAT_CAPABILITY, MSG_SET), 1);
        assert_eq!(mock.current_value(CapabilityId::UNITS), Some(1));
    }

    #[test]
    fn test_negotiate_absent_and_mismatched() {
        let mock = MockDsm::new();
        let (app, source) = open(&mock);
        mock.add_capability(
            CapabilityId::DUPLEX_ENABLED,
            CapabilityResult::Basic {
                item_type: ItemType::UInt16,
                value: ItemValue::Scalar(0),
            },
        );

        let absent = Capability::new(&mock, &app, &source, CapabilityId::AUTO_FEED);
        assert_eq!(absent.negotiate_bool(Some(true)).unwrap(), Negotiated::unsupported());

        let wrong_type = Capability::new(&mock, &app, &source, CapabilityId::DUPLEX_ENABLED);
        let outcome = wrong_type.negotiate_bool(Some(true)).unwrap();
        assert!(!outcome.satisfied);
        assert_eq!(outcome.current, None);
        assert_eq!(mock.call_count(crate::protocol::DAT_CAPABILITY, MSG_SET), 0);
    }

    #[test]
    fn test_hard_read_failure_propagates() {
        let mock = MockDsm::new();
        let (app, source) = open(&mock);
        mock.add_capability(CapabilityId::UNITS, units_enum(0));
        let cap = Capability::new(&mock, &app, &source, CapabilityId::UNITS);

        mock.force(
            crate::protocol::DAT_CAPABILITY,
            MSG_GET,
            ReturnCode::Failure,
            ConditionCode::SeqError,
        );
        let err = cap.negotiate_enum(Some(Units::Centimeters)).unwrap_err();
        assert!(matches!(
            err,
            TwainError::Protocol {
                rc: ReturnCode::Failure,
                cc: ConditionCode::SeqError,
                ..
            }
        ));
        assert!(!err.is_unsupported());
        assert_eq!(mock.call_count(crate::protocol::DAT_CAPABILITY, MSG_SET), 0);

        mock.force(
            crate::protocol::DAT_CAPABILITY,
            MSG_GET,
            ReturnCode::Failure,
            ConditionCode::CapSeqError,
        );
        assert_eq!(
            cap.negotiate_enum(Some(Units::Centimeters)).unwrap(),
            Negotiated::unsupported()
        );

        mock.force(
            crate::protocol::DAT_CAPABILITY,
            MSG_GET,
            ReturnCode::Failure,
            ConditionCode::LowMemory,
        );
        assert!(matches!(
            cap.get(),
            Err(TwainError::Protocol {
                cc: ConditionCode::LowMemory,
                ..
            })
        ));
        assert_eq!(mock.current_value(CapabilityId::UNITS), Some(0));
    }

    #[test]
    fn test_negotiate_fix32_range_clamps() {
        let mock = MockDsm::new();
        let (app, source) = open(&mock);
        mock.add_capability(
            CapabilityId::X_RESOLUTION,
            CapabilityResult::Range {
                item_type: ItemType::Fix32,
                min: Fix32::from_f32(75.0).raw(),
                max: Fix32::from_f32(600.0).raw(),
                step: Fix32::from_f32(75.0).raw(),
                default: Fix32::from_f32(150.0).raw(),
                current: Fix32::from_f32(150.0).raw(),
            },
        );
        let cap = Capability::new(&mock, &app, &source, CapabilityId::X_RESOLUTION);

        let ok = cap.negotiate_fix32(Some(300.0)).unwrap();
        assert!(ok.satisfied);
        assert_eq!(ok.current.map(|v| v.to_f32()), Some(300.0));

        let off_step = cap.negotiate_fix32(Some(200.0)).unwrap();
        assert!(!off_step.satisfied);
        assert_eq!(off_step.current.map(|v| v.to_f32()), Some(300.0));
    }

    #[test]
    fn test_set_value_soft_and_hard_failures() {
        let mock = MockDsm::new();
        let (app, source) = open(&mock);
        mock.add_capability(
            CapabilityId::XFER_COUNT,
            CapabilityResult::Basic {
                item_type: ItemType::Int16,
                value: ItemValue::Scalar(1),
            },
        );
        let cap = Capability::new(&mock, &app, &source, CapabilityId::XFER_COUNT);

        mock.force(
            crate::protocol::DAT_CAPABILITY,
            MSG_SET,
            ReturnCode::CheckStatus,
            ConditionCode::Success,
        );
        assert!(cap.set_value(ItemType::Int16, 3).is_ok());

        mock.force(
            crate::protocol::DAT_CAPABILITY,
            MSG_SET,
            ReturnCode::Failure,
            ConditionCode::BadValue,
        );
        let err = cap.set_value(ItemType::Int16, 3).unwrap_err();
        assert!(matches!(
            err,
            TwainError::CapabilitySet {
                cc: ConditionCode::BadValue,
                ..
            }
        ));
        assert!(!err.is_unsupported());

        mock.force(
            crate::protocol::DAT_CAPABILITY,
            MSG_SET,
            ReturnCode::Cancel,
            ConditionCode::OperationError,
        );
        let err = cap.set_value(ItemType::Int16, 3).unwrap_err();
        assert_eq!(err.return_code(), Some(ReturnCode::Cancel));
        assert_eq!(err.condition_code(), Some(ConditionCode::OperationError));

        assert_eq!(cap.set_scalar(ItemType::Int16, (-1i16).to_raw()).unwrap(), 0xFFFF);
        assert!(matches!(
            cap.set_scalar(ItemType::Bool, 1),
            Err(TwainError::CapabilityTypeMismatch { .. })
        ));
    }
}
