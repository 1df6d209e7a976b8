//! Data source handle.
//!
//! A [`DataSource`] is one scanner known to the manager. It owns the source
//! identity, tracks the protocol state (3 to 7) and applies a
//! [`ScanSettings`] record through capability negotiation when opened.
//!
//! # Negotiation
//!
//! Every capability is negotiated on its own. A source that lacks a
//! capability, reports it with another type, or rejects the value only
//! causes that one step to be skipped; the value the source kept is written
//! back into the settings.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::capability::{Capability, CapabilityResult, Negotiated};
use crate::dsm::DsmEntry;
use crate::error::{Result, TwainError};
use crate::events::{ScanEvent, ScanObserver};
use crate::protocol::constants::{
    MSG_CLOSEDS, MSG_DISABLEDS, MSG_ENABLEDS, MSG_ENDXFER, MSG_GET, MSG_GETDEFAULT, MSG_GETFIRST,
    MSG_GETNEXT, MSG_OPENDS, MSG_RESET, MSG_SET, MSG_USERSELECT,
};
use crate::protocol::{
    CapabilityId, ConditionCode, Duplex, Fix32, Identity, ImageLayout, PendingXfers, ReturnCode,
    TransferMechanism, UserInterface, WindowHandle,
};
use crate::settings::{AreaSettings, ColourMode, ScanSettings, TransferMode};
use crate::state::{SourceState, SourceStateMachine};

// ============================================================================
// Source lookup
// ============================================================================

/// Identities of every source the manager knows, in manager order.
pub fn source_identities<D: DsmEntry + ?Sized>(dsm: &D, app: &Identity) -> Result<Vec<Identity>> {
    let mut sources = Vec::new();
    let mut msg = MSG_GETFIRST;
    loop {
        let mut identity = Identity::default();
        let rc = dsm.identity(app, msg, &mut identity);
        match rc {
            ReturnCode::Success => sources.push(identity),
            ReturnCode::EndOfList => break,
            _ => {
                let cc = dsm.status(app, None);
                return Err(TwainError::Protocol {
                    operation: "Enumerate sources",
                    rc,
                    cc,
                });
            }
        }
        msg = MSG_GETNEXT;
    }
    Ok(sources)
}

/// Identity of the manager's default source.
pub fn default_identity<D: DsmEntry + ?Sized>(dsm: &D, app: &Identity) -> Result<Identity> {
    let mut identity = Identity::default();
    let rc = dsm.identity(app, MSG_GETDEFAULT, &mut identity);
    if rc != ReturnCode::Success {
        let cc = dsm.status(app, None);
        return Err(TwainError::Protocol {
            operation: "Get default source",
            rc,
            cc,
        });
    }
    Ok(identity)
}

/// Identity whose product name matches `name`, ignoring case.
pub fn find_identity<D: DsmEntry + ?Sized>(
    dsm: &D,
    app: &Identity,
    name: &str,
) -> Result<Identity> {
    source_identities(dsm, app)?
        .into_iter()
        .find(|identity| identity.product_name.eq_ignore_ascii_case(name))
        .ok_or_else(|| TwainError::SourceNotFound(name.to_string()))
}

// ============================================================================
// Data source
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationMode {
    /// Push the requested values to the source.
    Apply,
    /// Only read what the source currently uses.
    Read,
}

/// One scanner and its protocol state.
pub struct DataSource<D: DsmEntry + ?Sized, O: ScanObserver + ?Sized> {
    dsm: Arc<D>,
    app: Identity,
    identity: Identity,
    parent: WindowHandle,
    observer: Arc<O>,
    machine: SourceStateMachine,
    supported: Vec<CapabilityId>,
    extended: Vec<CapabilityId>,
    keep_open: bool,
}

impl<D: DsmEntry + ?Sized, O: ScanObserver + ?Sized> DataSource<D, O> {
    /// Wrap a source identity. Both identities are copied so the manager
    /// writing into them later cannot affect the caller.
    pub fn new(
        dsm: Arc<D>,
        app: &Identity,
        identity: &Identity,
        parent: WindowHandle,
        observer: Arc<O>,
    ) -> Self {
        Self {
            dsm,
            app: app.clone(),
            identity: identity.clone(),
            parent,
            observer,
            machine: SourceStateMachine::new(),
            supported: Vec::new(),
            extended: Vec::new(),
            keep_open: false,
        }
    }

    /// The manager's default source.
    pub fn default_source(
        dsm: Arc<D>,
        app: &Identity,
        parent: WindowHandle,
        observer: Arc<O>,
    ) -> Result<Self> {
        let identity = default_identity(&*dsm, app)?;
        Ok(Self::new(dsm, app, &identity, parent, observer))
    }

    /// Let the user pick a source in the manager's dialog. `None` when the
    /// dialog was cancelled.
    pub fn user_selected(
        dsm: Arc<D>,
        app: &Identity,
        parent: WindowHandle,
        observer: Arc<O>,
    ) -> Result<Option<Self>> {
        let mut identity = Identity::default();
        let rc = dsm.identity(app, MSG_USERSELECT, &mut identity);
        match rc {
            ReturnCode::Success => Ok(Some(Self::new(dsm, app, &identity, parent, observer))),
            ReturnCode::Cancel => {
                info!("Source selection cancelled");
                Ok(None)
            }
            _ => {
                let cc = dsm.status(app, None);
                Err(TwainError::Protocol {
                    operation: "Select source",
                    rc,
                    cc,
                })
            }
        }
    }

    /// Every source the manager knows.
    pub fn all_sources(
        dsm: Arc<D>,
        app: &Identity,
        parent: WindowHandle,
        observer: Arc<O>,
    ) -> Result<Vec<Self>> {
        let identities = source_identities(&*dsm, app)?;
        Ok(identities
            .iter()
            .map(|identity| Self::new(dsm.clone(), app, identity, parent, observer.clone()))
            .collect())
    }

    /// The source whose product name matches `name`, ignoring case.
    pub fn by_name(
        name: &str,
        dsm: Arc<D>,
        app: &Identity,
        parent: WindowHandle,
        observer: Arc<O>,
    ) -> Result<Self> {
        let identity = find_identity(&*dsm, app, name)?;
        Ok(Self::new(dsm, app, &identity, parent, observer))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn product_name(&self) -> &str {
        &self.identity.product_name
    }

    pub fn state(&self) -> SourceState {
        self.machine.state()
    }

    /// Every state this handle has been in.
    pub fn state_history(&self) -> &[SourceState] {
        self.machine.history()
    }

    /// Capabilities from `CAP_SUPPORTEDCAPS`, read when the source was opened.
    pub fn supported_capabilities(&self) -> &[CapabilityId] {
        &self.supported
    }

    /// Capabilities from `CAP_EXTENDEDCAPS`, read when the source was opened.
    pub fn extended_capabilities(&self) -> &[CapabilityId] {
        &self.extended
    }

    pub fn supports(&self, id: CapabilityId) -> bool {
        self.supported.contains(&id)
    }

    /// Keep the source enabled after a transfer batch.
    pub fn keep_open(&self) -> bool {
        self.keep_open
    }

    pub fn set_keep_open(&mut self, keep_open: bool) {
        self.keep_open = keep_open;
    }

    /// Bind a capability of this source.
    pub fn capability(&self, id: CapabilityId) -> Capability<'_, D> {
        Capability::new(&*self.dsm, &self.app, &self.identity, id)
    }

    pub(crate) fn dsm(&self) -> &D {
        &self.dsm
    }

    pub(crate) fn dsm_arc(&self) -> Arc<D> {
        self.dsm.clone()
    }

    pub(crate) fn app(&self) -> &Identity {
        &self.app
    }

    pub(crate) fn observer(&self) -> &O {
        &self.observer
    }

    pub(crate) fn condition_code(&self) -> ConditionCode {
        self.dsm.status(&self.app, Some(&self.identity))
    }

    pub(crate) fn goto_state(&mut self, to: SourceState) {
        if let Some(from) = self.machine.goto_state(to) {
            self.observer.on_event(&ScanEvent::StateChanged { from, to });
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `MSG_OPENDS` unless already open, then refresh the capability lists.
    ///
    /// A source that cannot list its capabilities is still usable; the
    /// lists are left empty.
    pub fn open_source(&mut self) -> Result<()> {
        if self.state() < SourceState::Open {
            let rc = self.dsm.identity(&self.app, MSG_OPENDS, &mut self.identity);
            if rc != ReturnCode::Success {
                let cc = self.dsm.status(&self.app, None);
                return Err(TwainError::SourceOpen {
                    product: self.identity.product_name.clone(),
                    rc,
                    cc,
                });
            }
            self.goto_state(SourceState::Open);
            self.observer.on_event(&ScanEvent::SourceOpened {
                product: self.identity.product_name.clone(),
            });
        }

        let supported = self
            .capability_list(CapabilityId::SUPPORTED_CAPS)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Unable to read supported capabilities");
                Vec::new()
            });
        self.supported = supported;

        let extended = if self.supports(CapabilityId::EXTENDED_CAPS) {
            self.capability_list(CapabilityId::EXTENDED_CAPS)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Unable to read extended capabilities");
                    Vec::new()
                })
        } else {
            Vec::new()
        };
        self.extended = extended;

        debug!(
            supported = self.supported.len(),
            extended = self.extended.len(),
            "Capability lists read"
        );
        Ok(())
    }

    fn capability_list(&self, id: CapabilityId) -> Result<Vec<CapabilityId>> {
        let list = self.capability(id).get()?;
        Ok(list.u16_items().into_iter().map(CapabilityId).collect())
    }

    /// Open, apply `settings` and enable the source.
    ///
    /// Returns `false` when the user cancelled the source's dialog. Values
    /// the source actually applied are written back into `settings`.
    #[instrument(skip(self, settings))]
    pub fn open(&mut self, settings: &mut ScanSettings) -> Result<bool> {
        self.open_source()?;

        if settings.abort_when_no_paper_detectable && !self.paper_detectable() {
            return Err(TwainError::FeederEmpty);
        }

        if settings.debug_capabilities {
            self.debug_capabilities();
        }

        self.keep_open = settings.keep_open;
        self.negotiate_settings(settings, NegotiationMode::Apply);
        self.enable(settings)
    }

    /// `MSG_ENABLEDS`.
    ///
    /// The source's own dialog is shown when requested, or whenever the
    /// source cannot run without it.
    pub fn enable(&mut self, settings: &ScanSettings) -> Result<bool> {
        let ui_controllable = self.supports(CapabilityId::UI_CONTROLLABLE)
            && self
                .read_scalar::<bool>(CapabilityId::UI_CONTROLLABLE)
                .unwrap_or(false);

        let mut ui = UserInterface {
            show_ui: !ui_controllable || settings.show_driver_ui,
            modal_ui: true,
            parent: self.parent,
        };
        let rc = self
            .dsm
            .user_interface(&self.app, &self.identity, MSG_ENABLEDS, &mut ui);
        match rc {
            ReturnCode::Success => {
                self.goto_state(SourceState::Enabled);
                Ok(true)
            }
            ReturnCode::CheckStatus => {
                debug!("Source shows its own UI regardless of the request");
                self.goto_state(SourceState::Enabled);
                Ok(true)
            }
            ReturnCode::Cancel => {
                warn!("Enable source cancelled");
                Ok(false)
            }
            _ => {
                let cc = self.condition_code();
                Err(TwainError::SourceEnable { rc, cc })
            }
        }
    }

    /// Unwind to state 3. Best effort: failures are logged, never returned,
    /// and calling it again is a no-op.
    pub fn close(&mut self) {
        if !self.state().is_open() {
            return;
        }

        if self.state() == SourceState::Transferring {
            let mut pending = PendingXfers::default();
            let rc = self
                .dsm
                .pending_xfers(&self.app, &self.identity, MSG_ENDXFER, &mut pending);
            if rc == ReturnCode::Success {
                self.goto_state(if pending.has_more() {
                    SourceState::TransferReady
                } else {
                    SourceState::Enabled
                });
            } else {
                let cc = self.condition_code();
                warn!(%rc, %cc, "End transfer failed while closing");
            }
        }

        if self.state().is_transferring() {
            let mut pending = PendingXfers::default();
            let rc = self
                .dsm
                .pending_xfers(&self.app, &self.identity, MSG_RESET, &mut pending);
            if rc == ReturnCode::Success {
                self.goto_state(SourceState::Enabled);
            } else {
                let cc = self.condition_code();
                warn!(%rc, %cc, "Reset pending transfers failed while closing");
            }
        }

        if self.state().is_enabled() {
            let mut ui = UserInterface {
                parent: self.parent,
                ..Default::default()
            };
            let rc = self
                .dsm
                .user_interface(&self.app, &self.identity, MSG_DISABLEDS, &mut ui);
            if rc == ReturnCode::Success {
                self.goto_state(SourceState::Open);
            } else {
                let cc = self.condition_code();
                warn!(%rc, %cc, "Disable source failed");
            }
        }

        if self.state().is_open() {
            let rc = self
                .dsm
                .identity(&self.app, MSG_CLOSEDS, &mut self.identity);
            if rc == ReturnCode::Success {
                self.goto_state(SourceState::Closed);
            } else {
                let cc = self.dsm.status(&self.app, None);
                warn!(%rc, %cc, "Close source failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Device information
    // ------------------------------------------------------------------

    /// Whether the feeder reports paper. `false` when it cannot tell.
    pub fn paper_detectable(&self) -> bool {
        self.read_scalar::<bool>(CapabilityId::FEEDER_LOADED)
            .unwrap_or(false)
    }

    /// Whether the source can scan both sides.
    pub fn supports_duplex(&self) -> bool {
        self.supports(CapabilityId::DUPLEX)
            && self
                .read_scalar::<Duplex>(CapabilityId::DUPLEX)
                .map(|duplex| duplex != Duplex::None)
                .unwrap_or(false)
    }

    fn read_scalar<T: crate::protocol::TwainValue>(&self, id: CapabilityId) -> Result<T> {
        self.capability(id).get_basic_value()?.get(id)
    }

    /// Decode every supported capability. Errors are kept per entry.
    pub fn describe_capabilities(&self) -> Vec<(CapabilityId, Result<CapabilityResult>)> {
        self.supported
            .iter()
            .filter(|&&id| id != CapabilityId::SUPPORTED_CAPS)
            .map(|&id| (id, self.capability(id).get()))
            .collect()
    }

    /// Log every supported capability at debug level.
    pub fn debug_capabilities(&self) {
        debug!("Start debugging capabilities");
        for (id, result) in self.describe_capabilities() {
            match result {
                Ok(value) => debug!(capability = %id, value = %value, "Capability"),
                Err(e) => debug!(capability = %id, error = %e, "Capability"),
            }
        }
        debug!("End debugging capabilities");
    }

    /// Settings describing what the source currently uses.
    ///
    /// Opens the source if needed and closes it again afterwards.
    pub fn current_settings(&mut self) -> Result<ScanSettings> {
        let initial = self.state();
        self.open_source()?;

        let mut settings = ScanSettings::default();
        self.negotiate_settings(&mut settings, NegotiationMode::Read);

        if self.state() > initial {
            self.close();
        }
        Ok(settings)
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    /// Unknown support is treated as "try it": an empty list usually means
    /// `CAP_SUPPORTEDCAPS` itself could not be read.
    fn may_support(&self, id: CapabilityId) -> bool {
        self.supported.is_empty() || self.supports(id)
    }

    fn negotiate_step<T: crate::protocol::TwainValue>(
        &self,
        id: CapabilityId,
        requested: Option<T>,
    ) -> Option<Negotiated<T>> {
        if !self.may_support(id) {
            debug!(capability = %id, "Capability not supported, skipping");
            return None;
        }
        match self.capability(id).negotiate(requested) {
            Ok(outcome) => {
                if let Some(requested) = requested {
                    self.observer.on_event(&ScanEvent::CapabilityNegotiated {
                        capability: id,
                        satisfied: outcome.satisfied,
                    });
                    if !outcome.satisfied {
                        info!(
                            capability = %id,
                            requested = ?requested,
                            current = ?outcome.current,
                            "Requested value not applied"
                        );
                    }
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(capability = %id, error = %e, "Capability negotiation failed");
                None
            }
        }
    }

    /// Negotiate one optional setting and store what the source applies.
    fn negotiate_into<T: crate::protocol::TwainValue>(
        &self,
        id: CapabilityId,
        field: &mut Option<T>,
        mode: NegotiationMode,
    ) {
        let requested = match mode {
            NegotiationMode::Apply => match *field {
                Some(value) => Some(value),
                None => return,
            },
            NegotiationMode::Read => None,
        };
        if let Some(current) = self.negotiate_step(id, requested).and_then(|o| o.current) {
            *field = Some(current);
        }
    }

    fn negotiate_settings(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        self.negotiate_into(CapabilityId::INDICATORS, &mut settings.show_progress_ui, mode);
        self.negotiate_into(CapabilityId::XFER_COUNT, &mut settings.transfer_count, mode);
        self.negotiate_feeder(settings, mode);
        self.negotiate_duplex(settings, mode);
        self.negotiate_transfer_mode(settings, mode);
        self.negotiate_into(CapabilityId::SUPPORTED_SIZES, &mut settings.page_size, mode);
        self.negotiate_into(CapabilityId::ORIENTATION, &mut settings.orientation, mode);
        self.negotiate_units_and_area(settings, mode);
        self.negotiate_colour(settings, mode);
        self.negotiate_resolution(settings, mode);
        self.negotiate_into(
            CapabilityId::AUTOMATIC_ROTATE,
            &mut settings.automatic_rotate,
            mode,
        );
        self.negotiate_into(
            CapabilityId::AUTOMATIC_DESKEW,
            &mut settings.automatic_deskew,
            mode,
        );
        self.negotiate_into(
            CapabilityId::AUTOMATIC_BORDER_DETECTION,
            &mut settings.automatic_border_detection,
            mode,
        );
        self.negotiate_into(CapabilityId::FLIP_ROTATION, &mut settings.flip_rotation, mode);
    }

    /// Feeder first; auto-feed and auto-scan only matter once it is on.
    fn negotiate_feeder(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        let requested = settings.use_document_feeder;
        self.negotiate_into(
            CapabilityId::FEEDER_ENABLED,
            &mut settings.use_document_feeder,
            mode,
        );

        let feeding = match mode {
            NegotiationMode::Apply => requested == Some(true),
            NegotiationMode::Read => settings.use_document_feeder == Some(true),
        };
        if !feeding {
            return;
        }
        self.negotiate_into(CapabilityId::AUTO_FEED, &mut settings.use_auto_feeder, mode);
        self.negotiate_into(CapabilityId::AUTO_SCAN, &mut settings.use_auto_scan_cache, mode);
    }

    fn negotiate_duplex(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        if mode == NegotiationMode::Apply && settings.use_duplex.is_none() {
            return;
        }
        if !self.supports_duplex() {
            debug!("Source has no duplex unit");
            return;
        }
        self.negotiate_into(CapabilityId::DUPLEX_ENABLED, &mut settings.use_duplex, mode);
    }

    fn negotiate_transfer_mode(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        let mut mechanism: Option<TransferMechanism> =
            settings.data_transfer_mode.map(|m| m.mechanism());
        self.negotiate_into(CapabilityId::XFER_MECH, &mut mechanism, mode);
        if let Some(applied) = mechanism.and_then(TransferMode::from_mechanism) {
            settings.data_transfer_mode = Some(applied);
        }
    }

    /// Units, then the scan area in those units.
    ///
    /// The area is only applied when the units are known to be the ones the
    /// caller meant: either the requested units took effect, or no units
    /// were requested and the source reports its current ones.
    fn negotiate_units_and_area(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        let requested_units = settings.units;
        let consult_units = mode == NegotiationMode::Read
            || requested_units.is_some()
            || settings.area.is_some();
        let units = if consult_units {
            let requested = match mode {
                NegotiationMode::Apply => requested_units,
                NegotiationMode::Read => None,
            };
            self.negotiate_step(CapabilityId::UNITS, requested)
        } else {
            None
        };
        if let Some(current) = units.and_then(|o| o.current) {
            settings.units = Some(current);
        }

        match mode {
            NegotiationMode::Read => match self.read_area() {
                Ok(area) => settings.area = Some(area),
                Err(e) => debug!(error = %e, "Unable to read image layout"),
            },
            NegotiationMode::Apply => {
                let Some(area) = settings.area else {
                    return;
                };
                let units_known = match (requested_units, units) {
                    (Some(_), Some(outcome)) => outcome.satisfied,
                    (None, Some(outcome)) => outcome.current.is_some(),
                    _ => false,
                };
                if !units_known {
                    info!("Units not negotiated, leaving the scan area unchanged");
                    return;
                }
                match self.negotiate_area(area) {
                    Ok(applied) => settings.area = Some(applied),
                    Err(e) => warn!(error = %e, "Area negotiation failed"),
                }
            }
        }
    }

    /// `DAT_IMAGELAYOUT / MSG_SET`. When the source adjusts the frame, the
    /// adjusted frame is read back.
    fn negotiate_area(&self, area: AreaSettings) -> Result<AreaSettings> {
        let mut layout = ImageLayout {
            frame: area.to_frame(),
            ..Default::default()
        };
        let rc = self
            .dsm
            .image_layout(&self.app, &self.identity, MSG_SET, &mut layout);
        match rc {
            ReturnCode::Success => Ok(area),
            ReturnCode::CheckStatus => {
                let applied = self.read_area()?;
                info!(requested = ?area, applied = ?applied, "Scan area adjusted by source");
                Ok(applied)
            }
            _ => {
                let cc = self.condition_code();
                Err(TwainError::Protocol {
                    operation: "Set image layout",
                    rc,
                    cc,
                })
            }
        }
    }

    fn read_area(&self) -> Result<AreaSettings> {
        let mut layout = ImageLayout::default();
        let rc = self
            .dsm
            .image_layout(&self.app, &self.identity, MSG_GET, &mut layout);
        if rc != ReturnCode::Success {
            let cc = self.condition_code();
            return Err(TwainError::Protocol {
                operation: "Get image layout",
                rc,
                cc,
            });
        }
        Ok(AreaSettings::from_frame(&layout.frame))
    }

    /// Pixel type, then the bit depth that goes with it.
    fn negotiate_colour(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        let mut pixel_type = settings.colour_mode.pixel_type();
        let requested_depth = settings.colour_mode.bit_depth();

        let outcome = match mode {
            NegotiationMode::Apply if pixel_type.is_none() => return,
            NegotiationMode::Apply => self.negotiate_step(CapabilityId::PIXEL_TYPE, pixel_type),
            NegotiationMode::Read => self.negotiate_step(CapabilityId::PIXEL_TYPE, None),
        };
        if let Some(current) = outcome.and_then(|o| o.current) {
            pixel_type = Some(current);
        }
        if let Some(current) = pixel_type {
            settings.colour_mode = ColourMode::from_pixel_type(current);
        }

        if mode == NegotiationMode::Apply && outcome.is_some_and(|o| o.satisfied) {
            self.negotiate_step(CapabilityId::BIT_DEPTH, requested_depth);
        }
    }

    /// Both axes get the same resolution.
    fn negotiate_resolution(&self, settings: &mut ScanSettings, mode: NegotiationMode) {
        let requested = match mode {
            NegotiationMode::Apply => match settings.dpi {
                Some(dpi) => Some(Fix32::from_f32(dpi)),
                None => return,
            },
            NegotiationMode::Read => None,
        };

        let x = self.negotiate_step(CapabilityId::X_RESOLUTION, requested);
        if mode == NegotiationMode::Apply {
            self.negotiate_step(CapabilityId::Y_RESOLUTION, requested);
        }
        if let Some(current) = x.and_then(|o| o.current) {
            settings.dpi = Some(current.to_f32());
        }
    }
}

impl<D: DsmEntry + ?Sized, O: ScanObserver + ?Sized> Drop for DataSource<D, O> {
    fn drop(&mut self) {
        self.close();
    }
}
