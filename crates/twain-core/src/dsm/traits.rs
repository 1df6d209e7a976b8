//! Data source manager entry point abstraction.
//!
//! Defines the `DsmEntry` trait, one method per protocol triplet the driver
//! layer issues, allowing different implementations (Win32, mock, etc.).

use crate::protocol::{
    CapabilityId, ConditionCode, Identity, ImageInfo, ImageLayout, ImageMemXfer, MemHandle,
    PendingXfers, PlatformMessage, ReturnCode, SetupMemXfer, UserInterface, WindowHandle,
};

/// `TW_CAPABILITY` in host form.
///
/// On `MSG_SET` the caller fills `container`; on the `MSG_GET*` family the
/// manager fills `con_type` and `container`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub capability: CapabilityId,
    pub con_type: u16,
    pub container: Option<Vec<u8>>,
}

impl CapabilityRequest {
    /// Request for any `MSG_GET*` / `MSG_RESET` operation.
    pub fn query(capability: CapabilityId) -> Self {
        Self {
            capability,
            con_type: crate::protocol::TWON_DONTCARE16,
            container: None,
        }
    }

    /// Request carrying a container to `MSG_SET`.
    pub fn set(capability: CapabilityId, con_type: u16, container: Vec<u8>) -> Self {
        Self {
            capability,
            con_type,
            container: Some(container),
        }
    }
}

/// Abstract data source manager interface.
///
/// This trait enables:
/// - Production implementation calling `DSM_Entry`
/// - Scripted implementation for tests and simulation
///
/// Every method maps to exactly one protocol triplet and reports the raw
/// return code; interpreting it is the caller's job.
pub trait DsmEntry: Send + Sync {
    /// `DG_CONTROL / DAT_PARENT / MSG_OPENDSM`. Assigns `app.id`.
    fn open_dsm(&self, app: &mut Identity, parent: WindowHandle) -> ReturnCode;

    /// `DG_CONTROL / DAT_PARENT / MSG_CLOSEDSM`.
    fn close_dsm(&self, app: &Identity, parent: WindowHandle) -> ReturnCode;

    /// `DG_CONTROL / DAT_IDENTITY / msg` for `MSG_GETDEFAULT`,
    /// `MSG_GETFIRST`, `MSG_GETNEXT`, `MSG_USERSELECT`, `MSG_OPENDS` and
    /// `MSG_CLOSEDS`.
    fn identity(&self, app: &Identity, msg: u16, source: &mut Identity) -> ReturnCode;

    /// `DG_CONTROL / DAT_STATUS / MSG_GET`, addressed to the manager when
    /// `source` is `None`.
    fn status(&self, app: &Identity, source: Option<&Identity>) -> ConditionCode;

    /// `DG_CONTROL / DAT_CAPABILITY / msg`.
    fn capability(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        request: &mut CapabilityRequest,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_USERINTERFACE / MSG_ENABLEDS | MSG_DISABLEDS`.
    fn user_interface(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        ui: &mut UserInterface,
    ) -> ReturnCode;

    /// `DG_CONTROL / DAT_EVENT / MSG_PROCESSEVENT`. On `DsEvent`, `message`
    /// receives the source's notification (`MSG_XFERREADY`, ...).
    fn process_event(
        &self,
        app: &Identity,
        source: &Identity,
        event: &PlatformMessage,
        message: &mut u16,
    ) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGEINFO / MSG_GET`.
    fn image_info(&self, app: &Identity, source: &Identity, info: &mut ImageInfo) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGELAYOUT / MSG_GET | MSG_SET`.
    fn image_layout(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        layout: &mut ImageLayout,
    ) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGENATIVEXFER / MSG_GET`.
    ///
    /// On `XferDone`, `dib` receives the packed device-independent bitmap
    /// (info header, colour table, pixels). The backend releases the
    /// source's handle before returning.
    fn image_native_xfer(&self, app: &Identity, source: &Identity, dib: &mut Vec<u8>)
    -> ReturnCode;

    /// `DG_CONTROL / DAT_SETUPMEMXFER / MSG_GET`.
    fn setup_mem_xfer(
        &self,
        app: &Identity,
        source: &Identity,
        setup: &mut SetupMemXfer,
    ) -> ReturnCode;

    /// `DG_IMAGE / DAT_IMAGEMEMXFER / MSG_GET`. Writes one strip into
    /// `xfer.memory.the_mem`.
    fn image_mem_xfer(&self, app: &Identity, source: &Identity, xfer: &mut ImageMemXfer)
    -> ReturnCode;

    /// `DG_CONTROL / DAT_PENDINGXFERS / MSG_ENDXFER | MSG_RESET`.
    fn pending_xfers(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        pending: &mut PendingXfers,
    ) -> ReturnCode;

    /// Allocate a transfer buffer. `None` when out of memory.
    fn mem_alloc(&self, size: u32) -> Option<MemHandle>;

    /// Copy the first `len` bytes out of a buffer from [`DsmEntry::mem_alloc`].
    fn mem_read(&self, handle: MemHandle, len: usize) -> Vec<u8>;

    /// Release a buffer from [`DsmEntry::mem_alloc`].
    fn mem_free(&self, handle: MemHandle);
}
