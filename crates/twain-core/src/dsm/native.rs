//! Win32 data source manager backend.
//!
//! Loads `TWAINDSM.dll` (falling back to the legacy `twain_32.dll`) and calls
//! its `DSM_Entry` export with `#pragma pack(2)` structures.

use std::ffi::c_void;
use std::ptr;

use tracing::{debug, info, warn};
use windows::Win32::Foundation::{
    FreeLibrary, GlobalFree, HGLOBAL, HMODULE, HWND, LPARAM, POINT, WPARAM,
};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::Win32::System::Memory::{
    GMEM_FIXED, GMEM_MOVEABLE, GMEM_ZEROINIT, GlobalAlloc, GlobalLock, GlobalSize, GlobalUnlock,
};
use windows::Win32::UI::WindowsAndMessaging::MSG;
use windows::core::{PCWSTR, s, w};

use super::traits::{CapabilityRequest, DsmEntry};
use crate::error::{Result, TwainError};
use crate::protocol::constants::*;
use crate::protocol::{
    ConditionCode, Fix32, Frame, Identity, ImageInfo, ImageLayout, ImageMemXfer, MemHandle,
    PendingXfers, PlatformMessage, ReturnCode, SetupMemXfer, UserInterface, Version, WindowHandle,
};

type DsmEntryProc = unsafe extern "system" fn(
    origin: *mut TwIdentity,
    dest: *mut TwIdentity,
    dg: u32,
    dat: u16,
    msg: u16,
    data: *mut c_void,
) -> u16;

// ============================================================================
// Wire structures
// ============================================================================

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwVersion {
    major_num: u16,
    minor_num: u16,
    language: u16,
    country: u16,
    info: [u8; STR32_LEN],
}

#[repr(C, packed(2))]
#[derive(Clone, Copy)]
struct TwIdentity {
    id: u32,
    version: TwVersion,
    protocol_major: u16,
    protocol_minor: u16,
    supported_groups: u32,
    manufacturer: [u8; STR32_LEN],
    product_family: [u8; STR32_LEN],
    product_name: [u8; STR32_LEN],
}

#[repr(C, packed(2))]
struct TwCapability {
    cap: u16,
    con_type: u16,
    h_container: *mut c_void,
}

#[repr(C, packed(2))]
struct TwUserInterface {
    show_ui: u16,
    modal_ui: u16,
    h_parent: *mut c_void,
}

#[repr(C, packed(2))]
struct TwEvent {
    p_event: *mut c_void,
    tw_message: u16,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwFix32 {
    whole: i16,
    frac: u16,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwFrame {
    left: TwFix32,
    top: TwFix32,
    right: TwFix32,
    bottom: TwFix32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwImageInfo {
    x_resolution: TwFix32,
    y_resolution: TwFix32,
    image_width: i32,
    image_length: i32,
    samples_per_pixel: i16,
    bits_per_sample: [i16; 8],
    bits_per_pixel: i16,
    planar: u16,
    pixel_type: i16,
    compression: u16,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwImageLayout {
    frame: TwFrame,
    document_number: u32,
    page_number: u32,
    frame_number: u32,
}

#[repr(C, packed(2))]
#[derive(Clone, Copy, Default)]
struct TwSetupMemXfer {
    min_buf_size: u32,
    max_buf_size: u32,
    preferred: u32,
}

#[repr(C, packed(2))]
struct TwMemory {
    flags: u32,
    length: u32,
    the_mem: *mut c_void,
}

#[repr(C, packed(2))]
struct TwImageMemXfer {
    compression: u16,
    bytes_per_row: u32,
    columns: u32,
    rows: u32,
    x_offset: u32,
    y_offset: u32,
    bytes_written: u32,
    memory: TwMemory,
}

#[repr(C, packed(2))]
#[derive(Default)]
struct TwPendingXfers {
    count: u16,
    eoj: u32,
}

#[repr(C, packed(2))]
#[derive(Default)]
struct TwStatus {
    condition_code: u16,
    reserved: u16,
}

impl From<Fix32> for TwFix32 {
    fn from(value: Fix32) -> Self {
        Self {
            whole: value.whole,
            frac: value.frac,
        }
    }
}

impl From<TwFix32> for Fix32 {
    fn from(value: TwFix32) -> Self {
        Fix32::new(value.whole, value.frac)
    }
}

impl From<Frame> for TwFrame {
    fn from(f: Frame) -> Self {
        Self {
            left: f.left.into(),
            top: f.top.into(),
            right: f.right.into(),
            bottom: f.bottom.into(),
        }
    }
}

impl From<TwFrame> for Frame {
    fn from(f: TwFrame) -> Self {
        Self {
            left: f.left.into(),
            top: f.top.into(),
            right: f.right.into(),
            bottom: f.bottom.into(),
        }
    }
}

fn to_str32(text: &str) -> [u8; STR32_LEN] {
    let mut out = [0u8; STR32_LEN];
    let bytes = text.as_bytes();
    let len = bytes.len().min(STR32_LEN - 1);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

fn from_str32(raw: &[u8; STR32_LEN]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(STR32_LEN);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl From<&Identity> for TwIdentity {
    fn from(id: &Identity) -> Self {
        Self {
            id: id.id,
            version: TwVersion {
                major_num: id.version.major,
                minor_num: id.version.minor,
                language: id.version.language,
                country: id.version.country,
                info: to_str32(&id.version.info),
            },
            protocol_major: id.protocol_major,
            protocol_minor: id.protocol_minor,
            supported_groups: id.supported_groups,
            manufacturer: to_str32(&id.manufacturer),
            product_family: to_str32(&id.product_family),
            product_name: to_str32(&id.product_name),
        }
    }
}

impl From<&TwIdentity> for Identity {
    fn from(tw: &TwIdentity) -> Self {
        let version = tw.version;
        let (manufacturer, family, product) = (tw.manufacturer, tw.product_family, tw.product_name);
        Self {
            id: tw.id,
            version: Version {
                major: version.major_num,
                minor: version.minor_num,
                language: version.language,
                country: version.country,
                info: from_str32(&version.info),
            },
            protocol_major: tw.protocol_major,
            protocol_minor: tw.protocol_minor,
            supported_groups: tw.supported_groups,
            manufacturer: from_str32(&manufacturer),
            product_family: from_str32(&family),
            product_name: from_str32(&product),
        }
    }
}

// ============================================================================
// Global memory
// ============================================================================

/// Keeps a movable global block locked for the guard's lifetime.
struct GlobalLockGuard {
    handle: HGLOBAL,
    ptr: *mut u8,
}

impl GlobalLockGuard {
    fn lock(raw: *mut c_void) -> Option<Self> {
        let handle = HGLOBAL(raw);
        let ptr = unsafe { GlobalLock(handle) } as *mut u8;
        if ptr.is_null() {
            None
        } else {
            Some(Self { handle, ptr })
        }
    }

    fn size(&self) -> usize {
        unsafe { GlobalSize(self.handle) }
    }

    fn to_vec(&self, len: usize) -> Vec<u8> {
        let len = len.min(self.size());
        unsafe { std::slice::from_raw_parts(self.ptr, len) }.to_vec()
    }
}

impl Drop for GlobalLockGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = GlobalUnlock(self.handle);
        }
    }
}

fn global_free(raw: *mut c_void) {
    if !raw.is_null() {
        unsafe {
            let _ = GlobalFree(HGLOBAL(raw));
        }
    }
}

/// Copy `bytes` into a fresh movable global block.
fn global_from_bytes(bytes: &[u8]) -> Option<*mut c_void> {
    let handle = unsafe { GlobalAlloc(GMEM_MOVEABLE | GMEM_ZEROINIT, bytes.len()) }.ok()?;
    match GlobalLockGuard::lock(handle.0) {
        Some(guard) => {
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), guard.ptr, bytes.len()) };
            Some(handle.0)
        }
        None => {
            global_free(handle.0);
            None
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// `DSM_Entry` loaded from the system's data source manager DLL.
pub struct Win32Dsm {
    module: usize,
    entry: DsmEntryProc,
}

impl Win32Dsm {
    /// Load the 2.x manager, or the legacy one when it is missing.
    pub fn load() -> Result<Self> {
        match Self::load_library(w!("TWAINDSM.dll")) {
            Ok(dsm) => Ok(dsm),
            Err(e) => {
                warn!(error = %e, "TWAINDSM.dll unavailable, trying twain_32.dll");
                Self::load_library(w!("twain_32.dll"))
            }
        }
    }

    fn load_library(name: PCWSTR) -> Result<Self> {
        let module = unsafe { LoadLibraryW(name) }
            .map_err(|e| TwainError::ManagerUnavailable(e.to_string()))?;
        let Some(proc) = (unsafe { GetProcAddress(module, s!("DSM_Entry")) }) else {
            unsafe {
                let _ = FreeLibrary(module);
            }
            return Err(TwainError::ManagerUnavailable(
                "DSM_Entry export not found".to_string(),
            ));
        };
        // SAFETY: DSM_Entry has exactly this signature in every manager build.
        let entry: DsmEntryProc = unsafe { std::mem::transmute(proc) };
        info!("Loaded data source manager");
        Ok(Self {
            module: module.0 as usize,
            entry,
        })
    }

    fn call(
        &self,
        app: &Identity,
        source: Option<&Identity>,
        dg: u32,
        dat: u16,
        msg: u16,
        data: *mut c_void,
    ) -> ReturnCode {
        let mut origin = TwIdentity::from(app);
        let mut dest = source.map(TwIdentity::from);
        let dest_ptr = dest
            .as_mut()
            .map_or(ptr::null_mut(), |d| d as *mut TwIdentity);
        let rc = unsafe { (self.entry)(&mut origin, dest_ptr, dg, dat, msg, data) };
        let rc = ReturnCode::from_raw(rc);
        debug!(
            dg,
            dat = %format!("0x{dat:04X}"),
            msg = %format!("0x{msg:04X}"),
            %rc,
            "DSM_Entry"
        );
        rc
    }
}

impl Drop for Win32Dsm {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(HMODULE(self.module as *mut c_void));
        }
    }
}

impl DsmEntry for Win32Dsm {
    fn open_dsm(&self, app: &mut Identity, parent: WindowHandle) -> ReturnCode {
        let mut origin = TwIdentity::from(&*app);
        let mut hwnd = parent.0;
        let rc = unsafe {
            (self.entry)(
                &mut origin,
                ptr::null_mut(),
                DG_CONTROL,
                DAT_PARENT,
                MSG_OPENDSM,
                &mut hwnd as *mut isize as *mut c_void,
            )
        };
        app.id = origin.id;
        ReturnCode::from_raw(rc)
    }

    fn close_dsm(&self, app: &Identity, parent: WindowHandle) -> ReturnCode {
        let mut hwnd = parent.0;
        self.call(
            app,
            None,
            DG_CONTROL,
            DAT_PARENT,
            MSG_CLOSEDSM,
            &mut hwnd as *mut isize as *mut c_void,
        )
    }

    fn identity(&self, app: &Identity, msg: u16, source: &mut Identity) -> ReturnCode {
        let mut origin = TwIdentity::from(app);
        let mut tw = TwIdentity::from(&*source);
        let rc = unsafe {
            (self.entry)(
                &mut origin,
                ptr::null_mut(),
                DG_CONTROL,
                DAT_IDENTITY,
                msg,
                &mut tw as *mut TwIdentity as *mut c_void,
            )
        };
        let rc = ReturnCode::from_raw(rc);
        if rc.is_success() {
            *source = Identity::from(&tw);
        }
        rc
    }

    fn status(&self, app: &Identity, source: Option<&Identity>) -> ConditionCode {
        let mut status = TwStatus::default();
        let rc = self.call(
            app,
            source,
            DG_CONTROL,
            DAT_STATUS,
            MSG_GET,
            &mut status as *mut TwStatus as *mut c_void,
        );
        if rc.is_success() {
            ConditionCode::from_raw(status.condition_code)
        } else {
            ConditionCode::Unknown(status.condition_code)
        }
    }

    fn capability(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        request: &mut CapabilityRequest,
    ) -> ReturnCode {
        let container = match request.container.as_deref() {
            Some(bytes) if msg == MSG_SET => match global_from_bytes(bytes) {
                Some(handle) => handle,
                None => return ReturnCode::Failure,
            },
            _ => ptr::null_mut(),
        };
        let mut cap = TwCapability {
            cap: request.capability.raw(),
            con_type: request.con_type,
            h_container: container,
        };

        let rc = self.call(
            app,
            Some(source),
            DG_CONTROL,
            DAT_CAPABILITY,
            msg,
            &mut cap as *mut TwCapability as *mut c_void,
        );

        let returned = cap.h_container;
        if msg != MSG_SET && rc.is_success() && !returned.is_null() {
            if let Some(guard) = GlobalLockGuard::lock(returned) {
                request.container = Some(guard.to_vec(guard.size()));
            }
            request.con_type = cap.con_type;
        }
        // The application owns the container in both directions.
        global_free(returned);
        if returned != container {
            global_free(container);
        }
        rc
    }

    fn user_interface(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        ui: &mut UserInterface,
    ) -> ReturnCode {
        let mut tw = TwUserInterface {
            show_ui: ui.show_ui as u16,
            modal_ui: ui.modal_ui as u16,
            h_parent: ui.parent.0 as *mut c_void,
        };
        self.call(
            app,
            Some(source),
            DG_CONTROL,
            DAT_USERINTERFACE,
            msg,
            &mut tw as *mut TwUserInterface as *mut c_void,
        )
    }

    fn process_event(
        &self,
        app: &Identity,
        source: &Identity,
        event: &PlatformMessage,
        message: &mut u16,
    ) -> ReturnCode {
        let mut msg = MSG {
            hwnd: HWND(event.hwnd.0 as *mut c_void),
            message: event.message,
            wParam: WPARAM(event.wparam),
            lParam: LPARAM(event.lparam),
            time: event.time,
            pt: POINT {
                x: event.x,
                y: event.y,
            },
        };
        let mut tw = TwEvent {
            p_event: &mut msg as *mut MSG as *mut c_void,
            tw_message: MSG_NULL,
        };
        let rc = self.call(
            app,
            Some(source),
            DG_CONTROL,
            DAT_EVENT,
            MSG_PROCESSEVENT,
            &mut tw as *mut TwEvent as *mut c_void,
        );
        *message = tw.tw_message;
        rc
    }

    fn image_info(&self, app: &Identity, source: &Identity, info: &mut ImageInfo) -> ReturnCode {
        let mut tw = TwImageInfo::default();
        let rc = self.call(
            app,
            Some(source),
            DG_IMAGE,
            DAT_IMAGEINFO,
            MSG_GET,
            &mut tw as *mut TwImageInfo as *mut c_void,
        );
        if rc.is_success() {
            *info = ImageInfo {
                x_resolution: tw.x_resolution.into(),
                y_resolution: tw.y_resolution.into(),
                image_width: tw.image_width,
                image_length: tw.image_length,
                samples_per_pixel: tw.samples_per_pixel,
                bits_per_sample: tw.bits_per_sample,
                bits_per_pixel: tw.bits_per_pixel,
                planar: tw.planar != 0,
                pixel_type: tw.pixel_type as u16,
                compression: tw.compression,
            };
        }
        rc
    }

    fn image_layout(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        layout: &mut ImageLayout,
    ) -> ReturnCode {
        let mut tw = TwImageLayout {
            frame: layout.frame.into(),
            document_number: layout.document_number,
            page_number: layout.page_number,
            frame_number: layout.frame_number,
        };
        let rc = self.call(
            app,
            Some(source),
            DG_IMAGE,
            DAT_IMAGELAYOUT,
            msg,
            &mut tw as *mut TwImageLayout as *mut c_void,
        );
        if msg != MSG_SET && rc.is_success() {
            *layout = ImageLayout {
                frame: tw.frame.into(),
                document_number: tw.document_number,
                page_number: tw.page_number,
                frame_number: tw.frame_number,
            };
        }
        rc
    }

    fn image_native_xfer(&self, app: &Identity, source: &Identity, dib: &mut Vec<u8>) -> ReturnCode {
        let mut handle: *mut c_void = ptr::null_mut();
        let rc = self.call(
            app,
            Some(source),
            DG_IMAGE,
            DAT_IMAGENATIVEXFER,
            MSG_GET,
            &mut handle as *mut *mut c_void as *mut c_void,
        );
        if rc == ReturnCode::XferDone && !handle.is_null() {
            if let Some(guard) = GlobalLockGuard::lock(handle) {
                *dib = guard.to_vec(guard.size());
            }
        }
        global_free(handle);
        rc
    }

    fn setup_mem_xfer(
        &self,
        app: &Identity,
        source: &Identity,
        setup: &mut SetupMemXfer,
    ) -> ReturnCode {
        let mut tw = TwSetupMemXfer::default();
        let rc = self.call(
            app,
            Some(source),
            DG_CONTROL,
            DAT_SETUPMEMXFER,
            MSG_GET,
            &mut tw as *mut TwSetupMemXfer as *mut c_void,
        );
        if rc.is_success() {
            *setup = SetupMemXfer {
                min_buf_size: tw.min_buf_size,
                max_buf_size: tw.max_buf_size,
                preferred: tw.preferred,
            };
        }
        rc
    }

    fn image_mem_xfer(&self, app: &Identity, source: &Identity, xfer: &mut ImageMemXfer) -> ReturnCode {
        let mut tw = TwImageMemXfer {
            compression: xfer.compression,
            bytes_per_row: xfer.bytes_per_row,
            columns: xfer.columns,
            rows: xfer.rows,
            x_offset: xfer.x_offset,
            y_offset: xfer.y_offset,
            bytes_written: xfer.bytes_written,
            memory: TwMemory {
                flags: xfer.memory.flags,
                length: xfer.memory.length,
                the_mem: xfer.memory.the_mem.0 as *mut c_void,
            },
        };
        let rc = self.call(
            app,
            Some(source),
            DG_IMAGE,
            DAT_IMAGEMEMXFER,
            MSG_GET,
            &mut tw as *mut TwImageMemXfer as *mut c_void,
        );
        xfer.compression = tw.compression;
        xfer.bytes_per_row = tw.bytes_per_row;
        xfer.columns = tw.columns;
        xfer.rows = tw.rows;
        xfer.x_offset = tw.x_offset;
        xfer.y_offset = tw.y_offset;
        xfer.bytes_written = tw.bytes_written;
        rc
    }

    fn pending_xfers(
        &self,
        app: &Identity,
        source: &Identity,
        msg: u16,
        pending: &mut PendingXfers,
    ) -> ReturnCode {
        let mut tw = TwPendingXfers::default();
        let rc = self.call(
            app,
            Some(source),
            DG_CONTROL,
            DAT_PENDINGXFERS,
            msg,
            &mut tw as *mut TwPendingXfers as *mut c_void,
        );
        pending.count = tw.count as i16;
        rc
    }

    fn mem_alloc(&self, size: u32) -> Option<MemHandle> {
        // Fixed blocks: the handle is the pointer, as TWMF_POINTER expects.
        let handle = unsafe { GlobalAlloc(GMEM_FIXED | GMEM_ZEROINIT, size as usize) }.ok()?;
        if handle.0.is_null() {
            return None;
        }
        Some(MemHandle(handle.0 as usize))
    }

    fn mem_read(&self, handle: MemHandle, len: usize) -> Vec<u8> {
        if handle.is_null() {
            return Vec::new();
        }
        let raw = handle.0 as *mut c_void;
        let size = unsafe { GlobalSize(HGLOBAL(raw)) };
        let len = len.min(size);
        unsafe { std::slice::from_raw_parts(raw as *const u8, len) }.to_vec()
    }

    fn mem_free(&self, handle: MemHandle) {
        global_free(handle.0 as *mut c_void);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_wire_struct_sizes() {
        assert_eq!(size_of::<TwVersion>(), 42);
        assert_eq!(size_of::<TwIdentity>(), 156);
        assert_eq!(size_of::<TwImageInfo>(), 42);
        assert_eq!(size_of::<TwImageLayout>(), 28);
        assert_eq!(size_of::<TwStatus>(), 4);
        assert_eq!(size_of::<TwPendingXfers>(), 6);
    }

    #[test]
    fn test_identity_conversion_truncates_names() {
        let mut id = Identity::application("A very long product name exceeding the limit");
        id.id = 7;
        let tw = TwIdentity::from(&id);
        let back = Identity::from(&tw);
        assert_eq!(back.id, 7);
        assert_eq!(back.product_name.len(), STR32_LEN - 1);
        assert_eq!(back.manufacturer, id.manufacturer);
    }
}
