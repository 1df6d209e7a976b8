//! Scripted data source manager for testing and simulation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{CapabilityRequest, DsmEntry};
use crate::capability::codec::{self, CapabilityResult, ItemType, ItemValue};
use crate::dib::DibImage;
use crate::protocol::constants::*;
use crate::protocol::{
    CapabilityId, ConditionCode, Fix32, Frame, Identity, ImageInfo, ImageLayout, ImageMemXfer,
    MemHandle, PendingXfers, PixelType, PlatformMessage, ReturnCode, SetupMemXfer,
    TransferMechanism, TwainValue, UserInterface, Version, WindowHandle,
};

/// A page waiting in the mock's feeder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPage {
    /// Delivered whole by a native transfer.
    Native(Vec<u8>),
    /// Delivered in strips by memory transfer. `data` holds `info.image_length`
    /// rows of `bytes_per_row` bytes each, padding included.
    Memory {
        info: ImageInfo,
        bytes_per_row: u32,
        data: Vec<u8>,
    },
}

impl MockPage {
    /// Native page from a bitmap.
    pub fn native(dib: &DibImage) -> Self {
        MockPage::Native(dib.as_bytes().to_vec())
    }

    /// Memory page; `pixel` fills the meaningful bytes of each row.
    pub fn memory<F>(
        columns: u32,
        rows: u32,
        bits_per_pixel: u16,
        bytes_per_row: u32,
        dpi: f32,
        mut pixel: F,
    ) -> Self
    where
        F: FnMut(u32, u32) -> u8,
    {
        let samples: i16 = if bits_per_pixel == 24 { 3 } else { 1 };
        let pixel_type = match bits_per_pixel {
            24 => PixelType::Rgb,
            1 => PixelType::BlackAndWhite,
            _ => PixelType::Grey,
        };
        let mut bits_per_sample = [0i16; 8];
        for slot in bits_per_sample.iter_mut().take(samples as usize) {
            *slot = bits_per_pixel as i16 / samples;
        }
        let info = ImageInfo {
            x_resolution: Fix32::from_f32(dpi),
            y_resolution: Fix32::from_f32(dpi),
            image_width: columns as i32,
            image_length: rows as i32,
            samples_per_pixel: samples,
            bits_per_sample,
            bits_per_pixel: bits_per_pixel as i16,
            planar: false,
            pixel_type: pixel_type.to_raw() as u16,
            compression: TWCP_NONE,
        };

        let row_bytes = (columns as usize * bits_per_pixel as usize).div_ceil(8);
        let mut data = vec![0xEEu8; bytes_per_row as usize * rows as usize];
        for y in 0..rows {
            let start = y as usize * bytes_per_row as usize;
            for (i, byte) in data[start..start + row_bytes].iter_mut().enumerate() {
                *byte = pixel(i as u32, y);
            }
        }

        MockPage::Memory {
            info,
            bytes_per_row,
            data,
        }
    }
}

/// A capability held by the mock source.
#[derive(Debug, Clone)]
pub struct MockCapability {
    pub value: CapabilityResult,
    pub settable: bool,
    default: CapabilityResult,
}

/// One recorded triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockCall {
    pub dat: u16,
    pub msg: u16,
    pub capability: Option<CapabilityId>,
}

/// Synthesizes pages when the source is enabled.
#[derive(Debug, Clone, Copy)]
struct Simulation {
    pages: usize,
}

#[derive(Debug, Default)]
struct MockState {
    sources: Vec<Identity>,
    default_source: Option<usize>,
    user_selection: Option<usize>,
    enum_cursor: usize,
    dsm_open: bool,
    open_source: Option<u32>,
    enabled: bool,
    last_ui: Option<UserInterface>,
    capabilities: HashMap<CapabilityId, MockCapability>,
    forced: HashMap<(u16, u16), VecDeque<(ReturnCode, ConditionCode)>>,
    condition: ConditionCode,
    events: VecDeque<u16>,
    pages: VecDeque<MockPage>,
    mem_offset: usize,
    layout: ImageLayout,
    max_extent: Option<(f32, f32)>,
    setup: SetupMemXfer,
    allocations: HashMap<usize, Vec<u8>>,
    next_handle: usize,
    fail_alloc: bool,
    xfer_ready_on_enable: bool,
    simulation: Option<Simulation>,
    calls: Vec<MockCall>,
}

/// Mock data source manager for unit testing the driver layer.
///
/// Behaves like a cooperative manager with one or more sources. Any triplet
/// can be forced to return a specific code with [`MockDsm::force`], which
/// skips the triplet's normal effect.
#[derive(Clone)]
pub struct MockDsm {
    state: Arc<Mutex<MockState>>,
}

const HANDLE_BASE: usize = 0x1000;

impl MockDsm {
    pub fn new() -> Self {
        let state = MockState {
            setup: SetupMemXfer {
                min_buf_size: 64,
                max_buf_size: 1 << 20,
                preferred: 16 * 1024,
            },
            next_handle: HANDLE_BASE,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a source. The first one added becomes the default.
    pub fn add_source(&self, product_name: &str) -> Identity {
        let mut state = self.state();
        let id = 100 + state.sources.len() as u32 + 1;
        let identity = Identity {
            id,
            version: Version {
                major: 1,
                minor: 0,
                language: 13,
                country: 1,
                info: "mock".to_string(),
            },
            protocol_major: PROTOCOL_MAJOR,
            protocol_minor: PROTOCOL_MINOR,
            supported_groups: DG_CONTROL | DG_IMAGE,
            manufacturer: "Mock Devices".to_string(),
            product_family: "Mock".to_string(),
            product_name: product_name.to_string(),
        };
        state.sources.push(identity.clone());
        if state.default_source.is_none() {
            state.default_source = Some(state.sources.len() - 1);
        }
        identity
    }

    pub fn set_default_source(&self, product_name: &str) {
        let mut state = self.state();
        let index = state
            .sources
            .iter()
            .position(|s| s.product_name == product_name);
        state.default_source = index;
    }

    /// Source picked when the user-select dialog is "shown"; `None` cancels it.
    pub fn set_user_selection(&self, product_name: Option<&str>) {
        let mut state = self.state();
        let index = product_name
            .and_then(|name| state.sources.iter().position(|s| s.product_name == name));
        state.user_selection = index;
    }

    /// Add a settable capability.
    pub fn add_capability(&self, id: CapabilityId, value: CapabilityResult) {
        self.insert_capability(id, value, true);
    }

    /// Add a capability that rejects `MSG_SET`.
    pub fn add_readonly_capability(&self, id: CapabilityId, value: CapabilityResult) {
        self.insert_capability(id, value, false);
    }

    fn insert_capability(&self, id: CapabilityId, value: CapabilityResult, settable: bool) {
        self.state().capabilities.insert(
            id,
            MockCapability {
                default: value.clone(),
                value,
                settable,
            },
        );
    }

    pub fn remove_capability(&self, id: CapabilityId) {
        self.state().capabilities.remove(&id);
    }

    /// Current container of a capability.
    pub fn capability_value(&self, id: CapabilityId) -> Option<CapabilityResult> {
        self.state().capabilities.get(&id).map(|c| c.value.clone())
    }

    /// Current scalar value of a capability.
    pub fn current_value(&self, id: CapabilityId) -> Option<u32> {
        self.capability_value(id).and_then(|c| c.current_scalar())
    }

    /// Make the next call of `dat`/`msg` return `rc` with condition `cc`.
    pub fn force(&self, dat: u16, msg: u16, rc: ReturnCode, cc: ConditionCode) {
        self.state()
            .forced
            .entry((dat, msg))
            .or_default()
            .push_back((rc, cc));
    }

    /// Queue a source notification for the next `MSG_PROCESSEVENT`.
    pub fn queue_event(&self, message: u16) {
        self.state().events.push_back(message);
    }

    pub fn queue_page(&self, page: MockPage) {
        self.state().pages.push_back(page);
    }

    /// Post `MSG_XFERREADY` whenever the source gets enabled with pages queued.
    pub fn set_xfer_ready_on_enable(&self, enabled: bool) {
        self.state().xfer_ready_on_enable = enabled;
    }

    /// Physical bed size; larger layout frames are clamped with `CheckStatus`.
    pub fn set_max_extent(&self, width: f32, height: f32) {
        self.state().max_extent = Some((width, height));
    }

    pub fn set_layout(&self, frame: Frame) {
        self.state().layout.frame = frame;
    }

    pub fn layout(&self) -> ImageLayout {
        self.state().layout
    }

    pub fn set_preferred_buffer(&self, size: u32) {
        self.state().setup.preferred = size;
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.state().fail_alloc = fail;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, dat: u16, msg: u16) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.dat == dat && c.msg == msg)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn outstanding_allocations(&self) -> usize {
        self.state().allocations.len()
    }

    pub fn pending_pages(&self) -> usize {
        self.state().pages.len()
    }

    pub fn is_dsm_open(&self) -> bool {
        self.state().dsm_open
    }

    /// Id of the source currently open, if any.
    pub fn open_source_id(&self) -> Option<u32> {
        self.state().open_source
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// The last `TW_USERINTERFACE` passed to `MSG_ENABLEDS`.
    pub fn last_user_interface(&self) -> Option<UserInterface> {
        self.state().last_ui
    }

    /// A two-source manager that fabricates test-pattern pages.
    ///
    /// Every enable queues `pages` pages matching the current pixel type,
    /// resolution and transfer mechanism, then posts `MSG_XFERREADY`.
    pub fn simulated(pages: usize) -> Self {
        let dsm = Self::new();
        dsm.add_source("Simulated Flatbed");
        dsm.add_source("Simulated Feeder");

        let u16_enum = |items: &[u32], current: u32| CapabilityResult::Enumeration {
            item_type: ItemType::UInt16,
            current_index: items.iter().position(|&v| v == current).unwrap_or(0) as u32,
            default_index: 0,
            items: items.iter().map(|&v| ItemValue::Scalar(v)).collect(),
        };
        let boolean = |value: bool| CapabilityResult::Basic {
            item_type: ItemType::Bool,
            value: ItemValue::Scalar(value as u32),
        };
        let dpi = CapabilityResult::Range {
            item_type: ItemType::Fix32,
            min: Fix32::from_f32(50.0).raw(),
            max: Fix32::from_f32(600.0).raw(),
            step: Fix32::from_f32(25.0).raw(),
            default: Fix32::from_f32(150.0).raw(),
            current: Fix32::from_f32(150.0).raw(),
        };

        dsm.add_capability(
            CapabilityId::XFER_COUNT,
            CapabilityResult::Basic {
                item_type: ItemType::Int16,
                value: ItemValue::Scalar((-1i16).to_raw()),
            },
        );
        dsm.add_capability(CapabilityId::PIXEL_TYPE, u16_enum(&[0, 1, 2], 2));
        dsm.add_capability(CapabilityId::BIT_DEPTH, u16_enum(&[1, 8, 24], 24));
        dsm.add_capability(CapabilityId::UNITS, u16_enum(&[0, 1, 5, 6], 0));
        dsm.add_capability(CapabilityId::XFER_MECH, u16_enum(&[0, 2], 0));
        dsm.add_capability(CapabilityId::X_RESOLUTION, dpi.clone());
        dsm.add_capability(CapabilityId::Y_RESOLUTION, dpi);
        dsm.add_capability(CapabilityId::FEEDER_ENABLED, boolean(false));
        dsm.add_readonly_capability(CapabilityId::FEEDER_LOADED, boolean(true));
        dsm.add_capability(CapabilityId::AUTO_FEED, boolean(false));
        dsm.add_capability(CapabilityId::INDICATORS, boolean(true));
        dsm.add_readonly_capability(CapabilityId::UI_CONTROLLABLE, boolean(true));
        dsm.add_readonly_capability(
            CapabilityId::DUPLEX,
            CapabilityResult::Basic {
                item_type: ItemType::UInt16,
                value: ItemValue::Scalar(1),
            },
        );
        dsm.add_capability(CapabilityId::DUPLEX_ENABLED, boolean(false));
        dsm.add_capability(CapabilityId::ORIENTATION, u16_enum(&[0, 3], 0));
        dsm.add_capability(CapabilityId::SUPPORTED_SIZES, u16_enum(&[0, 1, 3, 4], 3));
        dsm.add_capability(CapabilityId::AUTOMATIC_ROTATE, boolean(false));
        dsm.add_capability(CapabilityId::AUTOMATIC_DESKEW, boolean(false));
        dsm.add_capability(CapabilityId::AUTOMATIC_BORDER_DETECTION, boolean(false));
        dsm.add_capability(CapabilityId::FLIP_ROTATION, u16_enum(&[0, 1], 0));

        dsm.set_max_extent(8.5, 14.0);
        dsm.set_layout(Frame {
            left: Fix32::from_f32(0.0),
            top: Fix32::from_f32(0.0),
            right: Fix32::from_f32(8.5),
            bottom: Fix32::from_f32(11.0),
        });
        {
            let mut state = dsm.state();
            state.simulation = Some(Simulation { pages });
            state.xfer_ready_on_enable = true;
        }
        dsm
    }
}

impl Default for MockDsm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn record(&mut self, dat: u16, msg: u16, capability: Option<CapabilityId>) {
        self.calls.push(MockCall {
            dat,
            msg,
            capability,
        });
    }

    /// Pop a forced result for this triplet, if one is queued.
    fn forced(&mut self, dat: u16, msg: u16) -> Option<ReturnCode> {
        let (rc, cc) = self.forced.get_mut(&(dat, msg))?.pop_front()?;
        self.condition = cc;
        Some(rc)
    }

    fn fail(&mut self, cc: ConditionCode) -> ReturnCode {
        self.condition = cc;
        ReturnCode::Failure
    }

    fn source_is_open(&self, source: &Identity) -> bool {
        self.open_source == Some(source.id)
    }

    fn supported_caps(&self) -> CapabilityResult {
        let mut ids: Vec<u16> = self.capabilities.keys().map(|id| id.raw()).collect();
        ids.push(CapabilityId::SUPPORTED_CAPS.raw());
        ids.sort_unstable();
        ids.dedup();
        CapabilityResult::Array {
            item_type: ItemType::UInt16,
            items: ids.into_iter().map(|id| ItemValue::Scalar(id as u32)).collect(),
        }
    }

    fn lookup(&self, id: CapabilityId) -> Option<CapabilityResult> {
        match self.capabilities.get(&id) {
            Some(cap) => Some(cap.value.clone()),
            None if id == CapabilityId::SUPPORTED_CAPS => Some(self.supported_caps()),
            None => None,
        }
    }

    fn scalar_of(&self, id: CapabilityId) -> Option<u32> {
        self.capabilities
            .get(&id)
            .and_then(|c| c.value.current_scalar())
    }

    fn set_capability(&mut self, id: CapabilityId, request: &CapabilityRequest) -> ReturnCode {
        let Some(bytes) = request.container.as_deref() else {
            return self.fail(ConditionCode::BadValue);
        };
        let Ok(incoming) = codec::decode(request.con_type, bytes) else {
            return self.fail(ConditionCode::BadValue);
        };
        let Some(cap) = self.capabilities.get_mut(&id) else {
            return self.fail(ConditionCode::CapUnsupported);
        };
        if !cap.settable {
            self.condition = ConditionCode::CapBadOperation;
            return ReturnCode::Failure;
        }
        if incoming.item_type() != cap.value.item_type() {
            self.condition = ConditionCode::BadValue;
            return ReturnCode::Failure;
        }
        let Some(raw) = incoming.current_scalar() else {
            self.condition = ConditionCode::BadValue;
            return ReturnCode::Failure;
        };

        match &mut cap.value {
            CapabilityResult::Basic { value, .. } => {
                *value = ItemValue::Scalar(raw);
                ReturnCode::Success
            }
            CapabilityResult::Range {
                item_type,
                min,
                max,
                current,
                ..
            } => {
                let v = codec::numeric(*item_type, raw);
                if v < codec::numeric(*item_type, *min) {
                    *current = *min;
                    ReturnCode::CheckStatus
                } else if v > codec::numeric(*item_type, *max) {
                    *current = *max;
                    ReturnCode::CheckStatus
                } else {
                    *current = raw;
                    ReturnCode::Success
                }
            }
            CapabilityResult::Enumeration {
                current_index,
                items,
                ..
            } => match items.iter().position(|i| i.as_scalar() == Some(raw)) {
                Some(index) => {
                    *current_index = index as u32;
                    ReturnCode::Success
                }
                None => {
                    self.condition = ConditionCode::BadValue;
                    ReturnCode::Failure
                }
            },
            CapabilityResult::Array { .. } => {
                self.condition = ConditionCode::CapBadOperation;
                ReturnCode::Failure
            }
        }
    }

    /// Fabricate pages for a simulated scan.
    fn simulate_pages(&mut self, sim: Simulation) {
        let pixel_type = self
            .scalar_of(CapabilityId::PIXEL_TYPE)
            .and_then(PixelType::from_raw)
            .unwrap_or(PixelType::Rgb);
        let mechanism = self
            .scalar_of(CapabilityId::XFER_MECH)
            .and_then(TransferMechanism::from_raw)
            .unwrap_or(TransferMechanism::Native);
        let dpi = self
            .scalar_of(CapabilityId::X_RESOLUTION)
            .map(|raw| Fix32::from_raw(raw).to_f32())
            .unwrap_or(150.0);

        let bits: u16 = match pixel_type {
            PixelType::Rgb => 24,
            PixelType::BlackAndWhite => 1,
            _ => 8,
        };
        // Two by two-and-a-half inch swatch.
        let columns = ((dpi * 2.0) as u32).clamp(16, 1200);
        let rows = ((dpi * 2.5) as u32).clamp(16, 1500);

        for page in 0..sim.pages {
            let shade = (page * 40) as u32;
            let queued = match mechanism {
                TransferMechanism::Memory => {
                    let row_bytes = (columns * bits as u32).div_ceil(8);
                    let bytes_per_row = row_bytes.div_ceil(4) * 4;
                    MockPage::memory(columns, rows, bits, bytes_per_row, dpi, |i, y| {
                        ((i + y + shade) & 0xFF) as u8
                    })
                }
                _ => {
                    let dib = DibImage::synthesize(columns, rows, bits, dpi, |x, y| {
                        let v = ((x + y + shade) & 0xFF) as u8;
                        [v, v.wrapping_add(85), v.wrapping_add(170)]
                    });
                    MockPage::native(&dib)
                }
            };
            self.pages.push_back(queued);
        }
    }
}

impl DsmEntry for MockDsm {
    fn open_dsm(&self, app: &mut Identity, _parent: WindowHandle) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_PARENT, MSG_OPENDSM, None);
        if let Some(rc) = state.forced(DAT_PARENT, MSG_OPENDSM) {
            return rc;
        }
        if state.dsm_open {
            return state.fail(ConditionCode::SeqError);
        }
        state.dsm_open = true;
        app.id = 1;
        state.condition = ConditionCode::Success;
        ReturnCode::Success
    }

    fn close_dsm(&self, _app: &Identity, _parent: WindowHandle) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_PARENT, MSG_CLOSEDSM, None);
        if let Some(rc) = state.forced(DAT_PARENT, MSG_CLOSEDSM) {
            return rc;
        }
        if !state.dsm_open || state.open_source.is_some() {
            return state.fail(ConditionCode::SeqError);
        }
        state.dsm_open = false;
        ReturnCode::Success
    }

    fn identity(&self, _app: &Identity, msg: u16, source: &mut Identity) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_IDENTITY, msg, None);
        if let Some(rc) = state.forced(DAT_IDENTITY, msg) {
            return rc;
        }
        if !state.dsm_open {
            return state.fail(ConditionCode::SeqError);
        }

        match msg {
            MSG_GETDEFAULT => match state.default_source {
                Some(index) => {
                    *source = state.sources[index].clone();
                    ReturnCode::Success
                }
                None => state.fail(ConditionCode::NoDs),
            },
            MSG_GETFIRST | MSG_GETNEXT => {
                state.enum_cursor = if msg == MSG_GETFIRST {
                    0
                } else {
                    state.enum_cursor + 1
                };
                match state.sources.get(state.enum_cursor) {
                    Some(found) => {
                        *source = found.clone();
                        ReturnCode::Success
                    }
                    None => ReturnCode::EndOfList,
                }
            }
            MSG_USERSELECT => match state.user_selection {
                Some(index) => {
                    *source = state.sources[index].clone();
                    ReturnCode::Success
                }
                None => ReturnCode::Cancel,
            },
            MSG_OPENDS => {
                if state.open_source.is_some() {
                    return state.fail(ConditionCode::MaxConnections);
                }
                if !state.sources.iter().any(|s| s.id == source.id) {
                    return state.fail(ConditionCode::NoDs);
                }
                state.open_source = Some(source.id);
                ReturnCode::Success
            }
            MSG_CLOSEDS => {
                if !state.source_is_open(source) || state.enabled {
                    return state.fail(ConditionCode::SeqError);
                }
                state.open_source = None;
                ReturnCode::Success
            }
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn status(&self, _app: &Identity, _source: Option<&Identity>) -> ConditionCode {
        let mut state = self.state();
        state.record(DAT_STATUS, MSG_GET, None);
        std::mem::take(&mut state.condition)
    }

    fn capability(
        &self,
        _app: &Identity,
        source: &Identity,
        msg: u16,
        request: &mut CapabilityRequest,
    ) -> ReturnCode {
        let mut state = self.state();
        let id = request.capability;
        state.record(DAT_CAPABILITY, msg, Some(id));
        if let Some(rc) = state.forced(DAT_CAPABILITY, msg) {
            return rc;
        }
        if !state.source_is_open(source) {
            return state.fail(ConditionCode::SeqError);
        }

        if msg == MSG_SET {
            return state.set_capability(id, request);
        }

        let Some(value) = state.lookup(id) else {
            return state.fail(ConditionCode::CapUnsupported);
        };

        let reply = match msg {
            MSG_GET => value,
            MSG_GETCURRENT | MSG_GETDEFAULT => {
                let source_value = if msg == MSG_GETDEFAULT {
                    state
                        .capabilities
                        .get(&id)
                        .map(|c| c.default.clone())
                        .unwrap_or(value)
                } else {
                    value
                };
                match source_value.current_scalar() {
                    Some(raw) => CapabilityResult::Basic {
                        item_type: source_value.item_type(),
                        value: ItemValue::Scalar(raw),
                    },
                    None => source_value,
                }
            }
            MSG_RESET => {
                if let Some(cap) = state.capabilities.get_mut(&id) {
                    cap.value = cap.default.clone();
                    cap.value.clone()
                } else {
                    value
                }
            }
            _ => return state.fail(ConditionCode::BadProtocol),
        };

        request.con_type = reply.container_type().raw();
        request.container = Some(reply.encode());
        ReturnCode::Success
    }

    fn user_interface(
        &self,
        _app: &Identity,
        source: &Identity,
        msg: u16,
        ui: &mut UserInterface,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_USERINTERFACE, msg, None);
        if let Some(rc) = state.forced(DAT_USERINTERFACE, msg) {
            return rc;
        }
        if !state.source_is_open(source) {
            return state.fail(ConditionCode::SeqError);
        }

        match msg {
            MSG_ENABLEDS => {
                if state.enabled {
                    return state.fail(ConditionCode::SeqError);
                }
                state.enabled = true;
                state.last_ui = Some(*ui);
                if let Some(sim) = state.simulation {
                    state.pages.clear();
                    state.simulate_pages(sim);
                }
                if state.xfer_ready_on_enable && !state.pages.is_empty() {
                    state.events.push_back(MSG_XFERREADY);
                }
                ReturnCode::Success
            }
            MSG_DISABLEDS => {
                if !state.enabled {
                    return state.fail(ConditionCode::SeqError);
                }
                state.enabled = false;
                ReturnCode::Success
            }
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn process_event(
        &self,
        _app: &Identity,
        _source: &Identity,
        _event: &PlatformMessage,
        message: &mut u16,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_EVENT, MSG_PROCESSEVENT, None);
        if let Some(rc) = state.forced(DAT_EVENT, MSG_PROCESSEVENT) {
            return rc;
        }
        match state.events.pop_front() {
            Some(next) => {
                *message = next;
                ReturnCode::DsEvent
            }
            None => {
                *message = MSG_NULL;
                ReturnCode::NotDsEvent
            }
        }
    }

    fn image_info(&self, _app: &Identity, _source: &Identity, info: &mut ImageInfo) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_IMAGEINFO, MSG_GET, None);
        if let Some(rc) = state.forced(DAT_IMAGEINFO, MSG_GET) {
            return rc;
        }
        match state.pages.front() {
            Some(MockPage::Memory { info: page, .. }) => {
                *info = *page;
                ReturnCode::Success
            }
            Some(MockPage::Native(bytes)) => match DibImage::from_bytes(bytes.clone()) {
                Ok(dib) => {
                    let header = dib.header();
                    *info = ImageInfo {
                        x_resolution: Fix32::from_f32(header.x_dpi()),
                        y_resolution: Fix32::from_f32(header.y_dpi()),
                        image_width: header.width,
                        image_length: header.rows() as i32,
                        bits_per_pixel: header.bit_count as i16,
                        ..Default::default()
                    };
                    ReturnCode::Success
                }
                Err(_) => state.fail(ConditionCode::OperationError),
            },
            None => state.fail(ConditionCode::SeqError),
        }
    }

    fn image_layout(
        &self,
        _app: &Identity,
        source: &Identity,
        msg: u16,
        layout: &mut ImageLayout,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_IMAGELAYOUT, msg, None);
        if let Some(rc) = state.forced(DAT_IMAGELAYOUT, msg) {
            return rc;
        }
        if !state.source_is_open(source) {
            return state.fail(ConditionCode::SeqError);
        }
        match msg {
            MSG_GET | MSG_GETCURRENT | MSG_GETDEFAULT => {
                *layout = state.layout;
                ReturnCode::Success
            }
            MSG_SET => {
                let mut frame = layout.frame;
                let mut clamped = false;
                if let Some((width, height)) = state.max_extent {
                    if frame.right.to_f32() > width {
                        frame.right = Fix32::from_f32(width);
                        clamped = true;
                    }
                    if frame.bottom.to_f32() > height {
                        frame.bottom = Fix32::from_f32(height);
                        clamped = true;
                    }
                }
                state.layout.frame = frame;
                if clamped {
                    ReturnCode::CheckStatus
                } else {
                    ReturnCode::Success
                }
            }
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn image_native_xfer(
        &self,
        _app: &Identity,
        _source: &Identity,
        dib: &mut Vec<u8>,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_IMAGENATIVEXFER, MSG_GET, None);
        if let Some(rc) = state.forced(DAT_IMAGENATIVEXFER, MSG_GET) {
            return rc;
        }
        match state.pages.front() {
            Some(MockPage::Native(_)) => {
                if let Some(MockPage::Native(bytes)) = state.pages.pop_front() {
                    *dib = bytes;
                }
                ReturnCode::XferDone
            }
            Some(MockPage::Memory { .. }) => state.fail(ConditionCode::BadProtocol),
            None => state.fail(ConditionCode::SeqError),
        }
    }

    fn setup_mem_xfer(
        &self,
        _app: &Identity,
        _source: &Identity,
        setup: &mut SetupMemXfer,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_SETUPMEMXFER, MSG_GET, None);
        if let Some(rc) = state.forced(DAT_SETUPMEMXFER, MSG_GET) {
            return rc;
        }
        *setup = state.setup;
        ReturnCode::Success
    }

    fn image_mem_xfer(
        &self,
        _app: &Identity,
        _source: &Identity,
        xfer: &mut ImageMemXfer,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_IMAGEMEMXFER, MSG_GET, None);
        if let Some(rc) = state.forced(DAT_IMAGEMEMXFER, MSG_GET) {
            return rc;
        }

        let (info, bytes_per_row, data) = match state.pages.front() {
            Some(MockPage::Memory {
                info,
                bytes_per_row,
                data,
            }) => (*info, *bytes_per_row as usize, data.clone()),
            _ => return state.fail(ConditionCode::SeqError),
        };
        let handle = xfer.memory.the_mem.0;
        let capacity = match state.allocations.get(&handle) {
            Some(buffer) => buffer.len().min(xfer.memory.length as usize),
            None => return state.fail(ConditionCode::BadValue),
        };
        if bytes_per_row == 0 || capacity < bytes_per_row {
            return state.fail(ConditionCode::LowMemory);
        }

        let offset = state.mem_offset;
        let rows = ((data.len() - offset) / bytes_per_row).min(capacity / bytes_per_row);
        let chunk = &data[offset..offset + rows * bytes_per_row];
        if let Some(buffer) = state.allocations.get_mut(&handle) {
            buffer[..chunk.len()].copy_from_slice(chunk);
        }

        xfer.compression = TWCP_NONE;
        xfer.bytes_per_row = bytes_per_row as u32;
        xfer.columns = info.image_width as u32;
        xfer.rows = rows as u32;
        xfer.x_offset = 0;
        xfer.y_offset = (offset / bytes_per_row) as u32;
        xfer.bytes_written = chunk.len() as u32;

        state.mem_offset = offset + chunk.len();
        if state.mem_offset >= data.len() {
            state.mem_offset = 0;
            state.pages.pop_front();
            ReturnCode::XferDone
        } else {
            ReturnCode::Success
        }
    }

    fn pending_xfers(
        &self,
        _app: &Identity,
        _source: &Identity,
        msg: u16,
        pending: &mut PendingXfers,
    ) -> ReturnCode {
        let mut state = self.state();
        state.record(DAT_PENDINGXFERS, msg, None);
        if let Some(rc) = state.forced(DAT_PENDINGXFERS, msg) {
            return rc;
        }
        match msg {
            MSG_ENDXFER => {
                // A partially read memory page is abandoned.
                if state.mem_offset > 0 {
                    state.mem_offset = 0;
                    state.pages.pop_front();
                }
                pending.count = state.pages.len() as i16;
                ReturnCode::Success
            }
            MSG_RESET => {
                state.pages.clear();
                state.mem_offset = 0;
                pending.count = 0;
                ReturnCode::Success
            }
            _ => state.fail(ConditionCode::BadProtocol),
        }
    }

    fn mem_alloc(&self, size: u32) -> Option<MemHandle> {
        let mut state = self.state();
        if state.fail_alloc || size == 0 {
            return None;
        }
        let handle = state.next_handle;
        state.next_handle += HANDLE_BASE;
        state.allocations.insert(handle, vec![0; size as usize]);
        Some(MemHandle(handle))
    }

    fn mem_read(&self, handle: MemHandle, len: usize) -> Vec<u8> {
        let state = self.state();
        state
            .allocations
            .get(&handle.0)
            .map(|buffer| buffer[..len.min(buffer.len())].to_vec())
            .unwrap_or_default()
    }

    fn mem_free(&self, handle: MemHandle) {
        self.state().allocations.remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_mock() -> (MockDsm, Identity, Identity) {
        let mock = MockDsm::new();
        let mut source = mock.add_source("Scanner");
        let mut app = Identity::application("test");
        assert_eq!(mock.open_dsm(&mut app, WindowHandle::NULL), ReturnCode::Success);
        assert_eq!(
            mock.identity(&app, MSG_OPENDS, &mut source),
            ReturnCode::Success
        );
        (mock, app, source)
    }

    #[test]
    fn test_mock_source_enumeration() {
        let mock = MockDsm::new();
        mock.add_source("A");
        mock.add_source("B");
        let mut app = Identity::application("test");
        mock.open_dsm(&mut app, WindowHandle::NULL);

        let mut id = Identity::default();
        assert_eq!(mock.identity(&app, MSG_GETFIRST, &mut id), ReturnCode::Success);
        assert_eq!(id.product_name, "A");
        assert_eq!(mock.identity(&app, MSG_GETNEXT, &mut id), ReturnCode::Success);
        assert_eq!(id.product_name, "B");
        assert_eq!(mock.identity(&app, MSG_GETNEXT, &mut id), ReturnCode::EndOfList);

        assert_eq!(mock.identity(&app, MSG_GETDEFAULT, &mut id), ReturnCode::Success);
        assert_eq!(id.product_name, "A");
        assert_eq!(mock.identity(&app, MSG_USERSELECT, &mut id), ReturnCode::Cancel);
    }

    #[test]
    fn test_mock_capability_set_and_get() {
        let (mock, app, source) = open_mock();
        mock.add_capability(
            CapabilityId::UNITS,
            CapabilityResult::Enumeration {
                item_type: ItemType::UInt16,
                current_index: 0,
                default_index: 0,
                items: vec![ItemValue::Scalar(0), ItemValue::Scalar(1)],
            },
        );

        let mut set = CapabilityRequest::set(
            CapabilityId::UNITS,
            TWON_ONEVALUE,
            codec::encode_one(ItemType::UInt16, 1),
        );
        assert_eq!(
            mock.capability(&app, &source, MSG_SET, &mut set),
            ReturnCode::Success
        );
        assert_eq!(mock.current_value(CapabilityId::UNITS), Some(1));
        assert!(matches!(
            mock.capability_value(CapabilityId::UNITS),
            Some(CapabilityResult::Enumeration {
                current_index: 1,
                ..
            })
        ));

        let mut bad = CapabilityRequest::set(
            CapabilityId::UNITS,
            TWON_ONEVALUE,
            codec::encode_one(ItemType::UInt16, 4),
        );
        assert_eq!(
            mock.capability(&app, &source, MSG_SET, &mut bad),
            ReturnCode::Failure
        );
        assert_eq!(mock.status(&app, Some(&source)), ConditionCode::BadValue);

        let mut get = CapabilityRequest::query(CapabilityId::UNITS);
        assert_eq!(
            mock.capability(&app, &source, MSG_GETCURRENT, &mut get),
            ReturnCode::Success
        );
        assert_eq!(get.con_type, TWON_ONEVALUE);

        let mut absent = CapabilityRequest::query(CapabilityId::DUPLEX);
        assert_eq!(
            mock.capability(&app, &source, MSG_GET, &mut absent),
            ReturnCode::Failure
        );
        assert_eq!(mock.status(&app, Some(&source)), ConditionCode::CapUnsupported);
    }

    #[test]
    fn test_mock_memory_chunks_and_allocations() {
        let (mock, app, source) = open_mock();
        mock.queue_page(MockPage::memory(4, 6, 8, 8, 100.0, |i, y| (i + y) as u8));

        let handle = mock.mem_alloc(16).unwrap();
        let mut xfer = ImageMemXfer::default();
        xfer.memory.the_mem = handle;
        xfer.memory.length = 16;

        let mut total = 0;
        let mut rc = ReturnCode::Success;
        let mut chunks = 0;
        while rc == ReturnCode::Success {
            rc = mock.image_mem_xfer(&app, &source, &mut xfer);
            total += xfer.bytes_written;
            chunks += 1;
        }
        assert_eq!(rc, ReturnCode::XferDone);
        assert_eq!(total, 48);
        assert_eq!(chunks, 3);
        assert_eq!(mock.outstanding_allocations(), 1);
        mock.mem_free(handle);
        assert_eq!(mock.outstanding_allocations(), 0);
    }

    #[test]
    fn test_mock_forced_codes() {
        let (mock, app, source) = open_mock();
        mock.force(
            DAT_USERINTERFACE,
            MSG_ENABLEDS,
            ReturnCode::Cancel,
            ConditionCode::Success,
        );
        let mut ui = UserInterface::default();
        assert_eq!(
            mock.user_interface(&app, &source, MSG_ENABLEDS, &mut ui),
            ReturnCode::Cancel
        );
        assert!(!mock.is_enabled());
        assert_eq!(
            mock.user_interface(&app, &source, MSG_ENABLEDS, &mut ui),
            ReturnCode::Success
        );
        assert_eq!(mock.call_count(DAT_USERINTERFACE, MSG_ENABLEDS), 2);
    }
}
