//! Image transfer engine.
//!
//! Runs once a source has posted `MSG_XFERREADY`: pulls every pending page
//! through the negotiated mechanism, hands each image to the observer and
//! leaves the source back in state 5 when done.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::container::{self, RawRaster};
use crate::dib::DibImage;
use crate::dsm::DsmEntry;
use crate::error::{Result, TwainError};
use crate::events::{panic_message, ScanEvent, ScanObserver, TransferImageArgs};
use crate::protocol::{
    CapabilityId, ImageInfo, ImageLayout, ImageMemXfer, MemHandle, Memory, PendingXfers,
    ReturnCode, SetupMemXfer, TransferMechanism, TwainValue, Units, MSG_ENDXFER, MSG_GET,
    MSG_RESET, TWMF_APPOWNS, TWMF_POINTER, TWON_DONTCARE32,
};
use crate::source::DataSource;
use crate::state::SourceState;

/// Buffer size used when the source expresses no preference.
const DEFAULT_BUFFER_SIZE: u32 = 64 * 1024;

// ============================================================================
// Transferred images
// ============================================================================

/// Image data collected by a buffered memory transfer, plus the metadata
/// needed to interpret it.
#[derive(Debug, Clone)]
pub struct MemoryTransferData {
    /// Concatenated strips, row padding included.
    pub data: Vec<u8>,
    pub units: Units,
    pub image_info: ImageInfo,
    pub image_layout: ImageLayout,
    /// The last strip descriptor the source filled in.
    pub image_mem_xfer: ImageMemXfer,
}

impl MemoryTransferData {
    pub fn bytes_per_row(&self) -> u32 {
        self.image_mem_xfer.bytes_per_row
    }

    /// Row count. Sources that do not know the length up front report -1,
    /// in which case it is derived from the data received.
    pub fn rows(&self) -> u32 {
        if self.image_info.image_length > 0 {
            return self.image_info.image_length as u32;
        }
        match self.bytes_per_row() {
            0 => 0,
            stride => (self.data.len() / stride as usize) as u32,
        }
    }

    pub fn raster(&self) -> RawRaster<'_> {
        RawRaster {
            columns: self.image_info.image_width.max(0) as u32,
            rows: self.rows(),
            bits_per_pixel: self.image_info.bits_per_pixel.max(0) as u16,
            bytes_per_row: self.bytes_per_row(),
            x_resolution: self.image_info.x_resolution,
            y_resolution: self.image_info.y_resolution,
            data: &self.data,
        }
    }

    /// Wrap the raw strips in an uncompressed TIFF.
    pub fn to_tiff(&self) -> Result<Vec<u8>> {
        container::encode_tiff(&self.raster())
    }
}

/// One page handed to [`ScanObserver::on_image_transferred`].
#[derive(Debug, Clone)]
pub enum TransferredImage {
    Native(DibImage),
    Memory(MemoryTransferData),
}

impl TransferredImage {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferredImage::Native(_) => "native",
            TransferredImage::Memory(_) => "memory",
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            TransferredImage::Native(dib) => dib.width(),
            TransferredImage::Memory(mem) => mem.image_info.image_width.max(0) as u32,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            TransferredImage::Native(dib) => dib.height(),
            TransferredImage::Memory(mem) => mem.rows(),
        }
    }

    /// File extension matching [`TransferredImage::to_file_bytes`].
    pub fn file_extension(&self) -> &'static str {
        match self {
            TransferredImage::Native(_) => "bmp",
            TransferredImage::Memory(_) => "tif",
        }
    }

    /// Encode as a standalone file: BMP for native pages, TIFF for memory.
    pub fn to_file_bytes(&self) -> Result<Vec<u8>> {
        match self {
            TransferredImage::Native(dib) => Ok(dib.to_bmp()),
            TransferredImage::Memory(mem) => mem.to_tiff(),
        }
    }
}

// ============================================================================
// Transfer buffer
// ============================================================================

/// Block allocated through the manager, released on drop whatever the
/// outcome of the transfer.
struct TransferBuffer<D: DsmEntry + ?Sized> {
    dsm: Arc<D>,
    handle: MemHandle,
    size: u32,
}

impl<D: DsmEntry + ?Sized> TransferBuffer<D> {
    fn allocate(dsm: Arc<D>, size: u32) -> Result<Self> {
        let handle = dsm.mem_alloc(size).ok_or(TwainError::BufferAllocation(size))?;
        debug!(size, handle = handle.0, "Allocated transfer buffer");
        Ok(Self { dsm, handle, size })
    }

    fn descriptor(&self) -> Memory {
        Memory {
            flags: TWMF_APPOWNS | TWMF_POINTER,
            length: self.size,
            the_mem: self.handle,
        }
    }

    fn read(&self, len: u32) -> Vec<u8> {
        self.dsm.mem_read(self.handle, len.min(self.size) as usize)
    }
}

impl<D: DsmEntry + ?Sized> Drop for TransferBuffer<D> {
    fn drop(&mut self) {
        self.dsm.mem_free(self.handle);
        debug!(handle = self.handle.0, "Released transfer buffer");
    }
}

fn buffer_size(setup: &SetupMemXfer) -> u32 {
    if setup.preferred != 0 && setup.preferred != TWON_DONTCARE32 {
        return setup.preferred;
    }
    let size = DEFAULT_BUFFER_SIZE.max(setup.min_buf_size);
    if setup.max_buf_size != 0 && setup.max_buf_size != TWON_DONTCARE32 {
        size.min(setup.max_buf_size)
    } else {
        size
    }
}

// ============================================================================
// Engine
// ============================================================================

enum PageOutcome {
    /// Source finished the page. `None` when it delivered nothing usable.
    Done(Option<TransferredImage>),
    Cancelled,
}

/// Drives the pending-transfer loop for one `MSG_XFERREADY`.
pub struct TransferEngine<'s, D: DsmEntry + ?Sized, O: ScanObserver + ?Sized> {
    source: &'s mut DataSource<D, O>,
    pages: u32,
}

impl<'s, D: DsmEntry + ?Sized, O: ScanObserver + ?Sized> TransferEngine<'s, D, O> {
    pub fn new(source: &'s mut DataSource<D, O>) -> Self {
        Self { source, pages: 0 }
    }

    /// Transfer every pending page.
    ///
    /// Returns the number of images delivered to the observer. Whatever
    /// happens, outstanding transfers are reset so the source is back in
    /// state 5 afterwards.
    #[instrument(skip(self), fields(source = %self.source.product_name()))]
    pub fn run(&mut self) -> Result<u32> {
        self.source.goto_state(SourceState::TransferReady);
        let mechanism = self.mechanism();
        info!(?mechanism, "Transferring pages");

        let result = self.transfer_pages(mechanism);
        let reset = self.reset_pending();
        match (result, reset) {
            (Ok(delivered), Ok(())) => {
                info!(delivered, pages = self.pages, "Transfer finished");
                Ok(delivered)
            }
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(reset_error)) => {
                warn!(error = %reset_error, "Reset after failed transfer also failed");
                Err(e)
            }
        }
    }

    /// Pages attempted so far, cancelled ones included.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    fn mechanism(&self) -> TransferMechanism {
        let id = CapabilityId::XFER_MECH;
        let current = self
            .source
            .capability(id)
            .get_basic_value()
            .and_then(|value| value.get::<TransferMechanism>(id));
        match current {
            Ok(TransferMechanism::Memory) => TransferMechanism::Memory,
            Ok(TransferMechanism::Native) => TransferMechanism::Native,
            Ok(other) => {
                warn!(?other, "Transfer mechanism not supported, using native");
                TransferMechanism::Native
            }
            Err(e) => {
                debug!(error = %e, "Transfer mechanism unreadable, using native");
                TransferMechanism::Native
            }
        }
    }

    fn transfer_pages(&mut self, mechanism: TransferMechanism) -> Result<u32> {
        let mut delivered = 0;
        loop {
            self.pages += 1;
            let page = self.pages;
            self.source
                .observer()
                .on_event(&ScanEvent::TransferStarted { page, mechanism });

            let outcome = match mechanism {
                TransferMechanism::Memory => self.memory_page(page),
                _ => self.native_page(),
            };
            // End-of-transfer bookkeeping runs even when the page failed.
            let outcome = match (outcome, self.end_transfer()) {
                (Ok(outcome), Ok(())) => outcome,
                (Err(e), Ok(())) | (Ok(_), Err(e)) => return Err(e),
                (Err(e), Err(end_error)) => {
                    warn!(error = %end_error, "End of transfer failed after transfer error");
                    return Err(e);
                }
            };

            match outcome {
                PageOutcome::Cancelled => {
                    self.source
                        .observer()
                        .on_event(&ScanEvent::TransferCancelled { page });
                    return Ok(delivered);
                }
                PageOutcome::Done(None) => {}
                PageOutcome::Done(Some(image)) => {
                    let more = self.source.state() == SourceState::TransferReady;
                    let mut args = TransferImageArgs {
                        page,
                        image,
                        continue_scanning: more,
                    };
                    self.notify(&mut args)?;
                    delivered += 1;
                    if !args.continue_scanning {
                        if more {
                            info!(page, "Observer stopped the scan");
                        }
                        return Ok(delivered);
                    }
                }
            }

            if self.source.state() != SourceState::TransferReady {
                return Ok(delivered);
            }
        }
    }

    fn native_page(&mut self) -> Result<PageOutcome> {
        let mut dib = Vec::new();
        let rc = self.source.dsm().image_native_xfer(
            self.source.app(),
            self.source.identity(),
            &mut dib,
        );
        match rc {
            ReturnCode::XferDone => {
                self.source.goto_state(SourceState::Transferring);
                match DibImage::from_bytes(dib) {
                    Ok(image) => Ok(PageOutcome::Done(Some(TransferredImage::Native(image)))),
                    Err(e) => {
                        warn!(error = %e, "Transfer completed without a usable bitmap");
                        Ok(PageOutcome::Done(None))
                    }
                }
            }
            ReturnCode::Cancel => {
                self.source.goto_state(SourceState::Transferring);
                warn!("Native transfer cancelled by the source");
                Ok(PageOutcome::Cancelled)
            }
            rc => Err(TwainError::Transfer {
                operation: "Native transfer",
                rc,
                cc: self.source.condition_code(),
            }),
        }
    }

    fn memory_page(&mut self, page: u32) -> Result<PageOutcome> {
        let dsm = self.source.dsm_arc();
        let app = self.source.app().clone();
        let identity = self.source.identity().clone();

        let units = self
            .source
            .capability(CapabilityId::UNITS)
            .get_current()
            .ok()
            .and_then(|result| result.current_scalar())
            .and_then(Units::from_raw)
            .unwrap_or(Units::Inches);

        let mut image_info = ImageInfo::default();
        let rc = dsm.image_info(&app, &identity, &mut image_info);
        self.check(rc, "Read image info")?;

        let mut image_layout = ImageLayout::default();
        let rc = dsm.image_layout(&app, &identity, MSG_GET, &mut image_layout);
        self.check(rc, "Read image layout")?;

        let mut setup = SetupMemXfer::default();
        let rc = dsm.setup_mem_xfer(&app, &identity, &mut setup);
        self.check(rc, "Set up memory transfer")?;

        let size = buffer_size(&setup);
        debug!(
            width = image_info.image_width,
            length = image_info.image_length,
            bits = image_info.bits_per_pixel,
            size,
            "Starting memory transfer"
        );
        let buffer = TransferBuffer::allocate(dsm.clone(), size)?;

        let mut data = Vec::new();
        loop {
            let mut xfer = ImageMemXfer {
                memory: buffer.descriptor(),
                ..ImageMemXfer::default()
            };
            let rc = dsm.image_mem_xfer(&app, &identity, &mut xfer);
            match rc {
                ReturnCode::Success | ReturnCode::XferDone => {
                    self.source.goto_state(SourceState::Transferring);
                    data.extend_from_slice(&buffer.read(xfer.bytes_written));
                    self.source.observer().on_event(&ScanEvent::Progress {
                        page,
                        bytes: data.len() as u64,
                    });
                    if rc == ReturnCode::XferDone {
                        return Ok(PageOutcome::Done(Some(TransferredImage::Memory(
                            MemoryTransferData {
                                data,
                                units,
                                image_info,
                                image_layout,
                                image_mem_xfer: xfer,
                            },
                        ))));
                    }
                }
                ReturnCode::Cancel => {
                    self.source.goto_state(SourceState::Transferring);
                    warn!(received = data.len(), "Memory transfer cancelled by the source");
                    return Ok(PageOutcome::Cancelled);
                }
                rc => {
                    return Err(TwainError::Transfer {
                        operation: "Memory transfer",
                        rc,
                        cc: self.source.condition_code(),
                    });
                }
            }
        }
    }

    fn check(&self, rc: ReturnCode, operation: &'static str) -> Result<()> {
        if rc == ReturnCode::Success {
            return Ok(());
        }
        Err(TwainError::Transfer {
            operation,
            rc,
            cc: self.source.condition_code(),
        })
    }

    /// `MSG_ENDXFER` after a page, if the source is in state 7.
    fn end_transfer(&mut self) -> Result<()> {
        if self.source.state() != SourceState::Transferring {
            return Ok(());
        }
        let mut pending = PendingXfers::default();
        let rc = self.source.dsm().pending_xfers(
            self.source.app(),
            self.source.identity(),
            MSG_ENDXFER,
            &mut pending,
        );
        if rc != ReturnCode::Success {
            return Err(TwainError::Transfer {
                operation: "End transfer",
                rc,
                cc: self.source.condition_code(),
            });
        }
        self.source
            .observer()
            .on_event(&ScanEvent::PendingTransfers { count: pending.count });
        debug!(count = pending.count, "Pending transfers");
        self.source.goto_state(if pending.has_more() {
            SourceState::TransferReady
        } else {
            SourceState::Enabled
        });
        Ok(())
    }

    /// `MSG_RESET` of whatever is still pending, if the source is past state 5.
    fn reset_pending(&mut self) -> Result<()> {
        if self.source.state() < SourceState::TransferReady {
            return Ok(());
        }
        let mut pending = PendingXfers::default();
        let rc = self.source.dsm().pending_xfers(
            self.source.app(),
            self.source.identity(),
            MSG_RESET,
            &mut pending,
        );
        if rc != ReturnCode::Success {
            return Err(TwainError::Transfer {
                operation: "Reset pending transfers",
                rc,
                cc: self.source.condition_code(),
            });
        }
        self.source.goto_state(SourceState::Enabled);
        Ok(())
    }

    fn notify(&self, args: &mut TransferImageArgs) -> Result<()> {
        let observer = self.source.observer();
        panic::catch_unwind(AssertUnwindSafe(|| observer.on_image_transferred(args)))
            .map_err(|payload| TwainError::ObserverPanicked(panic_message(&*payload)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dsm::{MockDsm, MockPage};
    use crate::protocol::{
        ConditionCode, Fix32, Identity, WindowHandle, DAT_IMAGEMEMXFER, DAT_IMAGENATIVEXFER,
        DAT_PENDINGXFERS,
    };

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ScanEvent>>,
        images: Mutex<Vec<(u32, TransferredImage, bool)>>,
        stop_after: Option<u32>,
    }

    impl ScanObserver for Recorder {
        fn on_event(&self, event: &ScanEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn on_image_transferred(&self, args: &mut TransferImageArgs) {
            if self.stop_after == Some(args.page) {
                args.continue_scanning = false;
            }
            self.images
                .lock()
                .unwrap()
                .push((args.page, args.image.clone(), args.continue_scanning));
        }
    }

    fn enabled_source(
        dsm: &Arc<MockDsm>,
        observer: Arc<Recorder>,
    ) -> DataSource<MockDsm, Recorder> {
        enabled_source_with(dsm, observer, crate::settings::ScanSettings::default())
    }

    fn enabled_source_with(
        dsm: &Arc<MockDsm>,
        observer: Arc<Recorder>,
        mut settings: crate::settings::ScanSettings,
    ) -> DataSource<MockDsm, Recorder> {
        let mut app = Identity::application("transfer tests");
        dsm.open_dsm(&mut app, WindowHandle::default());
        let mut source =
            DataSource::default_source(dsm.clone(), &app, WindowHandle::default(), observer)
                .unwrap();
        assert!(source.open(&mut settings).unwrap());
        source
    }

    #[test]
    fn test_buffer_size() {
        let setup = |min, max, preferred| SetupMemXfer {
            min_buf_size: min,
            max_buf_size: max,
            preferred,
        };
        assert_eq!(buffer_size(&setup(1024, 8192, 4096)), 4096);
        assert_eq!(buffer_size(&setup(1024, 8192, TWON_DONTCARE32)), 8192);
        assert_eq!(buffer_size(&setup(128 * 1024, 0, 0)), 128 * 1024);
        assert_eq!(buffer_size(&setup(0, TWON_DONTCARE32, 0)), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_memory_data_unknown_length() {
        let data = MemoryTransferData {
            data: vec![0; 40 * 3],
            units: Units::Inches,
            image_info: ImageInfo {
                image_width: 10,
                image_length: -1,
                bits_per_pixel: 24,
                x_resolution: Fix32::from_f32(100.0),
                ..ImageInfo::default()
            },
            image_layout: ImageLayout::default(),
            image_mem_xfer: ImageMemXfer {
                bytes_per_row: 32,
                ..ImageMemXfer::default()
            },
        };
        assert_eq!(data.rows(), 3);
        let image = TransferredImage::Memory(data);
        assert_eq!((image.width(), image.height()), (10, 3));
        assert_eq!(image.file_extension(), "tif");
        assert!(image.to_file_bytes().unwrap().starts_with(b"II"));
    }

    #[test]
    fn test_native_pages_until_none_pending() {
        let dsm = Arc::new(MockDsm::simulated(3));
        let observer = Arc::new(Recorder::default());
        let mut source = enabled_source(&dsm, observer.clone());

        let delivered = TransferEngine::new(&mut source).run().unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(source.state(), SourceState::Enabled);

        let images = observer.images.lock().unwrap();
        let continues: Vec<bool> = images.iter().map(|(_, _, more)| *more).collect();
        assert_eq!(continues, vec![true, true, false]);
        assert!(images.iter().all(|(_, image, _)| image.kind() == "native"));
        // Nothing left for a reset to clear, so none is sent.
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_RESET), 0);
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_ENDXFER), 3);
    }

    #[test]
    fn test_observer_stop_resets_remaining() {
        let dsm = Arc::new(MockDsm::simulated(3));
        let observer = Arc::new(Recorder {
            stop_after: Some(1),
            ..Recorder::default()
        });
        let mut source = enabled_source(&dsm, observer.clone());

        assert_eq!(TransferEngine::new(&mut source).run().unwrap(), 1);
        assert_eq!(source.state(), SourceState::Enabled);
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_RESET), 1);
        assert_eq!(dsm.pending_pages(), 0);
    }

    #[test]
    fn test_native_failure_keeps_first_error() {
        let dsm = Arc::new(MockDsm::simulated(2));
        let observer = Arc::new(Recorder::default());
        let mut source = enabled_source(&dsm, observer.clone());
        dsm.force(
            DAT_IMAGENATIVEXFER,
            MSG_GET,
            ReturnCode::Failure,
            ConditionCode::OperationError,
        );
        dsm.force(
            DAT_PENDINGXFERS,
            MSG_RESET,
            ReturnCode::Failure,
            ConditionCode::SeqError,
        );

        let err = TransferEngine::new(&mut source).run().unwrap_err();
        match err {
            TwainError::Transfer { operation, cc, .. } => {
                assert_eq!(operation, "Native transfer");
                assert_eq!(cc, ConditionCode::OperationError);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Reset failed, so the source still reports state 6.
        assert_eq!(source.state(), SourceState::TransferReady);
        assert!(observer.images.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hard_error_still_resets() {
        let dsm = Arc::new(MockDsm::simulated(3));
        let observer = Arc::new(Recorder::default());
        let mut source = enabled_source(&dsm, observer.clone());
        dsm.force(
            DAT_IMAGENATIVEXFER,
            MSG_GET,
            ReturnCode::Failure,
            ConditionCode::PaperJam,
        );

        let err = TransferEngine::new(&mut source).run().unwrap_err();
        assert_eq!(err.condition_code(), Some(ConditionCode::PaperJam));
        assert_eq!(source.state(), SourceState::Enabled);
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_ENDXFER), 0);
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_RESET), 1);
        assert_eq!(dsm.pending_pages(), 0);
    }

    #[test]
    fn test_memory_allocation_failure() {
        let dsm = Arc::new(MockDsm::simulated(1));
        let observer = Arc::new(Recorder::default());
        let mut source = enabled_source(&dsm, observer.clone());
        source
            .capability(CapabilityId::XFER_MECH)
            .set_value(crate::capability::ItemType::UInt16, 2)
            .unwrap();
        dsm.queue_page(MockPage::memory(4, 2, 8, 4, 100.0, |i, _| i as u8));
        dsm.fail_allocations(true);

        let err = TransferEngine::new(&mut source).run().unwrap_err();
        assert!(matches!(err, TwainError::BufferAllocation(_)));
        assert_eq!(dsm.outstanding_allocations(), 0);
        assert_eq!(source.state(), SourceState::Enabled);
    }

    #[test]
    fn test_memory_cancel_frees_buffer_and_resets() {
        let dsm = Arc::new(MockDsm::simulated(2));
        let observer = Arc::new(Recorder::default());
        let settings = crate::settings::ScanSettings {
            data_transfer_mode: Some(crate::settings::TransferMode::Memory),
            ..Default::default()
        };
        let mut source = enabled_source_with(&dsm, observer.clone(), settings);
        assert_eq!(dsm.pending_pages(), 2);
        dsm.force(
            DAT_IMAGEMEMXFER,
            MSG_GET,
            ReturnCode::Cancel,
            ConditionCode::Success,
        );

        assert_eq!(TransferEngine::new(&mut source).run().unwrap(), 0);
        assert!(observer.images.lock().unwrap().is_empty());
        assert!(observer
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, ScanEvent::TransferCancelled { page: 1 })));
        assert_eq!(dsm.outstanding_allocations(), 0);
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_ENDXFER), 1);
        assert_eq!(dsm.call_count(DAT_PENDINGXFERS, MSG_RESET), 1);
        assert_eq!(source.state(), SourceState::Enabled);
        assert_eq!(dsm.pending_pages(), 0);
    }

    #[test]
    fn test_unusable_bitmap_skips_page() {
        let dsm = Arc::new(MockDsm::simulated(0));
        let observer = Arc::new(Recorder::default());
        let mut source = enabled_source(&dsm, observer.clone());
        dsm.queue_page(MockPage::Native(vec![1, 2, 3]));

        assert_eq!(TransferEngine::new(&mut source).run().unwrap(), 0);
        assert_eq!(source.state(), SourceState::Enabled);
        assert!(observer.images.lock().unwrap().is_empty());
    }

    #[test]
    fn test_observer_panic_is_captured() {
        struct Panicky;
        impl ScanObserver for Panicky {
            fn on_event(&self, _event: &ScanEvent) {}
            fn on_image_transferred(&self, _args: &mut TransferImageArgs) {
                panic!("disk full");
            }
        }

        let dsm = Arc::new(MockDsm::simulated(2));
        let mut app = Identity::application("transfer tests");
        dsm.open_dsm(&mut app, WindowHandle::default());
        let mut source = DataSource::default_source(
            dsm.clone(),
            &app,
            WindowHandle::default(),
            Arc::new(Panicky),
        )
        .unwrap();
        let mut settings = crate::settings::ScanSettings::default();
        assert!(source.open(&mut settings).unwrap());

        let err = TransferEngine::new(&mut source).run().unwrap_err();
        assert!(matches!(err, TwainError::ObserverPanicked(ref m) if m == "disk full"));
        assert_eq!(source.state(), SourceState::Enabled);
        assert_eq!(dsm.pending_pages(), 0);
    }
}
