//! End-to-end scans against the mock manager.

use std::sync::{Arc, Mutex};

use twain_core::protocol::{
    ConditionCode, DAT_IMAGENATIVEXFER, DAT_PENDINGXFERS, DAT_USERINTERFACE, MSG_CLOSEDSREQ,
    MSG_ENABLEDS, MSG_ENDXFER, MSG_GET, MSG_RESET, ReturnCode,
};
use twain_core::state::machine::is_valid_transition;
use twain_core::{
    CapabilityId, ColourMode, FilterFlag, MessageHook, MockDsm, PlatformMessage, ScanEvent,
    ScanObserver, ScanSession, ScanSettings, SourceState, TransferImageArgs, TransferMode,
    TransferredImage, TwainError, WindowHandle,
};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ScanEvent>>,
    images: Mutex<Vec<TransferredImage>>,
    completions: Mutex<Vec<Option<String>>>,
    panic_on_image: bool,
}

impl Recorder {
    fn completions(&self) -> Vec<Option<String>> {
        self.completions.lock().unwrap().clone()
    }

    fn image_count(&self) -> usize {
        self.images.lock().unwrap().len()
    }

    fn pending_counts(&self) -> Vec<i16> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                ScanEvent::PendingTransfers { count } => Some(*count),
                _ => None,
            })
            .collect()
    }
}

impl ScanObserver for Recorder {
    fn on_event(&self, event: &ScanEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn on_image_transferred(&self, args: &mut TransferImageArgs) {
        if self.panic_on_image {
            panic!("observer exploded");
        }
        self.images.lock().unwrap().push(args.image.clone());
    }

    fn on_scanning_complete(&self, error: Option<&TwainError>) {
        self.completions
            .lock()
            .unwrap()
            .push(error.map(|e| e.to_string()));
    }
}

struct Harness {
    dsm: Arc<MockDsm>,
    hook: Arc<FilterFlag>,
    observer: Arc<Recorder>,
    session: ScanSession<MockDsm, FilterFlag, Recorder>,
}

fn harness(dsm: MockDsm, observer: Recorder) -> Harness {
    let dsm = Arc::new(dsm);
    let hook = Arc::new(FilterFlag::new(WindowHandle(0x1234)));
    let observer = Arc::new(observer);
    let session =
        ScanSession::with_observer(dsm.clone(), hook.clone(), observer.clone(), "integration")
            .unwrap();
    Harness {
        dsm,
        hook,
        observer,
        session,
    }
}

fn pump(session: &mut ScanSession<MockDsm, FilterFlag, Recorder>) -> bool {
    session.filter_message(&PlatformMessage::default())
}

#[test]
fn test_native_scan_delivers_every_page() {
    let mut h = harness(MockDsm::simulated(2), Recorder::default());
    let mut settings = ScanSettings {
        dpi: Some(100.0),
        colour_mode: ColourMode::Colour,
        ..ScanSettings::default()
    };

    assert!(h.session.start_scan(&mut settings).unwrap());
    assert!(h.hook.use_filter());
    assert_eq!(h.session.state(), Some(SourceState::Enabled));

    assert!(pump(&mut h.session));
    assert_eq!(h.observer.image_count(), 2);
    {
        let images = h.observer.images.lock().unwrap();
        assert!(images.iter().all(|image| image.kind() == "native"));
        assert_eq!((images[0].width(), images[0].height()), (200, 250));
    }
    assert_eq!(h.observer.completions(), vec![None]);
    assert_eq!(h.session.state(), Some(SourceState::Closed));
    assert_eq!(h.hook.install_count(), 1);
    assert_eq!(h.hook.removal_count(), 1);
    assert!(!h.hook.use_filter());
}

#[test]
fn test_pending_count_drives_loop() {
    let mut h = harness(MockDsm::simulated(3), Recorder::default());
    let mut settings = ScanSettings::default();
    assert!(h.session.start_scan(&mut settings).unwrap());
    assert!(pump(&mut h.session));

    assert_eq!(h.observer.pending_counts(), vec![2, 1, 0]);
    assert_eq!(h.observer.image_count(), 3);
    assert_eq!(h.dsm.call_count(DAT_PENDINGXFERS, MSG_ENDXFER), 3);
    assert_eq!(h.dsm.call_count(DAT_PENDINGXFERS, MSG_RESET), 0);
}

#[test]
fn test_enable_cancelled_completes_once() {
    let dsm = MockDsm::simulated(1);
    dsm.force(
        DAT_USERINTERFACE,
        MSG_ENABLEDS,
        ReturnCode::Cancel,
        ConditionCode::Success,
    );
    let mut h = harness(dsm, Recorder::default());
    let mut settings = ScanSettings::default();

    assert!(!h.session.start_scan(&mut settings).unwrap());
    assert_eq!(h.observer.completions(), vec![None]);
    assert_eq!(h.session.state(), Some(SourceState::Closed));
    assert_eq!(h.hook.removal_count(), 1);
    assert!(!pump(&mut h.session));
}

#[test]
fn test_enable_failure_reports_error() {
    let dsm = MockDsm::simulated(1);
    dsm.force(
        DAT_USERINTERFACE,
        MSG_ENABLEDS,
        ReturnCode::Failure,
        ConditionCode::OperationError,
    );
    let mut h = harness(dsm, Recorder::default());
    let mut settings = ScanSettings::default();

    let err = h.session.start_scan(&mut settings).unwrap_err();
    assert!(matches!(err, TwainError::SourceEnable { .. }));
    let completions = h.observer.completions();
    assert_eq!(completions.len(), 1);
    assert!(completions[0].is_some());
    assert_eq!(h.session.state(), Some(SourceState::Closed));
}

#[test]
fn test_transfer_error_closes_source() {
    let mut h = harness(MockDsm::simulated(2), Recorder::default());
    let mut settings = ScanSettings::default();
    assert!(h.session.start_scan(&mut settings).unwrap());
    h.dsm.force(
        DAT_IMAGENATIVEXFER,
        MSG_GET,
        ReturnCode::Failure,
        ConditionCode::PaperJam,
    );

    assert!(pump(&mut h.session));
    assert_eq!(h.observer.image_count(), 0);
    let completions = h.observer.completions();
    assert_eq!(completions.len(), 1);
    let message = completions[0].clone().unwrap();
    assert!(message.contains("Native transfer"), "{message}");
    assert_eq!(h.session.state(), Some(SourceState::Closed));
    assert_eq!(h.dsm.pending_pages(), 0);
}

#[test]
fn test_cancel_stops_loop_and_resets() {
    let mut h = harness(MockDsm::simulated(3), Recorder::default());
    let mut settings = ScanSettings::default();
    assert!(h.session.start_scan(&mut settings).unwrap());
    h.dsm.force(
        DAT_IMAGENATIVEXFER,
        MSG_GET,
        ReturnCode::Cancel,
        ConditionCode::Success,
    );

    assert!(pump(&mut h.session));
    assert_eq!(h.observer.image_count(), 0);
    assert!(
        h.observer
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, ScanEvent::TransferCancelled { page: 1 }))
    );
    assert_eq!(h.dsm.call_count(DAT_PENDINGXFERS, MSG_ENDXFER), 1);
    assert_eq!(h.dsm.call_count(DAT_PENDINGXFERS, MSG_RESET), 1);
    assert_eq!(h.observer.completions(), vec![None]);
    assert_eq!(h.session.state(), Some(SourceState::Closed));
}

#[test]
fn test_memory_transfer_yields_tiff() {
    let mut h = harness(MockDsm::simulated(1), Recorder::default());
    let mut settings = ScanSettings {
        data_transfer_mode: Some(TransferMode::Memory),
        colour_mode: ColourMode::GreyScale,
        ..ScanSettings::default()
    };
    assert!(h.session.start_scan(&mut settings).unwrap());
    assert_eq!(settings.data_transfer_mode, Some(TransferMode::Memory));

    assert!(pump(&mut h.session));
    assert_eq!(h.dsm.outstanding_allocations(), 0);

    let images = h.observer.images.lock().unwrap();
    assert_eq!(images.len(), 1);
    let TransferredImage::Memory(memory) = &images[0] else {
        panic!("expected a memory transfer, got {}", images[0].kind());
    };
    assert_eq!(memory.image_info.bits_per_pixel, 8);
    let tiff = memory.to_tiff().unwrap();
    let decoded = image::load_from_memory_with_format(&tiff, image::ImageFormat::Tiff).unwrap();
    assert_eq!(decoded.width(), memory.image_info.image_width as u32);
    assert_eq!(decoded.height(), memory.rows());
}

#[test]
fn test_keep_open_waits_for_close_request() {
    let mut h = harness(MockDsm::simulated(1), Recorder::default());
    let mut settings = ScanSettings {
        keep_open: true,
        ..ScanSettings::default()
    };
    assert!(h.session.start_scan(&mut settings).unwrap());

    assert!(pump(&mut h.session));
    assert_eq!(h.observer.image_count(), 1);
    assert!(h.observer.completions().is_empty());
    assert_eq!(h.session.state(), Some(SourceState::Enabled));
    assert!(h.hook.use_filter());

    // Nothing queued: the message is not the source's.
    assert!(!pump(&mut h.session));

    h.dsm.queue_event(MSG_CLOSEDSREQ);
    assert!(pump(&mut h.session));
    assert_eq!(h.observer.completions(), vec![None]);
    assert_eq!(h.session.state(), Some(SourceState::Closed));
    assert!(!h.hook.use_filter());
}

#[test]
fn test_observer_panic_reported_as_error() {
    let mut h = harness(
        MockDsm::simulated(2),
        Recorder {
            panic_on_image: true,
            ..Recorder::default()
        },
    );
    let mut settings = ScanSettings::default();
    assert!(h.session.start_scan(&mut settings).unwrap());

    assert!(pump(&mut h.session));
    let completions = h.observer.completions();
    assert_eq!(completions.len(), 1);
    assert!(completions[0].as_deref().unwrap().contains("observer exploded"));
    assert_eq!(h.session.state(), Some(SourceState::Closed));
}

#[test]
fn test_missing_capabilities_do_not_abort() {
    let dsm = MockDsm::simulated(1);
    for id in [
        CapabilityId::PIXEL_TYPE,
        CapabilityId::BIT_DEPTH,
        CapabilityId::X_RESOLUTION,
        CapabilityId::Y_RESOLUTION,
        CapabilityId::DUPLEX,
        CapabilityId::AUTOMATIC_DESKEW,
    ] {
        dsm.remove_capability(id);
    }
    let mut h = harness(dsm, Recorder::default());
    let mut settings = ScanSettings {
        dpi: Some(300.0),
        colour_mode: ColourMode::GreyScale,
        use_duplex: Some(true),
        automatic_deskew: Some(true),
        ..ScanSettings::default()
    };

    assert!(h.session.start_scan(&mut settings).unwrap());
    assert!(pump(&mut h.session));
    assert_eq!(h.observer.image_count(), 1);
    assert_eq!(h.observer.completions(), vec![None]);
}

#[test]
fn test_state_history_only_valid_steps() {
    let mut h = harness(MockDsm::simulated(3), Recorder::default());
    let mut settings = ScanSettings::default();
    assert!(h.session.start_scan(&mut settings).unwrap());
    assert!(pump(&mut h.session));

    let history = h.session.source().unwrap().state_history().to_vec();
    assert_eq!(history.first(), Some(&SourceState::Closed));
    assert_eq!(history.last(), Some(&SourceState::Closed));
    assert!(history.contains(&SourceState::Transferring));
    for pair in history.windows(2) {
        assert!(
            is_valid_transition(pair[0], pair[1]),
            "{} -> {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn test_session_close_is_idempotent() {
    let mut h = harness(MockDsm::simulated(1), Recorder::default());
    let mut settings = ScanSettings {
        keep_open: true,
        ..ScanSettings::default()
    };
    assert!(h.session.start_scan(&mut settings).unwrap());

    h.session.close();
    assert!(!h.dsm.is_dsm_open());
    assert!(h.dsm.open_source_id().is_none());
    h.session.close();
    assert!(h.session.source().is_none());
}
