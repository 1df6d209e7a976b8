//! Scan session - owns the manager connection and the selected source.
//!
//! The session opens the data source manager when created, binds the
//! manager's default source, and runs a scan by enabling the source and
//! then reacting to the messages the host loop feeds it through
//! [`ScanSession::filter_message`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::dsm::DsmEntry;
use crate::error::{Result, TwainError};
use crate::events::{panic_message, ScanObserver, TracingObserver};
use crate::hook::MessageHook;
use crate::protocol::{
    Identity, PlatformMessage, ReturnCode, MSG_CLOSEDSOK, MSG_CLOSEDSREQ, MSG_DEVICEEVENT,
    MSG_NULL, MSG_XFERREADY,
};
use crate::settings::ScanSettings;
use crate::source::{self, DataSource};
use crate::state::SourceState;
use crate::transfer::TransferEngine;

/// Application-side TWAIN session.
pub struct ScanSession<D, H, O>
where
    D: DsmEntry + ?Sized,
    H: MessageHook + ?Sized,
    O: ScanObserver + ?Sized,
{
    dsm: Arc<D>,
    hook: Arc<H>,
    observer: Arc<O>,
    app: Identity,
    source: Option<DataSource<D, O>>,
    manager_open: bool,
}

impl<D, H> ScanSession<D, H, TracingObserver>
where
    D: DsmEntry + ?Sized,
    H: MessageHook + ?Sized,
{
    /// Open a session that reports through `tracing`.
    pub fn new(dsm: Arc<D>, hook: Arc<H>, product_name: &str) -> Result<Self> {
        Self::with_observer(dsm, hook, Arc::new(TracingObserver), product_name)
    }
}

impl<D, H, O> ScanSession<D, H, O>
where
    D: DsmEntry + ?Sized,
    H: MessageHook + ?Sized,
    O: ScanObserver + ?Sized,
{
    /// Open the manager and bind its default source.
    ///
    /// A manager without any source is not an error; the session then has
    /// no source until one is selected.
    pub fn with_observer(
        dsm: Arc<D>,
        hook: Arc<H>,
        observer: Arc<O>,
        product_name: &str,
    ) -> Result<Self> {
        let mut app = Identity::application(product_name);
        let rc = dsm.open_dsm(&mut app, hook.window_handle());
        if rc != ReturnCode::Success {
            let cc = dsm.status(&app, None);
            return Err(TwainError::ManagerOpen { rc, cc });
        }
        info!(app = %app, "Data source manager opened");

        let source = match DataSource::default_source(
            dsm.clone(),
            &app,
            hook.window_handle(),
            observer.clone(),
        ) {
            Ok(source) => {
                info!(source = %source.product_name(), "Default source bound");
                Some(source)
            }
            Err(e) => {
                warn!(error = %e, "No default source");
                None
            }
        };

        Ok(Self {
            dsm,
            hook,
            observer,
            app,
            source,
            manager_open: true,
        })
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// The application identity the manager assigned.
    pub fn app(&self) -> &Identity {
        &self.app
    }

    pub fn source(&self) -> Option<&DataSource<D, O>> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut DataSource<D, O>> {
        self.source.as_mut()
    }

    /// State of the bound source, if any.
    pub fn state(&self) -> Option<SourceState> {
        self.source.as_ref().map(|source| source.state())
    }

    /// Whether a scan is running, i.e. the message filter is installed.
    pub fn is_scanning(&self) -> bool {
        self.hook.use_filter()
    }

    /// Product names of every source, in manager order.
    pub fn source_names(&self) -> Result<Vec<String>> {
        Ok(source::source_identities(&*self.dsm, &self.app)?
            .iter()
            .map(|identity| identity.product_name.clone())
            .collect())
    }

    /// Product name of the manager's default source.
    pub fn default_source_name(&self) -> Result<String> {
        Ok(source::default_identity(&*self.dsm, &self.app)?.product_name)
    }

    /// Show the manager's selection dialog. Returns `false` when the user
    /// cancelled; the current source is kept in that case.
    pub fn select_source(&mut self) -> Result<bool> {
        let selected = DataSource::user_selected(
            self.dsm.clone(),
            &self.app,
            self.hook.window_handle(),
            self.observer.clone(),
        )?;
        match selected {
            Some(source) => {
                self.replace_source(source);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Bind the source named `name`, ignoring case.
    pub fn select_source_by_name(&mut self, name: &str) -> Result<()> {
        let source = DataSource::by_name(
            name,
            self.dsm.clone(),
            &self.app,
            self.hook.window_handle(),
            self.observer.clone(),
        )?;
        self.replace_source(source);
        Ok(())
    }

    fn replace_source(&mut self, source: DataSource<D, O>) {
        if let Some(mut previous) = self.source.take() {
            previous.close();
        }
        info!(source = %source.product_name(), "Source selected");
        self.source = Some(source);
    }

    /// Values the bound source currently applies.
    pub fn current_scan_settings(&mut self) -> Result<ScanSettings> {
        self.source
            .as_mut()
            .ok_or(TwainError::NoSource)?
            .current_settings()
    }

    /// Log every capability the bound source supports, opening it for the
    /// duration if needed.
    pub fn debug_capabilities(&mut self) -> Result<()> {
        let source = self.source.as_mut().ok_or(TwainError::NoSource)?;
        let was_open = source.state().is_open();
        source.open_source()?;
        source.debug_capabilities();
        if !was_open {
            source.close();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Open the source, apply `settings` and enable it.
    ///
    /// Returns `true` once the source is enabled; images then arrive as the
    /// host loop feeds messages to [`ScanSession::filter_message`]. On
    /// `false` or an error, including having no source bound, the scan is
    /// already over and the observer has been told so.
    #[instrument(skip(self, settings))]
    pub fn start_scan(&mut self, settings: &mut ScanSettings) -> Result<bool> {
        let Some(source) = self.source.as_mut() else {
            let e = TwainError::NoSource;
            error!(error = %e, "Failed to start scan");
            self.close_and_complete(Some(&e));
            return Err(e);
        };
        self.hook.set_use_filter(true);
        match source.open(settings) {
            Ok(true) => {
                info!(source = %source.product_name(), "Scan started");
                Ok(true)
            }
            Ok(false) => {
                self.close_and_complete(None);
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "Failed to start scan");
                self.close_and_complete(Some(&e));
                Err(e)
            }
        }
    }

    /// Offer a platform message to the source.
    ///
    /// Returns `true` when the message belonged to the source; the host must
    /// not dispatch it further.
    pub fn filter_message(&mut self, message: &PlatformMessage) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        if source.state() < SourceState::Enabled {
            return false;
        }

        let mut event = MSG_NULL;
        let rc = self
            .dsm
            .process_event(&self.app, source.identity(), message, &mut event);
        if rc == ReturnCode::NotDsEvent {
            return false;
        }

        match event {
            MSG_XFERREADY => {
                let result = TransferEngine::new(source).run();
                let keep_open = source.keep_open();
                match result {
                    Ok(_) if keep_open => debug!("Transfer batch done, source kept enabled"),
                    Ok(_) => self.close_and_complete(None),
                    Err(e) => {
                        error!(error = %e, "Transfer failed");
                        self.close_and_complete(Some(&e));
                    }
                }
            }
            MSG_CLOSEDSREQ | MSG_CLOSEDSOK => {
                info!(event, "Source asked to be closed");
                self.close_and_complete(None);
            }
            MSG_DEVICEEVENT => debug!("Device event"),
            _ => {}
        }
        true
    }

    /// Remove the filter, close the source and report the end of the scan.
    fn close_and_complete(&mut self, error: Option<&TwainError>) {
        self.hook.set_use_filter(false);
        if let Some(source) = self.source.as_mut() {
            source.close();
        }
        let observer = &self.observer;
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| observer.on_scanning_complete(error)))
        {
            error!(panic = %panic_message(&*payload), "Scan completion callback panicked");
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Close the source and the manager. Safe to call more than once.
    pub fn close(&mut self) {
        self.hook.set_use_filter(false);
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if self.manager_open {
            let rc = self.dsm.close_dsm(&self.app, self.hook.window_handle());
            if rc != ReturnCode::Success {
                warn!(%rc, "Failed to close data source manager");
            }
            self.manager_open = false;
            info!("Data source manager closed");
        }
    }
}

impl<D, H, O> Drop for ScanSession<D, H, O>
where
    D: DsmEntry + ?Sized,
    H: MessageHook + ?Sized,
    O: ScanObserver + ?Sized,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsm::MockDsm;
    use crate::events::NullObserver;
    use crate::hook::FilterFlag;
    use crate::protocol::{ConditionCode, WindowHandle, DAT_PARENT, MSG_OPENDSM};

    fn session(dsm: &Arc<MockDsm>) -> ScanSession<MockDsm, FilterFlag, NullObserver> {
        ScanSession::with_observer(
            dsm.clone(),
            Arc::new(FilterFlag::new(WindowHandle(42))),
            Arc::new(NullObserver),
            "session tests",
        )
        .unwrap()
    }

    #[test]
    fn test_open_binds_default_source() {
        let dsm = Arc::new(MockDsm::simulated(1));
        dsm.set_default_source("Simulated Feeder");
        let session = session(&dsm);
        assert!(dsm.is_dsm_open());
        assert_eq!(session.source().unwrap().product_name(), "Simulated Feeder");
        assert_eq!(session.state(), Some(SourceState::Closed));
        assert_eq!(
            session.source_names().unwrap(),
            vec!["Simulated Flatbed".to_string(), "Simulated Feeder".to_string()]
        );
        assert_eq!(session.default_source_name().unwrap(), "Simulated Feeder");
    }

    #[test]
    fn test_manager_open_failure() {
        let dsm = Arc::new(MockDsm::simulated(1));
        dsm.force(
            DAT_PARENT,
            MSG_OPENDSM,
            ReturnCode::Failure,
            ConditionCode::LowMemory,
        );
        let result = ScanSession::with_observer(
            dsm.clone(),
            Arc::new(FilterFlag::default()),
            Arc::new(NullObserver),
            "session tests",
        );
        assert!(matches!(
            result,
            Err(TwainError::ManagerOpen {
                cc: ConditionCode::LowMemory,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_manager_has_no_source() {
        let dsm = Arc::new(MockDsm::new());
        let mut session = session(&dsm);
        assert!(session.source().is_none());
        assert!(session.source_names().unwrap().is_empty());
        assert!(matches!(
            session.current_scan_settings(),
            Err(TwainError::NoSource)
        ));
    }

    #[test]
    fn test_start_without_source_completes_once() {
        #[derive(Default)]
        struct Completions(std::sync::Mutex<Vec<Option<String>>>);
        impl ScanObserver for Completions {
            fn on_event(&self, _event: &crate::events::ScanEvent) {}
            fn on_scanning_complete(&self, error: Option<&TwainError>) {
                self.0.lock().unwrap().push(error.map(|e| e.to_string()));
            }
        }

        let dsm = Arc::new(MockDsm::new());
        let hook = Arc::new(FilterFlag::new(WindowHandle(42)));
        let observer = Arc::new(Completions::default());
        let mut session =
            ScanSession::with_observer(dsm.clone(), hook.clone(), observer.clone(), "session tests")
                .unwrap();

        let mut settings = ScanSettings::default();
        assert!(matches!(
            session.start_scan(&mut settings),
            Err(TwainError::NoSource)
        ));
        assert!(!session.is_scanning());
        assert_eq!(
            *observer.0.lock().unwrap(),
            vec![Some(TwainError::NoSource.to_string())]
        );
    }

    #[test]
    fn test_select_by_name() {
        let dsm = Arc::new(MockDsm::simulated(1));
        let mut session = session(&dsm);
        session.select_source_by_name("simulated FEEDER").unwrap();
        assert_eq!(session.source().unwrap().product_name(), "Simulated Feeder");
        assert!(matches!(
            session.select_source_by_name("Nope"),
            Err(TwainError::SourceNotFound(_))
        ));
        assert_eq!(session.source().unwrap().product_name(), "Simulated Feeder");
    }

    #[test]
    fn test_select_cancelled_keeps_source() {
        let dsm = Arc::new(MockDsm::simulated(1));
        let mut session = session(&dsm);
        let before = session.source().unwrap().product_name().to_string();
        dsm.set_user_selection(None);
        assert!(!session.select_source().unwrap());
        assert_eq!(session.source().unwrap().product_name(), before);

        dsm.set_user_selection(Some("Simulated Feeder"));
        assert!(session.select_source().unwrap());
        assert_eq!(session.source().unwrap().product_name(), "Simulated Feeder");
    }

    #[test]
    fn test_filter_ignores_messages_before_enable() {
        let dsm = Arc::new(MockDsm::simulated(1));
        let mut session = session(&dsm);
        assert!(!session.filter_message(&PlatformMessage::default()));
    }

    #[test]
    fn test_debug_capabilities_restores_state() {
        let dsm = Arc::new(MockDsm::simulated(1));
        let mut session = session(&dsm);
        session.debug_capabilities().unwrap();
        assert_eq!(session.state(), Some(SourceState::Closed));
        assert!(dsm.open_source_id().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dsm = Arc::new(MockDsm::simulated(1));
        let mut session = session(&dsm);
        session.close();
        session.close();
        assert!(!dsm.is_dsm_open());
        assert_eq!(dsm.call_count(DAT_PARENT, crate::protocol::MSG_CLOSEDSM), 1);
    }
}
