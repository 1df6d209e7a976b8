//! Host message-loop integration.
//!
//! The host pumps platform messages. While the filter is installed it must
//! pass every message to [`crate::ScanSession::filter_message`] before its
//! own dispatch, and skip dispatch when the session reports it handled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::protocol::WindowHandle;

/// What the session needs from the host's message loop.
pub trait MessageHook: Send + Sync {
    /// Window that parents the source's dialogs and receives its messages.
    fn window_handle(&self) -> WindowHandle;

    /// Whether messages are currently routed to the session.
    fn use_filter(&self) -> bool;

    /// Install (`true`) or remove (`false`) the filter.
    fn set_use_filter(&self, enabled: bool);
}

/// Message hook backed by a flag the host loop polls.
#[derive(Debug, Default)]
pub struct FilterFlag {
    window: WindowHandle,
    enabled: AtomicBool,
    installs: AtomicUsize,
    removals: AtomicUsize,
}

impl FilterFlag {
    pub fn new(window: WindowHandle) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    /// Number of times the filter went from removed to installed.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    /// Number of times the filter went from installed to removed.
    pub fn removal_count(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

impl MessageHook for FilterFlag {
    fn window_handle(&self) -> WindowHandle {
        self.window
    }

    fn use_filter(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_use_filter(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        match (was, enabled) {
            (false, true) => {
                self.installs.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Message filter installed");
            }
            (true, false) => {
                self.removals.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Message filter removed");
            }
            _ => {}
        }
    }
}
