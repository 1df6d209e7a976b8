//! Event system for UI decoupling.
//!
//! Lets a CLI or GUI follow a scan without being wired into the protocol
//! code. Informational events go through [`ScanObserver::on_event`]; the two
//! callbacks that carry data (`on_image_transferred`, `on_scanning_complete`)
//! have their own methods.

use std::any::Any;
use std::fmt;

use crate::error::TwainError;
use crate::protocol::{CapabilityId, TransferMechanism};
use crate::state::SourceState;
use crate::transfer::TransferredImage;

/// Events emitted while a source is driven through a scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Source state changed.
    StateChanged { from: SourceState, to: SourceState },
    /// A source was opened (state 4).
    SourceOpened { product: String },
    /// A capability negotiation finished.
    CapabilityNegotiated {
        capability: CapabilityId,
        satisfied: bool,
    },
    /// A page transfer is about to start.
    TransferStarted {
        page: u32,
        mechanism: TransferMechanism,
    },
    /// The source acknowledged the end of a page.
    PendingTransfers { count: i16 },
    /// The source cancelled the current page.
    TransferCancelled { page: u32 },
    /// A memory transfer delivered one strip.
    Progress { page: u32, bytes: u64 },
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanEvent::StateChanged { from, to } => write!(f, "{from} -> {to}"),
            ScanEvent::SourceOpened { product } => write!(f, "opened {product}"),
            ScanEvent::CapabilityNegotiated {
                capability,
                satisfied,
            } => write!(f, "{capability} satisfied={satisfied}"),
            ScanEvent::TransferStarted { page, mechanism } => {
                write!(f, "page {page} ({mechanism:?})")
            }
            ScanEvent::PendingTransfers { count } => write!(f, "{count} pending"),
            ScanEvent::TransferCancelled { page } => write!(f, "page {page} cancelled"),
            ScanEvent::Progress { page, bytes } => write!(f, "page {page}: {bytes} bytes"),
        }
    }
}

/// Payload of the image-transferred callback.
#[derive(Debug)]
pub struct TransferImageArgs {
    /// 1-based page number within the current batch.
    pub page: u32,
    pub image: TransferredImage,
    /// Cleared by the observer to stop after this page. Starts `true` only
    /// when the source reported more pages.
    pub continue_scanning: bool,
}

/// Observer trait for receiving scan events.
///
/// Implement this trait in your UI layer to receive updates. Callbacks run
/// inside the message filter; a panic is caught there and reported through
/// [`ScanObserver::on_scanning_complete`].
pub trait ScanObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ScanEvent);

    /// Called once per delivered page.
    fn on_image_transferred(&self, args: &mut TransferImageArgs) {
        let _ = args;
    }

    /// Called exactly once when a scan started by `start_scan` ends.
    fn on_scanning_complete(&self, error: Option<&TwainError>) {
        let _ = error;
    }
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn on_event(&self, _event: &ScanEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ScanObserver for TracingObserver {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Source state changed");
            }
            ScanEvent::SourceOpened { product } => {
                tracing::info!(product = %product, "Source opened");
            }
            ScanEvent::CapabilityNegotiated {
                capability,
                satisfied,
            } => {
                tracing::debug!(capability = %capability, satisfied, "Capability negotiated");
            }
            ScanEvent::TransferStarted { page, mechanism } => {
                tracing::info!(page, mechanism = ?mechanism, "Transfer started");
            }
            ScanEvent::PendingTransfers { count } => {
                tracing::debug!(count, "Pending transfers");
            }
            ScanEvent::TransferCancelled { page } => {
                tracing::warn!(page, "Transfer cancelled by source");
            }
            ScanEvent::Progress { page, bytes } => {
                tracing::trace!(page, bytes, "Progress");
            }
        }
    }

    fn on_image_transferred(&self, args: &mut TransferImageArgs) {
        tracing::info!(
            page = args.page,
            kind = args.image.kind(),
            width = args.image.width(),
            height = args.image.height(),
            "Image transferred"
        );
    }

    fn on_scanning_complete(&self, error: Option<&TwainError>) {
        match error {
            Some(e) => tracing::error!(error = %e, "Scanning failed"),
            None => tracing::info!("Scanning complete"),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
