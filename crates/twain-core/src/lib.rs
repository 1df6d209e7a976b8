//! Twain-Core: application-side TWAIN protocol layer in Rust.
//!
//! This crate talks to a TWAIN data source manager on behalf of an
//! application: it opens the manager, picks a scanner, negotiates scan
//! settings capability by capability, and pulls pages out through native or
//! buffered memory transfer.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, return/condition codes, wire structures
//! - **DSM**: Manager entry-point abstraction (Win32, mock)
//! - **Capability**: Container codec and typed negotiation
//! - **State**: Source state machine (states 3 to 7)
//! - **Source**: Source handle, settings negotiation, open/enable/close
//! - **Transfer**: Pending-transfer loop for native and memory transfer
//! - **Container**: Raw memory strips to uncompressed TIFF
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: Manager connection, source selection and message filter
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use twain_core::{FilterFlag, MockDsm, ScanSession, ScanSettings, WindowHandle};
//!
//! let dsm = Arc::new(MockDsm::simulated(2));
//! let hook = Arc::new(FilterFlag::new(WindowHandle::NULL));
//! let mut session = ScanSession::new(dsm, hook, "scan-example").expect("no manager");
//!
//! let mut settings = ScanSettings::default();
//! settings.dpi = Some(300.0);
//! session.start_scan(&mut settings).expect("scan failed");
//! ```

pub mod capability;
pub mod container;
pub mod dib;
pub mod dsm;
pub mod error;
pub mod events;
pub mod hook;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod source;
pub mod state;
pub mod transfer;

// Re-exports for convenience
pub use capability::{BasicValue, Capability, CapabilityResult, ItemType, ItemValue, Negotiated};
pub use container::{RawRaster, encode_tiff};
pub use dib::DibImage;
pub use dsm::{DsmEntry, MockDsm, MockPage};
#[cfg(windows)]
pub use dsm::Win32Dsm;
pub use error::{Result, TwainError};
pub use events::{NullObserver, ScanEvent, ScanObserver, TracingObserver, TransferImageArgs};
pub use hook::{FilterFlag, MessageHook};
pub use protocol::{CapabilityId, ConditionCode, Identity, PlatformMessage, ReturnCode, WindowHandle};
pub use session::ScanSession;
pub use settings::{AreaSettings, ColourMode, ScanSettings, TransferMode};
pub use source::DataSource;
pub use state::{SourceState, SourceStateMachine};
pub use transfer::{MemoryTransferData, TransferEngine, TransferredImage};
