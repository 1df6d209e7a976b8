//! Protocol constants.
//!
//! Derived from `twain.h`. Only the triplets, capabilities and value sets
//! this crate actually drives are listed.

// ============================================================================
// Protocol version
// ============================================================================

pub const PROTOCOL_MAJOR: u16 = 2;
pub const PROTOCOL_MINOR: u16 = 4;

/// Length of a `TW_STR32` field including the terminating NUL.
pub const STR32_LEN: usize = 34;

// ============================================================================
// Data groups (DG_*)
// ============================================================================

pub const DG_CONTROL: u32 = 0x0001;
pub const DG_IMAGE: u32 = 0x0002;

/// Application supports DSM 2.0 memory management.
pub const DF_APP2: u32 = 0x2000_0000;

// ============================================================================
// Data argument types (DAT_*)
// ============================================================================

pub const DAT_CAPABILITY: u16 = 0x0001;
pub const DAT_EVENT: u16 = 0x0002;
pub const DAT_IDENTITY: u16 = 0x0003;
pub const DAT_PARENT: u16 = 0x0004;
pub const DAT_PENDINGXFERS: u16 = 0x0005;
pub const DAT_SETUPMEMXFER: u16 = 0x0006;
pub const DAT_STATUS: u16 = 0x0008;
pub const DAT_USERINTERFACE: u16 = 0x0009;
pub const DAT_IMAGEINFO: u16 = 0x0101;
pub const DAT_IMAGELAYOUT: u16 = 0x0102;
pub const DAT_IMAGEMEMXFER: u16 = 0x0103;
pub const DAT_IMAGENATIVEXFER: u16 = 0x0104;

// ============================================================================
// Messages (MSG_*)
// ============================================================================

pub const MSG_NULL: u16 = 0x0000;
pub const MSG_GET: u16 = 0x0001;
pub const MSG_GETCURRENT: u16 = 0x0002;
pub const MSG_GETDEFAULT: u16 = 0x0003;
pub const MSG_GETFIRST: u16 = 0x0004;
pub const MSG_GETNEXT: u16 = 0x0005;
pub const MSG_SET: u16 = 0x0006;
pub const MSG_RESET: u16 = 0x0007;

/// Source has data ready for transfer (posted through the event loop).
pub const MSG_XFERREADY: u16 = 0x0101;
/// Source asks the application to disable and close it.
pub const MSG_CLOSEDSREQ: u16 = 0x0102;
/// Source UI "OK" pressed while showing UI only.
pub const MSG_CLOSEDSOK: u16 = 0x0103;
/// Vendor specific device event.
pub const MSG_DEVICEEVENT: u16 = 0x0104;

pub const MSG_OPENDSM: u16 = 0x0301;
pub const MSG_CLOSEDSM: u16 = 0x0302;
pub const MSG_OPENDS: u16 = 0x0401;
pub const MSG_CLOSEDS: u16 = 0x0402;
pub const MSG_USERSELECT: u16 = 0x0403;
pub const MSG_DISABLEDS: u16 = 0x0501;
pub const MSG_ENABLEDS: u16 = 0x0502;
pub const MSG_PROCESSEVENT: u16 = 0x0601;
pub const MSG_ENDXFER: u16 = 0x0701;

// ============================================================================
// Container types (TWON_*)
// ============================================================================

pub const TWON_ARRAY: u16 = 3;
pub const TWON_ENUMERATION: u16 = 4;
pub const TWON_ONEVALUE: u16 = 5;
pub const TWON_RANGE: u16 = 6;
/// Used on GET requests: the source picks the container.
pub const TWON_DONTCARE16: u16 = 0xFFFF;

// ============================================================================
// Item types (TWTY_*)
// ============================================================================

pub const TWTY_INT8: u16 = 0x0000;
pub const TWTY_INT16: u16 = 0x0001;
pub const TWTY_INT32: u16 = 0x0002;
pub const TWTY_UINT8: u16 = 0x0003;
pub const TWTY_UINT16: u16 = 0x0004;
pub const TWTY_UINT32: u16 = 0x0005;
pub const TWTY_BOOL: u16 = 0x0006;
pub const TWTY_FIX32: u16 = 0x0007;
pub const TWTY_FRAME: u16 = 0x0008;
pub const TWTY_STR32: u16 = 0x0009;
pub const TWTY_STR64: u16 = 0x000A;
pub const TWTY_STR128: u16 = 0x000B;
pub const TWTY_STR255: u16 = 0x000C;
pub const TWTY_HANDLE: u16 = 0x000F;

// ============================================================================
// Memory flags (TWMF_*)
// ============================================================================

pub const TWMF_APPOWNS: u32 = 0x0001;
pub const TWMF_POINTER: u32 = 0x0008;

/// `TW_SETUPMEMXFER` / `TW_IMAGEMEMXFER` "don't care" marker.
pub const TWON_DONTCARE32: u32 = 0xFFFF_FFFF;

// ============================================================================
// Compression (TWCP_*)
// ============================================================================

pub const TWCP_NONE: u16 = 0;

// ============================================================================
// Native transfer
// ============================================================================

/// Size of a `BITMAPINFOHEADER`.
pub const BITMAPINFOHEADER_SIZE: usize = 40;
/// Size of a `BITMAPFILEHEADER`.
pub const BITMAPFILEHEADER_SIZE: usize = 14;
