//! Record Codec Module
//!
//! Pure encode/decode logic for the three on-disk artifacts. No file handles
//! live here; callers own the I/O.
//!
//! ## Main Log Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Signature line: "HARNESSLOG 1\n"                        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Record                                                  │
//! │   <logger name>\n                                       │
//! │   <severity>\n                                          │
//! │   <timestamp millis>\n                                  │
//! │   <message byte length>\n                               │
//! │   <message bytes>\n      ← body_start..body_end         │
//! ├─────────────────────────────────────────────────────────┤
//! │ ... more records ...                                    │
//! │ "\0END\n"                ← session end, skipped         │
//! │ ... records from a later session ...                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Index Format (`.rec.index`)
//! ```text
//! ┌──────────────┬───────────┬──────────────┬────────────┬──────────┐
//! │ LoggerId (4) │ Millis (8)│ Severity (4) │ Start (8)  │ End (8)  │
//! └──────────────┴───────────┴──────────────┴────────────┴──────────┘
//!   big-endian, 32 bytes per entry, one per record in write order
//! ```
//!
//! ## Logger Name Index Format (`.log.index`)
//! ```text
//! ┌──────────┬──────────────┐
//! │ Len (2)  │ UTF-8 name   │   repeated, first-seen order
//! └──────────┴──────────────┘
//! ```

mod frame;
mod index;

pub use frame::{
    check_signature, decode_frame, encode_frame, sanitize_logger_name, Decoded, DecodedFrame,
    EncodedFrame, MAX_LOGGER_NAME_LEN,
};
pub use index::{
    decode_index_entries, decode_logger_names, encode_index_entry, encode_logger_name,
};

// =============================================================================
// Shared Constants
// =============================================================================

/// First line of every main log file
pub const SIGNATURE: &[u8] = b"HARNESSLOG 1\n";

/// Line written when a writer session closes
pub const SESSION_END: &[u8] = b"\0END\n";

/// Record terminator and header line separator
pub(crate) const NEWLINE: u8 = b'\n';

/// Size of one record index entry in bytes
pub const RECORD_INDEX_ENTRY_SIZE: usize = 32;
