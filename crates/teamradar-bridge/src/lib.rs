//! # teamradar-bridge - Companion Process Bridge
//!
//! Launches the TeamRadar companion executable, reads its stdout and stderr
//! line by line, and classifies each line into a [`CompanionEvent`].
//!
//! Depends on [`teamradar_core`] for event types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`ProcessSupervisor`] - Owns at most one companion launch at a time
//! - [`ProcessHandle`] - Names one launch; goes stale after stop or replacement
//! - [`CompanionProcess`] - A single spawned companion with its pipes
//!
//! ### Output Handling
//! - [`LineBuffer`] / [`StreamReader`] - Chunk-to-line splitting for one pipe
//! - [`parse_companion_line()`] - Classify one line of companion stdout
//! - [`extract_json()`] / [`decode_document()`] - Recover the JSON payload of a line

pub mod process;
pub mod protocol;
pub mod stream;
pub mod supervisor;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use process::{CompanionProcess, READER_DRAIN, STOP_GRACE};
pub use protocol::{decode_document, decode_line, extract_json, parse_companion_line, DecodeError};
pub use stream::{LineBuffer, StreamReader, READ_CHUNK_SIZE};
pub use supervisor::{ProcessHandle, ProcessSupervisor};
/// Re-exported from `teamradar_core` for convenience.
pub use teamradar_core::{BridgeEvent, CompanionEvent, ProcessId, StreamKind, Termination};
