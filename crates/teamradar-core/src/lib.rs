//! # teamradar-core - Core Domain Types
//!
//! Foundation crate for TeamRadar. Provides error handling, logging setup and
//! the event types shared between the process bridge and the application layer.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`BridgeEvent`] - Line / stream-closed / exited events from the companion process
//! - [`CompanionEvent`] - A classified companion output line
//! - [`Document`] - Decoded JSON object payload
//! - [`Termination`] - Exit code and whether the exit was requested
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with launch and fatal classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use teamradar_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{
    document_path, Account, BridgeEvent, CompanionEvent, Document, ProcessId, RoomInfo,
    RoomUser, StreamKind, Termination, User,
};
