//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level and infrastructure errors.
///
/// Per-line failures (a line without JSON, or JSON that does not decode) are
/// not represented here: they never leave the line they occurred on. See
/// `teamradar_bridge::DecodeError` for the local decode taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Companion Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Companion executable not found or not executable: {path}")]
    CompanionNotFound { path: PathBuf },

    #[error("Failed to spawn companion process: {reason}")]
    ProcessSpawn { reason: String },

    #[error("Companion exited unexpectedly ({})", describe_exit(.code))]
    ProcessExit { code: Option<i32> },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn companion_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CompanionNotFound { path: path.into() }
    }

    pub fn process_spawn(reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            reason: reason.into(),
        }
    }

    pub fn process_exit(code: Option<i32>) -> Self {
        Self::ProcessExit { code }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Whether the companion could not be launched at all.
    ///
    /// A launch error ends the connect attempt; it is never retried automatically.
    pub fn is_launch_error(&self) -> bool {
        matches!(
            self,
            Error::CompanionNotFound { .. } | Error::ProcessSpawn { .. }
        )
    }

    /// Check if this error should end the current connection
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CompanionNotFound { .. }
                | Error::ProcessSpawn { .. }
                | Error::ProcessExit { .. }
                | Error::ChannelClosed
        )
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions (for use with color-eyre)
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
