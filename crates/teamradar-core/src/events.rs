//! Domain event definitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded JSON object recovered from a companion output line.
///
/// Always keyed: a bare array or scalar never becomes a `Document`.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Look up a nested value by dotted path, e.g. `"PostedBy.DisplayName"`.
pub fn document_path<'a>(document: &'a Document, path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

// ─────────────────────────────────────────────────────────
// Companion Payloads
// ─────────────────────────────────────────────────────────

/// Identity as reported by the chat service
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Signed-in account, sent once right after login
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub login_user: String,
}

/// Room description attached to `rooms add`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoomInfo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Room participant attached to `users add|change`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoomUser {
    #[serde(default)]
    pub room_id: u64,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub is_online: bool,
}

// ─────────────────────────────────────────────────────────
// CompanionEvent
// ─────────────────────────────────────────────────────────

/// A classified companion output line.
///
/// The companion prefixes every line with `<routine> <action>` followed by
/// identifiers and, for most actions, one JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum CompanionEvent {
    AccountLogin {
        account: Account,
        document: Document,
    },
    RoomAdded {
        room_id: u64,
        name: Option<String>,
        document: Document,
    },
    RoomRemoved {
        room_id: u64,
    },
    UserJoined {
        room_id: u64,
        user_id: String,
        online: bool,
        document: Document,
    },
    UserChanged {
        room_id: u64,
        user_id: String,
        online: bool,
        document: Document,
    },
    UserLeft {
        room_id: u64,
        user_id: String,
    },
    MessagePosted {
        room_id: u64,
        message_id: u64,
        document: Document,
    },
    /// A polling routine in the companion gave up
    Failure {
        routine: String,
        room_id: Option<u64>,
        message: String,
    },
    /// Diagnostic or unknown output; carries no state change
    Unrecognized {
        routine: String,
        action: String,
    },
}

impl CompanionEvent {
    /// Room this event refers to, if any
    pub fn room_id(&self) -> Option<u64> {
        match self {
            CompanionEvent::RoomAdded { room_id, .. }
            | CompanionEvent::RoomRemoved { room_id }
            | CompanionEvent::UserJoined { room_id, .. }
            | CompanionEvent::UserChanged { room_id, .. }
            | CompanionEvent::UserLeft { room_id, .. }
            | CompanionEvent::MessagePosted { room_id, .. } => Some(*room_id),
            CompanionEvent::Failure { room_id, .. } => *room_id,
            _ => None,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            CompanionEvent::AccountLogin { account, .. } => {
                format!("Signed in as {}", account.login_user)
            }
            CompanionEvent::RoomAdded { room_id, name, .. } => match name {
                Some(name) => format!("Joined room {} ({})", room_id, name),
                None => format!("Joined room {}", room_id),
            },
            CompanionEvent::RoomRemoved { room_id } => format!("Left room {}", room_id),
            CompanionEvent::UserJoined {
                room_id, user_id, ..
            } => format!("{} entered room {}", user_id, room_id),
            CompanionEvent::UserChanged {
                room_id,
                user_id,
                online,
                ..
            } => {
                let presence = if *online { "online" } else { "offline" };
                format!("{} is {} in room {}", user_id, presence, room_id)
            }
            CompanionEvent::UserLeft { room_id, user_id } => {
                format!("{} left room {}", user_id, room_id)
            }
            CompanionEvent::MessagePosted {
                room_id,
                message_id,
                ..
            } => format!("Message {} in room {}", message_id, room_id),
            CompanionEvent::Failure {
                routine, message, ..
            } => format!("{} error: {}", routine, message),
            CompanionEvent::Unrecognized { routine, action } => {
                format!("Unrecognized: {} {}", routine, action)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// BridgeEvent
// ─────────────────────────────────────────────────────────

/// Identifies one launch of the companion.
///
/// Events carry the id of the process that produced them so that late events
/// from a previous launch can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which output pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the companion process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Termination {
    /// Exit code; `None` when killed by a signal or the wait failed
    pub code: Option<i32>,
    /// Whether the exit followed a stop request
    pub requested: bool,
}

/// Events from the companion process
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// One complete line from stdout or stderr, without its terminator
    Line {
        process: ProcessId,
        stream: StreamKind,
        line: String,
    },

    /// A pipe reached end-of-data or failed; sent once per stream
    StreamClosed {
        process: ProcessId,
        stream: StreamKind,
    },

    /// The process has exited; sent exactly once per launch
    Exited {
        process: ProcessId,
        termination: Termination,
    },
}

impl BridgeEvent {
    pub fn process(&self) -> ProcessId {
        match self {
            BridgeEvent::Line { process, .. }
            | BridgeEvent::StreamClosed { process, .. }
            | BridgeEvent::Exited { process, .. } => *process,
        }
    }
}
