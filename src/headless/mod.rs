//! Headless mode - NDJSON status output for scripts and UI front ends
//!
//! Every connection transition and every classified companion line is written
//! to stdout as one JSON object. Each object has an "event" field naming its
//! type, plus a millisecond timestamp.
//!
//! # Example Output
//!
//! ```json
//! {"event":"status","state":"connecting","rooms":0,"summary":"No rooms","account":null,"unread":0,"last_error":null,"timestamp":1704700001000}
//! {"event":"status","state":"connected","rooms":0,"summary":"No rooms","account":null,"unread":0,"last_error":null,"timestamp":1704700001010}
//! {"event":"companion","routine":"rooms","summary":"Joined room 8214 (General)","room_id":8214,"timestamp":1704700002000}
//! ```

pub mod runner;

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use teamradar_app::{ConnectionSnapshot, ConnectionState};
use teamradar_core::CompanionEvent;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// The connection state machine notified its observers
    Status {
        state: ConnectionState,
        rooms: usize,
        summary: String,
        account: Option<String>,
        unread: usize,
        last_error: Option<String>,
        timestamp: i64,
    },

    /// A companion line was classified
    Companion {
        routine: String,
        summary: String,
        room_id: Option<u64>,
        timestamp: i64,
    },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        // NDJSON: one object per line, flushed immediately
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn status(snapshot: &ConnectionSnapshot) -> Self {
        Self::Status {
            state: snapshot.state,
            rooms: snapshot.rooms,
            summary: snapshot.summary.clone(),
            account: snapshot.account.clone(),
            unread: snapshot.unread,
            last_error: snapshot.last_error.clone(),
            timestamp: Self::now(),
        }
    }

    pub fn companion(event: &CompanionEvent) -> Self {
        let routine = match event {
            CompanionEvent::AccountLogin { .. } => "accounts",
            CompanionEvent::RoomAdded { .. } | CompanionEvent::RoomRemoved { .. } => "rooms",
            CompanionEvent::UserJoined { .. }
            | CompanionEvent::UserChanged { .. }
            | CompanionEvent::UserLeft { .. } => "users",
            CompanionEvent::MessagePosted { .. } => "messages",
            CompanionEvent::Failure { routine, .. }
            | CompanionEvent::Unrecognized { routine, .. } => routine.as_str(),
        };
        Self::Companion {
            routine: routine.to_string(),
            summary: event.summary(),
            room_id: event.room_id(),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamradar_app::ConnectionStateMachine;
    use teamradar_core::Document;

    #[test]
    fn test_status_serialization() {
        let mut machine = ConnectionStateMachine::new();
        machine.connect_requested();
        let event = HeadlessEvent::status(&machine.snapshot());
        let json = serde_json::to_string(&event).expect("serialization failed");

        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");

        assert_eq!(value["event"], "status");
        assert_eq!(value["state"], "connecting");
        assert_eq!(value["summary"], "No rooms");
        assert_eq!(value["rooms"], 0);
        assert!(value["last_error"].is_null());
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_companion_serialization() {
        let event = HeadlessEvent::companion(&CompanionEvent::RoomAdded {
            room_id: 8214,
            name: Some("General".to_string()),
            document: Document::new(),
        });
        let json = serde_json::to_string(&event).expect("serialization failed");

        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");

        assert_eq!(value["event"], "companion");
        assert_eq!(value["routine"], "rooms");
        assert_eq!(value["summary"], "Joined room 8214 (General)");
        assert_eq!(value["room_id"], 8214);
    }

    #[test]
    fn test_failure_keeps_routine() {
        let event = HeadlessEvent::companion(&CompanionEvent::Failure {
            routine: "messages".to_string(),
            room_id: Some(3),
            message: "timeout".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["routine"], "messages");
        assert_eq!(value["room_id"], 3);
    }

    #[test]
    fn test_error_serialization() {
        let event = HeadlessEvent::error("Companion not found".to_string(), true);
        let json = serde_json::to_string(&event).expect("serialization failed");

        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");

        assert_eq!(value["event"], "error");
        assert_eq!(value["message"], "Companion not found");
        assert_eq!(value["fatal"], true);
        assert!(value["timestamp"].is_number());
    }
}
