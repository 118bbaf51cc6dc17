//! Connection state machine fed by companion events and process lifecycle

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use teamradar_core::events::{CompanionEvent, StreamKind, Termination};
use teamradar_core::prelude::*;

/// Whether the companion is up and talking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room the signed-in account is a member of
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Room {
    pub name: Option<String>,
    pub online_users: BTreeSet<String>,
}

/// Active rooms keyed by room id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomMembership {
    rooms: BTreeMap<u64, Room>,
}

impl RoomMembership {
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get(&self, room_id: u64) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rooms.keys().copied()
    }

    /// Formatted count: "No rooms", "1 room", "N rooms"
    pub fn summary(&self) -> String {
        match self.rooms.len() {
            0 => "No rooms".to_string(),
            1 => "1 room".to_string(),
            n => format!("{} rooms", n),
        }
    }

    fn clear(&mut self) {
        self.rooms.clear();
    }
}

/// What observers see after every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub rooms: usize,
    pub summary: String,
    pub account: Option<String>,
    pub unread: usize,
    pub last_error: Option<String>,
}

/// Receives a snapshot on every transition of a [`ConnectionStateMachine`].
///
/// Implemented for any `FnMut(&ConnectionSnapshot) + Send` closure.
pub trait ConnectionObserver: Send {
    fn on_transition(&mut self, snapshot: &ConnectionSnapshot);
}

impl<F> ConnectionObserver for F
where
    F: FnMut(&ConnectionSnapshot) + Send,
{
    fn on_transition(&mut self, snapshot: &ConnectionSnapshot) {
        self(snapshot)
    }
}

/// Returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Owns the connection state and room membership.
///
/// All mutation goes through the transition methods, each of which notifies
/// observers synchronously at most once. Methods return whether anything
/// changed.
#[derive(Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    rooms: RoomMembership,
    account: Option<String>,
    unread: usize,
    last_error: Option<String>,
    /// Set once the caller asked to disconnect; a closing stdout is then expected.
    stop_requested: bool,
    observers: Vec<(ObserverId, Box<dyn ConnectionObserver>)>,
    next_observer: u64,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            rooms: self.rooms.len(),
            summary: self.rooms.summary(),
            account: self.account.clone(),
            unread: self.unread,
            last_error: self.last_error.clone(),
        }
    }

    pub fn subscribe<O>(&mut self, observer: O) -> ObserverId
    where
        O: ConnectionObserver + 'static,
    {
        self.next_observer += 1;
        let id = ObserverId(self.next_observer);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    // ─────────────────────────────────────────────────────────
    // Lifecycle transitions
    // ─────────────────────────────────────────────────────────

    /// `Disconnected -> Connecting`. Ignored in any other state.
    pub fn connect_requested(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            debug!("Connect requested while {}, ignoring", self.state);
            return false;
        }
        self.stop_requested = false;
        self.last_error = None;
        self.transition(ConnectionState::Connecting);
        true
    }

    /// `Connecting -> Connected`
    pub fn launch_succeeded(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            debug!("Launch reported while {}, ignoring", self.state);
            return false;
        }
        self.transition(ConnectionState::Connected);
        true
    }

    /// `Connecting -> Disconnected`, recording why
    pub fn launch_failed(&mut self, error: &Error) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.last_error = Some(error.to_string());
        self.reset_to_disconnected();
        true
    }

    /// Mark the coming shutdown as requested.
    ///
    /// No state change and no notification; the `Disconnected` transition
    /// happens when the process is gone. Returns `false` if already
    /// disconnected.
    pub fn disconnect_requested(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        self.stop_requested = true;
        true
    }

    /// A companion pipe hit end-of-data.
    ///
    /// Expected at exit. Stdout closing while connected without a stop
    /// request counts as a crash.
    pub fn stream_closed(&mut self, stream: StreamKind) -> bool {
        if stream != StreamKind::Stdout
            || self.state != ConnectionState::Connected
            || self.stop_requested
        {
            trace!("{} closed while {}", stream, self.state);
            return false;
        }
        warn!("Companion stdout closed unexpectedly");
        self.last_error = Some("Companion output closed unexpectedly".to_string());
        self.reset_to_disconnected();
        true
    }

    /// The companion process exited, by request or not
    pub fn terminated(&mut self, termination: Termination) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        if !termination.requested && !self.stop_requested {
            let err = Error::process_exit(termination.code);
            warn!("{}", err);
            self.last_error = Some(err.to_string());
        }
        self.reset_to_disconnected();
        true
    }

    // ─────────────────────────────────────────────────────────
    // Companion events
    // ─────────────────────────────────────────────────────────

    /// Apply a classified companion line. Only effective while connected.
    pub fn apply(&mut self, event: &CompanionEvent) -> bool {
        if self.state != ConnectionState::Connected {
            trace!("Ignoring '{}' while {}", event.summary(), self.state);
            return false;
        }

        let changed = match event {
            CompanionEvent::AccountLogin { account, .. } => {
                self.account = Some(account.login_user.clone());
                true
            }
            CompanionEvent::RoomAdded { room_id, name, .. } => {
                match self.rooms.rooms.get_mut(room_id) {
                    Some(room) => {
                        room.name = name.clone().or(room.name.take());
                        false
                    }
                    None => {
                        self.rooms.rooms.insert(
                            *room_id,
                            Room {
                                name: name.clone(),
                                online_users: BTreeSet::new(),
                            },
                        );
                        true
                    }
                }
            }
            CompanionEvent::RoomRemoved { room_id } => self.rooms.rooms.remove(room_id).is_some(),
            CompanionEvent::UserJoined {
                room_id,
                user_id,
                online,
                ..
            }
            | CompanionEvent::UserChanged {
                room_id,
                user_id,
                online,
                ..
            } => match self.rooms.rooms.get_mut(room_id) {
                Some(room) if *online => room.online_users.insert(user_id.clone()),
                Some(room) => room.online_users.remove(user_id),
                None => false,
            },
            CompanionEvent::UserLeft { room_id, user_id } => self
                .rooms
                .rooms
                .get_mut(room_id)
                .is_some_and(|room| room.online_users.remove(user_id)),
            CompanionEvent::MessagePosted { room_id, .. } => {
                if self.rooms.rooms.contains_key(room_id) {
                    self.unread += 1;
                    true
                } else {
                    false
                }
            }
            CompanionEvent::Failure { .. } => {
                warn!("Companion reported: {}", event.summary());
                self.last_error = Some(event.summary());
                true
            }
            CompanionEvent::Unrecognized { .. } => false,
        };

        if changed {
            debug!("{}", event.summary());
            self.notify();
        }
        changed
    }

    /// Clear the unread counter, e.g. once the user has looked
    pub fn mark_read(&mut self) -> bool {
        if self.unread == 0 {
            return false;
        }
        self.unread = 0;
        self.notify();
        true
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    fn reset_to_disconnected(&mut self) {
        self.rooms.clear();
        self.account = None;
        self.unread = 0;
        self.stop_requested = false;
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        info!("Connection {} -> {}", self.state, next);
        self.state = next;
        self.notify();
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        for (_, observer) in self.observers.iter_mut() {
            observer.on_transition(&snapshot);
        }
    }
}
