//! teamradar-app - Connection state and orchestration for TeamRadar
//!
//! Holds the settings layer, the connection state machine that companion
//! events feed, and the [`Bridge`] engine that ties them to the process
//! supervisor.

pub mod bridge;
pub mod config;
pub mod connection;

// Re-export primary types
pub use bridge::{Bridge, EVENT_CHANNEL_CAPACITY};
pub use config::{Settings, SettingsKey};
pub use connection::{
    ConnectionObserver, ConnectionSnapshot, ConnectionState, ConnectionStateMachine, ObserverId,
    Room, RoomMembership,
};
