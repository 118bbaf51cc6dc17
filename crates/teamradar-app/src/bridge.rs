//! Bridge engine: wires the process supervisor to the connection state machine
//!
//! The engine is the single owner of [`ConnectionStateMachine`]. Reader and
//! wait tasks only ever talk to it through the event channel, so all state
//! mutation happens on whichever task drives [`Bridge::next_event`].

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::connection::{
    ConnectionObserver, ConnectionSnapshot, ConnectionState, ConnectionStateMachine, ObserverId,
};
use teamradar_bridge::{parse_companion_line, ProcessHandle, ProcessSupervisor};
use teamradar_core::events::{BridgeEvent, CompanionEvent, Termination};
use teamradar_core::prelude::*;

/// Capacity of the channel between the pipe tasks and the engine
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct Bridge {
    settings: Settings,
    supervisor: ProcessSupervisor,
    machine: ConnectionStateMachine,
    event_rx: mpsc::Receiver<BridgeEvent>,
    /// Launch whose events are currently accepted
    handle: Option<ProcessHandle>,
}

impl Bridge {
    pub fn new(settings: Settings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            settings,
            supervisor: ProcessSupervisor::new(event_tx),
            machine: ConnectionStateMachine::new(),
            event_rx,
            handle: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.machine.snapshot()
    }

    pub fn subscribe<O>(&mut self, observer: O) -> ObserverId
    where
        O: ConnectionObserver + 'static,
    {
        self.machine.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.machine.unsubscribe(id)
    }

    pub fn mark_read(&mut self) -> bool {
        self.machine.mark_read()
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Launch the companion with the configured credentials.
    ///
    /// Does nothing unless disconnected. A launch error leaves the state
    /// `Disconnected` and is returned to the caller; it is not retried.
    pub fn connect(&mut self) -> Result<()> {
        if !self.machine.connect_requested() {
            return Ok(());
        }

        let path = self.settings.companion.path.clone();
        let args = self.settings.launch_args();

        match self.supervisor.start(&path, &args) {
            Ok(handle) => {
                info!("Companion {} launched (PID {:?})", handle.id(), handle.pid());
                self.handle = Some(handle);
                self.machine.launch_succeeded();
                Ok(())
            }
            Err(e) => {
                error!("Failed to launch companion: {}", e);
                self.machine.launch_failed(&e);
                Err(e)
            }
        }
    }

    /// Stop the companion and wait until the state is `Disconnected`.
    ///
    /// Does nothing when already disconnected.
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.machine.disconnect_requested() {
            return Ok(());
        }

        let Some(handle) = self.handle else {
            self.machine.terminated(Termination {
                code: None,
                requested: true,
            });
            return Ok(());
        };

        if self.supervisor.stop(handle).await?.is_none() {
            // Already released; no exit event is coming for it.
            self.handle = None;
            self.machine.terminated(Termination {
                code: None,
                requested: true,
            });
            return Ok(());
        }

        // Everything up to the exit event still belongs to this launch.
        while self.handle == Some(handle) {
            match self.event_rx.recv().await {
                Some(event) => {
                    self.handle_event(event);
                }
                None => return Err(Error::ChannelClosed),
            }
        }

        Ok(())
    }

    /// Wait for the next companion event and apply it.
    ///
    /// Returns the classified line, if the event was one.
    pub async fn next_event(&mut self) -> Result<Option<CompanionEvent>> {
        let event = self.event_rx.recv().await.ok_or(Error::ChannelClosed)?;
        let classified = self.handle_event(event);
        self.reap_orphan().await?;
        Ok(classified)
    }

    /// Apply one event from the channel.
    ///
    /// Events from any launch but the current one are dropped.
    pub fn handle_event(&mut self, event: BridgeEvent) -> Option<CompanionEvent> {
        let current = self.handle.map(|handle| handle.id());
        if current != Some(event.process()) {
            trace!("Dropping event from stale companion {}", event.process());
            return None;
        }

        match event {
            BridgeEvent::Line { stream, line, .. } => {
                let classified = parse_companion_line(&line);
                match &classified {
                    Some(event) => {
                        self.machine.apply(event);
                    }
                    None => trace!("{}: {}", stream, line),
                }
                classified
            }
            BridgeEvent::StreamClosed { stream, .. } => {
                self.machine.stream_closed(stream);
                None
            }
            BridgeEvent::Exited { termination, .. } => {
                self.supervisor.release_exited();
                self.handle = None;
                self.machine.terminated(termination);
                None
            }
        }
    }

    /// Stop a companion that is still running after the connection dropped,
    /// e.g. one that closed stdout but did not exit.
    async fn reap_orphan(&mut self) -> Result<()> {
        if self.machine.state() != ConnectionState::Disconnected || !self.supervisor.is_running() {
            return Ok(());
        }
        if let Some(handle) = self.supervisor.current() {
            warn!("Stopping companion {} left running after disconnect", handle.id());
            self.supervisor.stop(handle).await?;
        }
        Ok(())
    }
}
