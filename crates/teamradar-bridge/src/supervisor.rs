//! Ownership of the single companion process across connect/disconnect cycles

use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::process::CompanionProcess;
use teamradar_core::events::{BridgeEvent, ProcessId, Termination};
use teamradar_core::prelude::*;

/// Opaque reference to one launch of the companion.
///
/// The OS resources stay with the [`ProcessSupervisor`]; a handle only names
/// them, and goes stale once that launch has been stopped or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    id: ProcessId,
    pid: Option<u32>,
}

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Launches, tracks and stops the companion process.
///
/// At most one companion runs at a time. All of its output and its exit are
/// delivered on the event channel given to [`ProcessSupervisor::new`].
pub struct ProcessSupervisor {
    event_tx: mpsc::Sender<BridgeEvent>,
    current: Option<CompanionProcess>,
    launches: u64,
}

impl ProcessSupervisor {
    pub fn new(event_tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self {
            event_tx,
            current: None,
            launches: 0,
        }
    }

    /// Launch the companion, or return the running one.
    ///
    /// Calling `start` while a previous launch is still running spawns nothing
    /// and hands back the existing handle.
    pub fn start(&mut self, path: &Path, args: &[String]) -> Result<ProcessHandle> {
        if let Some(process) = &self.current {
            if process.is_running() {
                debug!("Companion {} already running, reusing it", process.id());
                return Ok(handle_of(process));
            }
        }

        let id = ProcessId(self.launches + 1);
        let process = CompanionProcess::spawn(path, args, id, self.event_tx.clone())?;
        self.launches += 1;

        let handle = handle_of(&process);
        // Replacing an exited launch releases whatever it still held.
        self.current = Some(process);
        Ok(handle)
    }

    /// Stop the launch named by `handle` and wait for it to exit.
    ///
    /// Returns `None` if the handle is stale.
    pub async fn stop(&mut self, handle: ProcessHandle) -> Result<Option<Termination>> {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|process| process.id() == handle.id);
        if !is_current {
            debug!("Ignoring stop for stale companion handle {}", handle.id);
            return Ok(None);
        }

        let Some(mut process) = self.current.take() else {
            return Ok(None);
        };
        let termination = process.stop().await?;
        Ok(Some(termination))
    }

    /// Run `callback` once when the launch named by `handle` exits.
    ///
    /// Returns `None` if the handle is stale.
    pub fn on_terminated<F>(&self, handle: ProcessHandle, callback: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Termination) + Send + 'static,
    {
        self.current
            .as_ref()
            .filter(|process| process.id() == handle.id)
            .map(|process| process.on_terminated(callback))
    }

    /// Drop the current launch if it has exited on its own.
    pub fn release_exited(&mut self) -> Option<Termination> {
        let termination = self.current.as_ref()?.termination()?;
        if let Some(process) = self.current.take() {
            debug!("Released exited companion {}", process.id());
        }
        Some(termination)
    }

    /// Send a command line to the running companion
    pub async fn send(&self, command: &str) -> Result<()> {
        match &self.current {
            Some(process) if process.is_running() => process.send(command).await,
            _ => Err(Error::ChannelClosed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(CompanionProcess::is_running)
    }

    /// Handle for the current launch, running or not yet released
    pub fn current(&self) -> Option<ProcessHandle> {
        self.current.as_ref().map(handle_of)
    }

    /// Number of successful launches so far
    pub fn launches(&self) -> u64 {
        self.launches
    }
}

fn handle_of(process: &CompanionProcess) -> ProcessHandle {
    ProcessHandle {
        id: process.id(),
        pid: process.pid(),
    }
}
