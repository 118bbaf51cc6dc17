//! Companion process management

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use crate::stream::StreamReader;
use teamradar_core::events::{BridgeEvent, ProcessId, StreamKind, Termination};
use teamradar_core::prelude::*;

/// How long `stop()` waits for the companion to honor `quit` before killing it
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// How long `stop()` waits for the pipe readers to drain after exit
pub const READER_DRAIN: Duration = Duration::from_millis(500);

/// Command the companion's input loop treats as a request to exit
const QUIT_COMMAND: &str = "quit";

/// A running companion process and its pipes.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task
/// that records the [`Termination`] and emits `BridgeEvent::Exited` exactly once.
/// Stdout and stderr each get their own [`StreamReader`] task, started before
/// `spawn` returns.
pub struct CompanionProcess {
    id: ProcessId,
    /// Sender for stdin commands
    stdin_tx: mpsc::Sender<String>,
    /// Process ID for logging
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
    /// Filled in by the wait task before `exited` is set.
    termination: Arc<OnceLock<Termination>>,
    /// Read by the wait task to tag the termination as requested.
    stop_requested: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl CompanionProcess {
    /// Spawn the companion at `path` with `args`.
    ///
    /// `path` may be absolute, relative, or a bare name looked up on `PATH`.
    /// Events for this launch are tagged with `id` and sent to `event_tx`.
    pub fn spawn(
        path: &Path,
        args: &[String],
        id: ProcessId,
        event_tx: mpsc::Sender<BridgeEvent>,
    ) -> Result<Self> {
        let program = resolve_executable(path)?;

        // Arguments include credentials; log the count only.
        info!(
            "Spawning companion {} ({} args) as {}",
            program.display(),
            args.len(),
            id
        );

        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::companion_not_found(&program)
                } else {
                    Error::process_spawn(e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Companion {} started with PID: {:?}", id, pid);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::process_spawn("stdin pipe unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process_spawn("stdout pipe unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::process_spawn("stderr pipe unavailable"))?;

        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(Self::stdin_writer(stdin, stdin_rx));

        let readers = vec![
            tokio::spawn(StreamReader::new(id, StreamKind::Stdout).run(stdout, event_tx.clone())),
            tokio::spawn(StreamReader::new(id, StreamKind::Stderr).run(stderr, event_tx.clone())),
        ];

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let termination = Arc::new(OnceLock::new());
        let stop_requested = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            id,
            kill_rx,
            event_tx,
            ExitState {
                exited: Arc::clone(&exited),
                exit_notify: Arc::clone(&exit_notify),
                termination: Arc::clone(&termination),
                stop_requested: Arc::clone(&stop_requested),
            },
        ));

        Ok(Self {
            id,
            stdin_tx,
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
            termination,
            stop_requested,
            readers,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits `BridgeEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. The companion exits on its own or after `quit`: `child.wait()` resolves.
    /// 2. `kill_rx` fires: we kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        id: ProcessId,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<BridgeEvent>,
        state: ExitState,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Companion {} exited with status: {:?}", id, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for companion {}: {}", id, e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing companion {}", id);
                if let Err(e) = child.kill().await {
                    error!("Failed to kill companion {}: {}", id, e);
                }
                match child.wait().await {
                    Ok(status) => {
                        info!("Companion {} killed, exit status: {:?}", id, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        let termination = Termination {
            code,
            requested: state.stop_requested.load(Ordering::Acquire),
        };

        // Record the outcome, then flip the flag and wake waiters, then notify
        // the event channel. Anyone who sees `exited` can read `termination`.
        let _ = state.termination.set(termination);
        state.exited.store(true, Ordering::Release);
        state.exit_notify.notify_waiters();

        debug!("Sending BridgeEvent::Exited {{ {:?} }} for {}", termination, id);
        let _ = event_tx
            .send(BridgeEvent::Exited {
                process: id,
                termination,
            })
            .await;
    }

    /// Write commands to stdin
    async fn stdin_writer(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<String>) {
        while let Some(command) = rx.recv().await {
            debug!("Sending to companion: {}", command);

            if let Err(e) = stdin.write_all(command.as_bytes()).await {
                error!("Failed to write to stdin: {}", e);
                break;
            }
            if let Err(e) = stdin.write_all(b"\n").await {
                error!("Failed to write newline: {}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                break;
            }
        }

        debug!("stdin writer finished");
    }

    /// Send a raw command line to the companion
    pub async fn send(&self, command: &str) -> Result<()> {
        self.stdin_tx
            .send(command.to_string())
            .await
            .map_err(|_| Error::channel_send("stdin channel closed"))
    }

    /// Stop the companion and wait until it has exited.
    ///
    /// 1. Early exit if the process already ended
    /// 2. Send `quit` on stdin
    /// 3. Wait up to [`STOP_GRACE`] for a graceful exit
    /// 4. Force-kill through the wait task if the grace period runs out
    /// 5. Await the exit, then join the pipe readers
    pub async fn stop(&mut self) -> Result<Termination> {
        if let Some(termination) = self.termination.get().copied() {
            info!("Companion {} already exited, nothing to stop", self.id);
            self.join_readers().await;
            return Ok(termination);
        }

        info!("Stopping companion {}", self.id);
        self.stop_requested.store(true, Ordering::Release);

        if let Err(e) = self.send(QUIT_COMMAND).await {
            debug!("Quit command not delivered: {}", e);
        }

        // Create the `notified()` future BEFORE the final `has_exited()` check,
        // so a notification between the check and the await is not missed.
        // It borrows a local clone so `self` is free again for the join below.
        let exit_notify = Arc::clone(&self.exit_notify);
        let notified = exit_notify.notified();
        if !self.has_exited() {
            match tokio::time::timeout(STOP_GRACE, notified).await {
                Ok(()) => info!("Companion {} exited gracefully", self.id),
                Err(_) => {
                    warn!("Timeout waiting for graceful exit, force killing");
                    self.force_kill();
                }
            }
        }

        let termination = self.wait().await;
        self.join_readers().await;
        Ok(termination)
    }

    /// Force kill the process by signalling the wait task.
    fn force_kill(&mut self) {
        warn!("Force killing companion {} via kill channel", self.id);
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may have already exited naturally.
            let _ = tx.send(());
        }
    }

    /// Give the readers a moment to deliver buffered lines, then abort them.
    async fn join_readers(&mut self) {
        for handle in self.readers.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(READER_DRAIN, handle).await.is_err() {
                debug!("Pipe reader still busy after exit, aborting");
                abort.abort();
            }
        }
    }

    /// Wait for the process to exit, without requesting it.
    pub async fn wait(&self) -> Termination {
        await_termination(Arc::clone(&self.exit_notify), Arc::clone(&self.termination)).await
    }

    /// Run `callback` exactly once when the process exits, for any reason.
    pub fn on_terminated<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Termination) + Send + 'static,
    {
        let notify = Arc::clone(&self.exit_notify);
        let slot = Arc::clone(&self.termination);
        tokio::spawn(async move {
            let termination = await_termination(notify, slot).await;
            callback(termination);
        })
    }

    /// Termination, if the process has exited
    pub fn termination(&self) -> Option<Termination> {
        self.termination.get().copied()
    }

    /// Check if the process has already exited.
    ///
    /// Non-blocking, backed by an atomic flag set by the wait task.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Check if the process is still running.
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Get the OS process ID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for CompanionProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("CompanionProcess {} dropped while still running", self.id);
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
        // kill_on_drop(true) on the Child is the final safety net.
        debug!("CompanionProcess {} dropped", self.id);
    }
}

/// Shared exit-state handles given to the wait task
struct ExitState {
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
    termination: Arc<OnceLock<Termination>>,
    stop_requested: Arc<AtomicBool>,
}

async fn await_termination(
    notify: Arc<Notify>,
    slot: Arc<OnceLock<Termination>>,
) -> Termination {
    loop {
        let notified = notify.notified();
        if let Some(termination) = slot.get() {
            return *termination;
        }
        notified.await;
    }
}

/// Resolve the companion path to an executable file.
fn resolve_executable(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::companion_not_found(path));
    }
    which::which(path).map_err(|e| {
        debug!("Could not resolve companion {}: {}", path.display(), e);
        Error::companion_not_found(path)
    })
}
