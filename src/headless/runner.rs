//! Headless mode runner - event loop driving the bridge from stdin commands

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use teamradar_app::{Bridge, ConnectionSnapshot, ConnectionState, Settings};
use teamradar_core::prelude::Result;

use super::HeadlessEvent;

/// Startup behavior of the headless runner
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Connect immediately instead of waiting for a `connect` command
    pub connect: bool,
    /// Exit once the first connection has ended
    pub once: bool,
}

/// Commands accepted on stdin, one per line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessCommand {
    Connect,
    Disconnect,
    MarkRead,
    Quit,
}

/// Parse one stdin line. Empty and unknown lines yield `None`.
pub fn parse_command(line: &str) -> Option<HeadlessCommand> {
    match line.trim() {
        "c" | "connect" => Some(HeadlessCommand::Connect),
        "d" | "disconnect" => Some(HeadlessCommand::Disconnect),
        "r" | "read" => Some(HeadlessCommand::MarkRead),
        "q" | "quit" => Some(HeadlessCommand::Quit),
        "" => None,
        other => {
            warn!("Unknown stdin command: {}", other);
            None
        }
    }
}

/// Run in headless mode - emit NDJSON status events until told to quit
pub async fn run_headless(settings: Settings, options: RunOptions) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("TeamRadar starting in HEADLESS mode");
    info!("Companion: {}", settings.companion.path.display());
    info!("═══════════════════════════════════════════════════════");

    let mut bridge = Bridge::new(settings);
    bridge.subscribe(|snapshot: &ConnectionSnapshot| HeadlessEvent::status(snapshot).emit());
    HeadlessEvent::status(&bridge.snapshot()).emit();

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(cmd_tx);
    });

    if options.connect {
        if let Err(e) = bridge.connect() {
            // With --once there is no later connection to wait for.
            let fatal = options.once && e.is_fatal();
            HeadlessEvent::error(e.to_string(), fatal).emit();
            if fatal {
                return Err(e);
            }
        }
    }

    let result = headless_event_loop(&mut bridge, cmd_rx, options).await;

    // Shutdown
    if let Err(e) = bridge.disconnect().await {
        error!("Error during shutdown: {}", e);
    }

    info!("TeamRadar headless mode exiting");
    result
}

/// Main headless event loop
async fn headless_event_loop(
    bridge: &mut Bridge,
    mut cmd_rx: mpsc::Receiver<HeadlessCommand>,
    options: RunOptions,
) -> Result<()> {
    let mut stdin_open = true;
    let mut was_connected = bridge.state() != ConnectionState::Disconnected;

    loop {
        tokio::select! {
            result = bridge.next_event() => match result {
                Ok(Some(event)) => HeadlessEvent::companion(&event).emit(),
                Ok(None) => {}
                Err(e) => {
                    error!("Bridge event channel failed: {}", e);
                    HeadlessEvent::error(e.to_string(), true).emit();
                    return Err(e);
                }
            },
            cmd = cmd_rx.recv(), if stdin_open => match cmd {
                Some(HeadlessCommand::Connect) => {
                    if let Err(e) = bridge.connect() {
                        HeadlessEvent::error(e.to_string(), false).emit();
                    }
                }
                Some(HeadlessCommand::Disconnect) => {
                    if let Err(e) = bridge.disconnect().await {
                        HeadlessEvent::error(e.to_string(), false).emit();
                    }
                }
                Some(HeadlessCommand::MarkRead) => {
                    bridge.mark_read();
                }
                Some(HeadlessCommand::Quit) => {
                    info!("Quit requested");
                    break;
                }
                None => {
                    // Stdin reached EOF; keep running on companion events alone.
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        let connected = bridge.state() != ConnectionState::Disconnected;
        if options.once && was_connected && !connected {
            info!("Connection ended, exiting");
            break;
        }
        was_connected |= connected;
    }

    Ok(())
}

/// Read commands from stdin and forward them to the event loop (blocking)
fn spawn_stdin_reader_blocking(cmd_tx: mpsc::Sender<HeadlessCommand>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let Some(command) = parse_command(&line) else {
                    continue;
                };
                info!("Stdin: {:?} requested", command);
                if cmd_tx.blocking_send(command).is_err() || command == HeadlessCommand::Quit {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
