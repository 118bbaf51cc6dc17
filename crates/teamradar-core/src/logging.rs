//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

const LOG_FILE_NAME: &str = "teamradar.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/teamradar/logs/` so that stdout stays
/// free for status output. Log level is controlled by the `TEAMRADAR_LOG`
/// environment variable.
///
/// # Examples
/// ```bash
/// TEAMRADAR_LOG=debug teamradar --connect
/// TEAMRADAR_LOG=teamradar_bridge=trace teamradar --connect
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    // Default to info, allow override via TEAMRADAR_LOG
    let env_filter = EnvFilter::try_from_env("TEAMRADAR_LOG")
        .unwrap_or_else(|_| EnvFilter::new("teamradar=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("TeamRadar starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("teamradar").join("logs"))
}

