//! TeamRadar - supervises the chat companion and reports connection state
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use teamradar::{run_headless, RunOptions};
use teamradar_app::config::{default_config_path, load_settings};
use teamradar_app::SettingsKey;

/// TeamRadar - chat and presence feed bridge
#[derive(Parser, Debug)]
#[command(name = "teamradar")]
#[command(about = "Supervise the TeamRadar companion and print connection state as NDJSON", long_about = None)]
struct Args {
    /// Settings file (defaults to <config dir>/teamradar/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Companion executable, overriding [companion] path
    #[arg(long, value_name = "PATH")]
    companion: Option<PathBuf>,

    /// Chat server URL, overriding [account] server
    #[arg(long)]
    server: Option<String>,

    /// Username, overriding [account] username
    #[arg(long)]
    username: Option<String>,

    /// Password, overriding [account] password
    #[arg(long)]
    password: Option<String>,

    /// Connect immediately instead of waiting for a `connect` command on stdin
    #[arg(long)]
    connect: bool,

    /// Connect immediately and exit when the companion goes away
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if let Err(e) = teamradar_core::logging::init() {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let config_path = args.config.clone().or_else(default_config_path);
    let mut settings = match &config_path {
        Some(path) => load_settings(path),
        None => {
            tracing::warn!("No config directory available, using empty settings");
            Default::default()
        }
    };

    if let Some(path) = args.companion {
        settings.companion.path = path;
    }
    for (key, value) in [
        (SettingsKey::Server, args.server),
        (SettingsKey::Username, args.username),
        (SettingsKey::Password, args.password),
    ] {
        if let Some(value) = value {
            settings.set(key, value);
        }
    }

    let options = RunOptions {
        connect: args.connect || args.once,
        once: args.once,
    };
    run_headless(settings, options).await?;
    Ok(())
}
