//! Settings file for `<config_dir>/teamradar/config.toml`

use super::types::{Settings, SettingsKey};
use std::path::{Path, PathBuf};
use teamradar_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "teamradar";

/// Default settings location, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Load settings from `config_path`.
///
/// Never fails: an unreadable or malformed file yields defaults, so every
/// account value reads as an empty string.
pub fn load_settings(config_path: &Path) -> Settings {
    if !config_path.exists() {
        warn!("No config file at {:?}, using empty credentials", config_path);
        return Settings::default();
    }

    let settings = match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str::<Settings>(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    };

    for key in SettingsKey::ALL {
        if settings.get(key).is_empty() {
            warn!("Setting '{}' is empty", key);
        }
    }

    settings
}

/// Save settings to `config_path`, creating its directory if needed.
///
/// Writes a sibling temp file and renames it over the target.
pub fn save_settings(config_path: &Path, settings: &Settings) -> Result<()> {
    let dir = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {:?}", dir))?;
    }

    let temp_path = dir.join(".config.toml.tmp");

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("{}{}", generate_config_header(), content);

    std::fs::write(&temp_path, &full_content)
        .with_context(|| format!("Failed to write {:?}", temp_path))?;

    std::fs::rename(&temp_path, config_path).context("Failed to replace settings file")?;

    info!("Saved settings to {:?}", config_path);
    Ok(())
}

fn generate_config_header() -> String {
    r#"# TeamRadar Configuration
# [account] values are passed to the companion as <server> <username> <password>

"#
    .to_string()
}
