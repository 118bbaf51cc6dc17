//! Configuration types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Application settings (`<config_dir>/teamradar/config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub account: AccountSettings,

    #[serde(default)]
    pub companion: CompanionSettings,
}

/// Credentials handed to the companion at launch
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccountSettings {
    /// Chat server URL
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// Where the companion executable lives and what else to pass it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompanionSettings {
    /// Absolute path, relative path, or a name looked up on `PATH`
    #[serde(default = "default_companion_path")]
    pub path: PathBuf,

    /// Extra arguments placed before the credentials
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            path: default_companion_path(),
            args: Vec::new(),
        }
    }
}

fn default_companion_path() -> PathBuf {
    PathBuf::from("teamradar-companion")
}

impl Settings {
    /// Read one of the account values by key. Never fails; unset is empty.
    pub fn get(&self, key: SettingsKey) -> &str {
        match key {
            SettingsKey::Server => &self.account.server,
            SettingsKey::Username => &self.account.username,
            SettingsKey::Password => &self.account.password,
        }
    }

    pub fn set(&mut self, key: SettingsKey, value: impl Into<String>) {
        let slot = match key {
            SettingsKey::Server => &mut self.account.server,
            SettingsKey::Username => &mut self.account.username,
            SettingsKey::Password => &mut self.account.password,
        };
        *slot = value.into();
    }

    /// Companion arguments: any extras, then `<server> <username> <password>`.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = self.companion.args.clone();
        for key in SettingsKey::ALL {
            args.push(self.get(key).to_string());
        }
        args
    }
}

/// Fixed keys addressing the three account values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsKey {
    Server,
    Username,
    Password,
}

impl SettingsKey {
    /// In launch argument order
    pub const ALL: [SettingsKey; 3] = [
        SettingsKey::Server,
        SettingsKey::Username,
        SettingsKey::Password,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsKey::Server => "server",
            SettingsKey::Username => "username",
            SettingsKey::Password => "password",
        }
    }
}

impl fmt::Display for SettingsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingsKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server" | "url" => Ok(SettingsKey::Server),
            "username" | "user" => Ok(SettingsKey::Username),
            "password" => Ok(SettingsKey::Password),
            _ => Err(format!("Unknown setting: {}", s)),
        }
    }
}
