//! Configuration file handling for TeamRadar
//!
//! A single `config.toml` holds the account credentials and the companion
//! location.

pub mod settings;
pub mod types;

pub use settings::{default_config_path, load_settings, save_settings};
pub use types::*;
