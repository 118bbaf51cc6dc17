//! TeamRadar Library
//!
//! Headless host for the TeamRadar companion event bridge.

pub mod headless;

// Re-export main entry points
pub use headless::runner::{run_headless, RunOptions};
