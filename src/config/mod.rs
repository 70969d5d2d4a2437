//! Configuration module for the speech server.
//!
//! Provides CLI argument parsing, configuration management and voice listing.

#[allow(clippy::module_inception)]
mod config;
mod voices;

pub use config::AppConfig;
pub use voices::{print_voice_info, print_voices};
