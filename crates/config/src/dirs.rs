//! XDG directory utilities
//!
//! This module provides XDG-compliant directory paths for hookflow.
//! It follows the XDG Base Directory specification using the `xdg` crate:
//! - `XDG_CONFIG_HOME` defaults to ~/.config
//! - `XDG_STATE_HOME` defaults to ~/.local/state

use std::path::PathBuf;
use xdg::BaseDirectories;

/// Get the hookflow config directory
///
/// Returns `$XDG_CONFIG_HOME/hookflow` or `~/.config/hookflow`
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("hookflow").get_config_home()
}

/// Get the hookflow state directory
///
/// Returns `$XDG_STATE_HOME/hookflow` or `~/.local/state/hookflow`
#[must_use]
pub fn state_dir() -> Option<PathBuf> {
    BaseDirectories::with_prefix("hookflow").get_state_home()
}

/// Get the default config file path
///
/// Returns `$XDG_CONFIG_HOME/hookflow/config.json`
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

/// Get the default hooks directory
///
/// Returns `$XDG_CONFIG_HOME/hookflow/hooks`
#[must_use]
pub fn default_hooks_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("hooks"))
}

/// Get the default state database path
///
/// Returns `$XDG_STATE_HOME/hookflow/state.db`
#[must_use]
pub fn default_state_db() -> Option<PathBuf> {
    state_dir().map(|d| d.join("state.db"))
}
