//! Configuration management for hookflow
//!
//! This crate handles:
//! - Priority system configuration loading and validation
//! - XDG directory management
//! - Logging initialization

pub mod config;
pub mod dirs;
pub mod logging;

// Re-export error types from core
pub use hookflow_core::{Error, Result};

// Re-export main types
pub use config::{PhaseSettings, PriorityWeights, PrioritySystemConfig, WEIGHT_SUM_TOLERANCE};
pub use dirs::{config_dir, default_config_file, default_hooks_dir, default_state_db, state_dir};
