//! CLI command implementations
//!
//! This module contains all command implementations for the hookflow CLI.

pub mod config;
pub mod hooks;
pub mod metrics;
pub mod optimize;
pub mod plan;
pub mod run;
pub mod watch;
