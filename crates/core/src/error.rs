//! Base error types for hookflow
//!
//! This module provides the foundation error types that all crates can use.
//! Per-hook runtime failures are not errors at this level: they are captured
//! as [`crate::HookError`] values inside execution reports.

use std::path::PathBuf;
use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {}", issues.join("; "))]
    InvalidConfig {
        /// Every problem found during validation
        issues: Vec<String>,
    },

    /// Unknown conflict resolution strategy name
    #[error("Unknown conflict resolution strategy '{0}'")]
    UnknownStrategy(String),

    /// Unknown rollback scope name
    #[error("Unknown rollback scope '{0}'")]
    UnknownRollbackScope(String),

    /// Unknown execution phase name
    #[error("Unknown execution phase '{0}'")]
    UnknownPhase(String),

    /// Unknown base priority name
    #[error("Unknown priority level '{0}'")]
    UnknownPriority(String),

    /// Hook definition is invalid
    #[error("Hook configuration error: {0}")]
    HookConfig(String),

    /// Hook name registered twice
    #[error("Hook '{0}' is defined more than once")]
    DuplicateHook(String),

    /// Hook name not present in the registry
    #[error("Unknown hook '{0}'")]
    UnknownHook(String),

    /// Dependency cycle among hooks
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle {
        /// Hook names along the cycle, first name repeated at the end
        cycle: Vec<String>,
    },

    /// A hook depends on a hook that runs in a later phase
    #[error(
        "Hook '{hook}' ({hook_phase}) depends on '{dependency}' which runs in the later phase {dependency_phase}"
    )]
    PhaseOrder {
        /// Dependent hook
        hook: String,
        /// Phase of the dependent hook
        hook_phase: String,
        /// Dependency hook
        dependency: String,
        /// Phase of the dependency
        dependency_phase: String,
    },

    /// Hook file could not be loaded
    #[error("Failed to load hook file {}: {message}", path.display())]
    HookFile {
        /// Hook file path
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Hook execution error
    #[error("Hook execution error: {0}")]
    HookExecution(String),

    /// State persistence error
    #[error("State error: {0}")]
    State(String),

    /// Worker pool or monitor thread could not be started
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Generic error message
    #[error("{0}")]
    Message(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
