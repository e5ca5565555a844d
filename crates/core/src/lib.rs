//! Core types and utilities for hookflow
//!
//! This is the foundation crate (Layer 0) that all other hookflow crates depend on.
//! It provides:
//! - Base error types
//! - Shared enums (priority levels, phases, strategies, rollback scopes)
//! - The per-invocation execution context and cancellation token
//! - Core behavioral traits (`Hook`, `ExternalProcess`)
//!
//! This crate has no dependencies on other hookflow crates.

pub mod context;
pub mod error;
pub mod traits;
pub mod types;

pub use context::{CancelToken, Compensation, ExecutionContext, HookContext};
pub use error::{Error, Result};
pub use traits::{ExternalProcess, Hook, HookFailure, ProcessOutput, ProcessRequest};
pub use types::{
    ConflictStrategy, ExecutionPhase, HookError, HookErrorKind, PriorityLevel, ResourceHint,
    RollbackScope, TimeSensitivity,
};
