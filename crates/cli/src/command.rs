//! Command trait for the hookflow CLI
//!
//! Every subcommand that needs the loaded configuration implements
//! [`Command`]. The `execute` method receives a [`RuntimeContext`] with the
//! configuration and the resolved paths.

use crate::common::RuntimeContext;
use anyhow::Result;

/// Trait for all hookflow commands
pub trait Command {
    /// The type returned by this command
    type Output;

    /// Execute the command with the given runtime context
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails. Hook failures during a run are
    /// reported as an error after the report has been printed.
    fn execute(&self, context: &RuntimeContext) -> Result<Self::Output>;
}
