//! Core behavioral traits for hookflow components
//!
//! Hook bodies and external tools are reached only through these traits, so
//! the engine never depends on how a hook is implemented.

use crate::Result;
use crate::context::{CancelToken, HookContext};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error returned by a hook body
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HookFailure {
    message: String,
}

impl HookFailure {
    /// Create a failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Failure message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HookFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<crate::Error> for HookFailure {
    fn from(err: crate::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A unit of work bound to one or more triggers
///
/// Implementations must be thread-safe: hooks in the same batch run
/// concurrently. Long-running bodies should poll
/// [`HookContext::is_cancelled`] and return early once it is set.
///
/// # Examples
///
/// ```ignore
/// let hook = |ctx: &HookContext| -> Result<(), HookFailure> {
///     ctx.on_rollback(|| Ok(()));
///     Ok(())
/// };
/// ```
pub trait Hook: Send + Sync {
    /// Run the hook
    fn execute(&self, ctx: &HookContext) -> std::result::Result<(), HookFailure>;
}

impl<F> Hook for F
where
    F: Fn(&HookContext) -> std::result::Result<(), HookFailure> + Send + Sync,
{
    fn execute(&self, ctx: &HookContext) -> std::result::Result<(), HookFailure> {
        self(ctx)
    }
}

/// Invocation of an external program
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    /// Program to run
    pub program: String,
    /// Arguments, passed without a shell
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: IndexMap<String, String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    /// Request to run `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of an external program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when killed
    pub status: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
    /// Killed because the timeout elapsed
    pub timed_out: bool,
    /// Killed because cancellation was requested
    pub cancelled: bool,
}

impl ProcessOutput {
    /// Exited normally with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Capability for running external programs
///
/// Returns `Err` only when the program could not be started; non-zero exits,
/// timeouts and cancellation are reported through [`ProcessOutput`].
pub trait ExternalProcess: Send + Sync {
    /// Run a program to completion, timeout or cancellation
    fn run(&self, request: &ProcessRequest, cancel: &CancelToken) -> Result<ProcessOutput>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::context::ExecutionContext;
    use crate::types::ExecutionPhase;
    use std::sync::Arc;

    #[test]
    fn test_closure_implements_hook() {
        let hook = |ctx: &HookContext| -> std::result::Result<(), HookFailure> {
            if ctx.trigger() == "fail" {
                Err("refused".into())
            } else {
                Ok(())
            }
        };

        let ok_ctx = HookContext::new(
            "h",
            ExecutionPhase::CoreProcessing,
            Arc::new(ExecutionContext::new("save")),
        );
        assert!(hook.execute(&ok_ctx).is_ok());

        let fail_ctx = HookContext::new(
            "h",
            ExecutionPhase::CoreProcessing,
            Arc::new(ExecutionContext::new("fail")),
        );
        assert_eq!(hook.execute(&fail_ctx).unwrap_err().message(), "refused");
    }

    #[test]
    fn test_process_request_builder() {
        let req = ProcessRequest::new("git")
            .args(["status", "--short"])
            .env("GIT_PAGER", "cat")
            .working_dir("/tmp")
            .timeout(Duration::from_secs(2));

        assert_eq!(req.program, "git");
        assert_eq!(req.args, vec!["status", "--short"]);
        assert_eq!(req.env.get("GIT_PAGER").map(String::as_str), Some("cat"));
        assert_eq!(req.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_process_output_success() {
        let ok = ProcessOutput {
            status: Some(0),
            ..ProcessOutput::default()
        };
        let killed = ProcessOutput {
            status: None,
            timed_out: true,
            ..ProcessOutput::default()
        };
        assert!(ok.success());
        assert!(!killed.success());
    }
}
