//! Process-backed hooks
//!
//! External programs are started through the [`ExternalProcess`] capability;
//! [`DuctProcess`] is the production implementation.

use hookflow_core::{
    CancelToken, Error, ExternalProcess, Hook, HookContext, HookFailure, ProcessOutput,
    ProcessRequest, Result,
};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a running child is checked for exit, timeout and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timeout of a rollback command when the hook declares none
const DEFAULT_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Trailing output kept in failure messages
const OUTPUT_TAIL_CHARS: usize = 400;

/// Runs programs with duct, without a shell
#[derive(Debug, Clone, Copy, Default)]
pub struct DuctProcess;

impl ExternalProcess for DuctProcess {
    #[tracing::instrument(skip(self, request, cancel), fields(program = %request.program))]
    fn run(&self, request: &ProcessRequest, cancel: &CancelToken) -> Result<ProcessOutput> {
        let mut expression = duct::cmd(&request.program, &request.args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked();
        if let Some(dir) = &request.working_dir {
            expression = expression.dir(dir);
        }
        for (key, value) in &request.env {
            expression = expression.env(key, value);
        }

        let handle = expression.start().map_err(|e| {
            Error::HookExecution(format!("Failed to start '{}': {e}", request.program))
        })?;
        let deadline = request.timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let finished = handle.try_wait().map_err(|e| {
                Error::HookExecution(format!("Failed to wait for '{}': {e}", request.program))
            })?;
            if let Some(output) = finished {
                return Ok(ProcessOutput {
                    status: output.status.code(),
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    timed_out: false,
                    cancelled: false,
                });
            }

            let cancelled = cancel.is_cancelled();
            let timed_out = deadline.is_some_and(|d| Instant::now() >= d);
            if cancelled || timed_out {
                if let Err(e) = handle.kill() {
                    tracing::warn!(error = %e, "Failed to kill process");
                }
                tracing::debug!(cancelled, timed_out, "Process stopped early");
                return Ok(ProcessOutput {
                    status: None,
                    output: String::new(),
                    timed_out,
                    cancelled,
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Split a command line into a request, honoring quotes
///
/// `git commit -m "Initial commit"` becomes `git` with three arguments.
pub fn parse_command(command: &str) -> Result<ProcessRequest> {
    let parts = shell_words::split(command)
        .map_err(|e| Error::HookConfig(format!("Failed to parse command '{command}': {e}")))?;

    let mut parts = parts.into_iter();
    let program = parts
        .next()
        .ok_or_else(|| Error::HookConfig("Empty command".to_string()))?;
    Ok(ProcessRequest::new(program).args(parts))
}

fn output_tail(output: &str) -> &str {
    let trimmed = output.trim_end();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(OUTPUT_TAIL_CHARS)
        .map_or(0, |(idx, _)| idx);
    &trimmed[start..]
}

/// A hook that runs an external command
pub struct CommandHook {
    command: ProcessRequest,
    rollback: Option<ProcessRequest>,
    process: Arc<dyn ExternalProcess>,
}

impl CommandHook {
    /// Build from command lines
    ///
    /// The rollback command inherits the environment and working directory.
    pub fn new(
        command: &str,
        rollback_command: Option<&str>,
        env: &IndexMap<String, String>,
        working_dir: Option<&Path>,
        rollback_timeout: Option<Duration>,
        process: Arc<dyn ExternalProcess>,
    ) -> Result<Self> {
        let mut request = parse_command(command)?;
        for (key, value) in env {
            request = request.env(key, value);
        }
        if let Some(dir) = working_dir {
            request = request.working_dir(dir);
        }

        let rollback = match rollback_command {
            Some(line) => {
                let mut rollback = parse_command(line)?
                    .timeout(rollback_timeout.unwrap_or(DEFAULT_ROLLBACK_TIMEOUT));
                rollback.env = request.env.clone();
                rollback.working_dir = request.working_dir.clone();
                Some(rollback)
            }
            None => None,
        };

        Ok(Self {
            command: request,
            rollback,
            process,
        })
    }

    /// Command that runs on execute
    #[must_use]
    pub fn command(&self) -> &ProcessRequest {
        &self.command
    }

    fn invocation_env(request: &ProcessRequest, ctx: &HookContext) -> ProcessRequest {
        let payload = serde_json::Value::Object(ctx.execution().data.clone()).to_string();
        request
            .clone()
            .env("HOOKFLOW_HOOK", ctx.hook_name())
            .env("HOOKFLOW_TRIGGER", ctx.trigger())
            .env("HOOKFLOW_PHASE", ctx.phase().as_str())
            .env("HOOKFLOW_CONTEXT", payload)
    }
}

impl Hook for CommandHook {
    fn execute(&self, ctx: &HookContext) -> std::result::Result<(), HookFailure> {
        let request = Self::invocation_env(&self.command, ctx);
        let output = self.process.run(&request, ctx.cancel_token())?;

        // The child may have changed things even if it failed
        if let Some(rollback) = &self.rollback {
            let request = Self::invocation_env(rollback, ctx);
            let process = Arc::clone(&self.process);
            ctx.on_rollback(move || {
                let output = process
                    .run(&request, &CancelToken::new())
                    .map_err(|e| e.to_string())?;
                if output.success() {
                    Ok(())
                } else {
                    Err(format!(
                        "rollback command exited with {:?}: {}",
                        output.status,
                        output_tail(&output.output)
                    ))
                }
            });
        }

        if output.cancelled {
            return Err(HookFailure::new("command cancelled"));
        }
        if output.timed_out {
            return Err(HookFailure::new("command timed out"));
        }
        if !output.success() {
            return Err(HookFailure::new(format!(
                "'{}' exited with {:?}: {}",
                self.command.program,
                output.status,
                output_tail(&output.output)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use hookflow_core::{ExecutionContext, ExecutionPhase};
    use parking_lot::Mutex;

    /// Records requests and replies with a fixed status
    struct FakeProcess {
        status: i32,
        seen: Mutex<Vec<ProcessRequest>>,
    }

    impl FakeProcess {
        fn new(status: i32) -> Arc<Self> {
            Arc::new(Self {
                status,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl ExternalProcess for FakeProcess {
        fn run(&self, request: &ProcessRequest, _: &CancelToken) -> Result<ProcessOutput> {
            self.seen.lock().push(request.clone());
            Ok(ProcessOutput {
                status: Some(self.status),
                output: "boom".to_string(),
                ..ProcessOutput::default()
            })
        }
    }

    fn context() -> HookContext {
        HookContext::new(
            "lint",
            ExecutionPhase::PreValidation,
            Arc::new(ExecutionContext::new("save").with_data("file", "a.rs".into())),
        )
    }

    #[test]
    fn test_parse_command_with_quotes() {
        let request = parse_command(r#"git commit -m "Initial commit""#).unwrap();
        assert_eq!(request.program, "git");
        assert_eq!(request.args, vec!["commit", "-m", "Initial commit"]);
    }

    #[test]
    fn test_parse_empty_command_fails() {
        assert!(parse_command("   ").is_err());
        assert!(parse_command("echo \"unterminated").is_err());
    }

    #[test]
    fn test_output_tail_keeps_end() {
        let long = "x".repeat(1000) + "END";
        let tail = output_tail(&long);
        assert!(tail.ends_with("END"));
        assert!(tail.len() <= OUTPUT_TAIL_CHARS + 1);
        assert_eq!(output_tail("short\n"), "short");
    }

    #[test]
    fn test_command_hook_passes_context_env() {
        let process = FakeProcess::new(0);
        let hook = CommandHook::new(
            "cargo fmt --check",
            None,
            &IndexMap::from([("MODE".to_string(), "ci".to_string())]),
            None,
            None,
            process.clone(),
        )
        .unwrap();

        hook.execute(&context()).unwrap();

        let seen = process.seen.lock();
        let request = &seen[0];
        assert_eq!(request.program, "cargo");
        assert_eq!(request.env["MODE"], "ci");
        assert_eq!(request.env["HOOKFLOW_TRIGGER"], "save");
        assert_eq!(request.env["HOOKFLOW_PHASE"], "pre_validation");
        assert!(request.env["HOOKFLOW_CONTEXT"].contains("a.rs"));
    }

    #[test]
    fn test_failed_command_still_registers_rollback() {
        let process = FakeProcess::new(3);
        let hook = CommandHook::new(
            "deploy --now",
            Some("deploy --undo"),
            &IndexMap::new(),
            None,
            None,
            process.clone(),
        )
        .unwrap();

        let ctx = context();
        let err = hook.execute(&ctx).unwrap_err();
        assert!(err.message().contains("Some(3)"));
        assert_eq!(ctx.compensation_count(), 1);

        let compensation = ctx.take_compensations().pop().unwrap();
        assert!(compensation().is_err());
        assert_eq!(process.seen.lock()[1].args, vec!["--undo"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_duct_process_captures_output() {
        let output = DuctProcess
            .run(
                &ProcessRequest::new("sh").args(["-c", "echo hello; exit 2"]),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(output.status, Some(2));
        assert!(output.output.contains("hello"));
    }

    #[cfg(unix)]
    #[test]
    fn test_duct_process_honors_timeout() {
        let output = DuctProcess
            .run(
                &ProcessRequest::new("sleep")
                    .args(["5"])
                    .timeout(Duration::from_millis(50)),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_duct_process_honors_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let output = DuctProcess
            .run(&ProcessRequest::new("sleep").args(["5"]), &cancel)
            .unwrap();
        assert!(output.cancelled);
    }
}
