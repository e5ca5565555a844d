//! Per-invocation context handed to the engine and to hook bodies

use crate::types::{ExecutionPhase, ResourceHint, TimeSensitivity};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Compensating action registered by a hook
///
/// Runs at most once, during rollback.
pub type Compensation = Box<dyn FnOnce() -> std::result::Result<(), String> + Send + 'static>;

/// Cooperative cancellation flag shared between the engine and a hook body
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn default_enable_rollback() -> bool {
    true
}

/// Context of one trigger firing
///
/// Created by the caller, read-only while a plan is built and executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Trigger that fired
    pub trigger: String,

    /// Urgency of this firing
    #[serde(default)]
    pub time_sensitivity: TimeSensitivity,

    /// Allow rollback for this run (also gated by configuration)
    #[serde(default = "default_enable_rollback")]
    pub enable_rollback: bool,

    /// Resource estimates per hook, overriding the hook's own hint
    #[serde(default)]
    pub resource_hints: IndexMap<String, ResourceHint>,

    /// Free-form payload passed through to hook bodies
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ExecutionContext {
    /// Context with default settings for a trigger
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            time_sensitivity: TimeSensitivity::Normal,
            enable_rollback: true,
            resource_hints: IndexMap::new(),
            data: serde_json::Map::new(),
        }
    }

    /// Set the time sensitivity
    #[must_use]
    pub fn with_time_sensitivity(mut self, sensitivity: TimeSensitivity) -> Self {
        self.time_sensitivity = sensitivity;
        self
    }

    /// Enable or disable rollback for this run
    #[must_use]
    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.enable_rollback = enabled;
        self
    }

    /// Attach a resource estimate for one hook
    #[must_use]
    pub fn with_resource_hint(mut self, hook: impl Into<String>, hint: ResourceHint) -> Self {
        self.resource_hints.insert(hook.into(), hint);
        self
    }

    /// Attach a payload value
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Resource estimate supplied for a hook, if any
    #[must_use]
    pub fn resource_hint(&self, hook: &str) -> Option<ResourceHint> {
        self.resource_hints.get(hook).copied()
    }
}

/// What a running hook body can see and do
pub struct HookContext {
    hook_name: String,
    phase: ExecutionPhase,
    execution: Arc<ExecutionContext>,
    cancel: CancelToken,
    compensations: Arc<Mutex<Vec<Compensation>>>,
}

impl HookContext {
    /// Create a context for one hook invocation
    pub fn new(
        hook_name: impl Into<String>,
        phase: ExecutionPhase,
        execution: Arc<ExecutionContext>,
    ) -> Self {
        Self {
            hook_name: hook_name.into(),
            phase,
            execution,
            cancel: CancelToken::new(),
            compensations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Name of the running hook
    #[must_use]
    pub fn hook_name(&self) -> &str {
        &self.hook_name
    }

    /// Phase the hook runs in
    #[must_use]
    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Trigger that fired
    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.execution.trigger
    }

    /// The invocation context
    #[must_use]
    pub fn execution(&self) -> &ExecutionContext {
        &self.execution
    }

    /// Cancellation token for this invocation
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether the engine gave up on this invocation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Register a compensating action for work done so far
    ///
    /// Actions registered before a failure are still used when the failed hook
    /// itself is rolled back.
    pub fn on_rollback<F>(&self, action: F)
    where
        F: FnOnce() -> std::result::Result<(), String> + Send + 'static,
    {
        self.compensations.lock().push(Box::new(action));
    }

    /// Number of registered compensating actions
    #[must_use]
    pub fn compensation_count(&self) -> usize {
        self.compensations.lock().len()
    }

    /// Drain the registered compensating actions in registration order
    pub fn take_compensations(&self) -> Vec<Compensation> {
        std::mem::take(&mut *self.compensations.lock())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_context_defaults_from_json() {
        let ctx: ExecutionContext = serde_json::from_str(r#"{"trigger": "deploy"}"#).unwrap();
        assert_eq!(ctx.trigger, "deploy");
        assert!(ctx.enable_rollback);
        assert_eq!(ctx.time_sensitivity, TimeSensitivity::Normal);
        assert!(ctx.resource_hints.is_empty());
    }

    #[test]
    fn test_context_builder() {
        let ctx = ExecutionContext::new("save")
            .with_time_sensitivity(TimeSensitivity::High)
            .with_rollback(false)
            .with_resource_hint("indexer", ResourceHint::new(40.0, 256.0))
            .with_data("file", serde_json::json!("main.rs"));

        assert_eq!(ctx.time_sensitivity, TimeSensitivity::High);
        assert!(!ctx.enable_rollback);
        assert_eq!(ctx.resource_hint("indexer"), Some(ResourceHint::new(40.0, 256.0)));
        assert_eq!(ctx.resource_hint("other"), None);
        assert_eq!(ctx.data["file"], "main.rs");
    }

    #[test]
    fn test_compensations_drain_in_order() {
        let ctx = HookContext::new(
            "writer",
            ExecutionPhase::CoreProcessing,
            Arc::new(ExecutionContext::new("save")),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            ctx.on_rollback(move || {
                log.lock().push(i);
                Ok(())
            });
        }
        assert_eq!(ctx.compensation_count(), 3);

        for action in ctx.take_compensations() {
            action().unwrap();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(ctx.compensation_count(), 0);
    }
}
