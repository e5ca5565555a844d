//! Execution reports

use crate::plan::SkippedHook;
use crate::rollback::RollbackOutcome;
use chrono::{DateTime, Utc};
use hookflow_core::{ExecutionPhase, HookError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Outcome of one executed hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Hook name
    pub hook: String,
    /// Phase the hook ran in
    pub phase: ExecutionPhase,
    /// Whether the hook succeeded
    pub success: bool,
    /// Wall-clock time from start to completion or timeout
    pub duration_ms: f64,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HookError>,
    /// Whether a rollback compensated this hook
    #[serde(default)]
    pub rolled_back: bool,
}

/// Everything that happened while executing a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    /// Trigger the plan ran for
    pub trigger: String,
    /// Start of execution
    pub started_at: DateTime<Utc>,
    /// End of execution
    pub completed_at: DateTime<Utc>,
    /// No hook of a required phase failed
    pub overall_success: bool,
    /// Wall-clock time of the whole plan
    pub total_execution_time_ms: f64,
    /// Executed hooks in plan order
    pub results: IndexMap<String, ExecutionResult>,
    /// Hooks that did not run
    pub skipped: Vec<SkippedHook>,
    /// Whether any rollback ran
    pub rollback_performed: bool,
    /// Every rollback that ran
    pub rollbacks: Vec<RollbackOutcome>,
}

impl PlanReport {
    /// Names of failed hooks
    #[must_use]
    pub fn failed_hooks(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.hook.as_str())
            .collect()
    }

    /// Number of successful hooks
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.success).count()
    }

    /// Whether a hook was skipped
    #[must_use]
    pub fn was_skipped(&self, hook: &str) -> bool {
        self.skipped.iter().any(|s| s.hook == hook)
    }
}
