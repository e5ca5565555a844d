//! Scoped, best-effort compensation after failures
//!
//! Every finished hook leaves a record in the ledger with the compensating
//! actions it registered. When a failure triggers a rollback, the records in
//! scope are taken out of the ledger and run newest first under one time
//! budget. Compensations that fail, panic or run out of time are reported as
//! inconsistent and never retried.

use crate::buffer::BoundedBuffer;
use crate::graph::{self, DependencyMap};
use crate::plan::ExecutionPlan;
use crossbeam_channel::RecvTimeoutError;
use hookflow_core::{Compensation, ExecutionPhase, HookContext, RollbackScope};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Compensations of one finished hook
pub struct RollbackRecord {
    /// Hook that registered the actions
    pub hook: String,
    /// Phase the hook ran in
    pub phase: ExecutionPhase,
    /// Completion order within the plan
    pub sequence: usize,
    /// Whether the hook itself failed
    pub failed: bool,
    actions: Vec<Compensation>,
    /// Context of a body still running when the hook was given up on
    unfinished: Option<Arc<HookContext>>,
}

impl RollbackRecord {
    /// Registered actions, including any a still running body added since
    fn collect_actions(&mut self) -> Vec<Compensation> {
        let mut actions = std::mem::take(&mut self.actions);
        if let Some(context) = &self.unfinished {
            actions.extend(context.take_compensations());
        }
        actions
    }
}

impl std::fmt::Debug for RollbackRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackRecord")
            .field("hook", &self.hook)
            .field("phase", &self.phase)
            .field("sequence", &self.sequence)
            .field("failed", &self.failed)
            .field("actions", &self.actions.len())
            .field("unfinished", &self.unfinished.is_some())
            .finish()
    }
}

/// Records of every hook finished during one plan
#[derive(Debug, Default)]
pub struct RollbackLedger {
    records: Vec<RollbackRecord>,
    next_sequence: usize,
}

impl RollbackLedger {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished hook
    pub fn push(
        &mut self,
        hook: impl Into<String>,
        phase: ExecutionPhase,
        failed: bool,
        actions: Vec<Compensation>,
    ) {
        self.insert(hook.into(), phase, failed, actions, None);
    }

    /// Record a hook given up on while its body still runs
    ///
    /// Actions the body registers after this point are collected when the
    /// record is rolled back.
    pub fn push_unfinished(
        &mut self,
        hook: impl Into<String>,
        phase: ExecutionPhase,
        actions: Vec<Compensation>,
        context: Arc<HookContext>,
    ) {
        self.insert(hook.into(), phase, true, actions, Some(context));
    }

    fn insert(
        &mut self,
        hook: String,
        phase: ExecutionPhase,
        failed: bool,
        actions: Vec<Compensation>,
        unfinished: Option<Arc<HookContext>>,
    ) {
        self.records.push(RollbackRecord {
            hook,
            phase,
            sequence: self.next_sequence,
            failed,
            actions,
            unfinished,
        });
        self.next_sequence += 1;
    }

    /// Number of records not yet compensated
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether every record was compensated or none exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a hook has an outstanding record
    #[must_use]
    pub fn contains(&self, hook: &str) -> bool {
        self.records.iter().any(|r| r.hook == hook)
    }

    fn take(&mut self, hooks: &HashSet<String>) -> Vec<RollbackRecord> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| hooks.contains(&r.hook));
        self.records = kept;
        taken
    }
}

/// Hooks selected for compensation
///
/// `failed` hooks are always part of the selection.
#[must_use]
pub fn select(
    scope: RollbackScope,
    failed: &[String],
    phase: ExecutionPhase,
    ledger: &RollbackLedger,
    plan: &ExecutionPlan,
) -> HashSet<String> {
    let mut selected: HashSet<String> = failed.iter().cloned().collect();

    match scope {
        RollbackScope::SingleHook => {}
        RollbackScope::DependencyChain => {
            let deps: DependencyMap<'_> = plan
                .hooks()
                .map(|h| {
                    (
                        h.name(),
                        h.plan_dependencies.iter().map(String::as_str).collect(),
                    )
                })
                .collect();
            let dependents = graph::reverse(&deps);
            for hook in failed {
                selected.extend(
                    graph::reachable(hook, &dependents)
                        .into_iter()
                        .filter(|name| ledger.contains(name))
                        .map(ToString::to_string),
                );
            }
        }
        RollbackScope::Phase => {
            selected.extend(
                ledger
                    .records
                    .iter()
                    .filter(|r| r.phase == phase)
                    .map(|r| r.hook.clone()),
            );
        }
        RollbackScope::FullPlan => {
            selected.extend(ledger.records.iter().map(|r| r.hook.clone()));
        }
    }
    selected
}

/// A hook whose compensation did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InconsistentRecord {
    /// Hook name
    pub hook: String,
    /// What went wrong
    pub reason: String,
}

/// Result of one rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    /// Scope that was applied
    pub scope: RollbackScope,
    /// Hooks whose failure triggered the rollback
    pub failed_hooks: Vec<String>,
    /// Hooks fully compensated, newest first
    pub compensated_hooks: Vec<String>,
    /// Hooks in scope that registered no compensating action
    #[serde(default)]
    pub nothing_to_undo: Vec<String>,
    /// Compensating actions that succeeded
    pub compensated: usize,
    /// Hooks left in an unknown state
    pub inconsistent: Vec<InconsistentRecord>,
    /// Whether the time budget ran out
    pub timed_out: bool,
    /// Wall-clock time spent
    pub duration_ms: f64,
}

impl RollbackOutcome {
    /// Whether every selected hook was compensated
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.inconsistent.is_empty()
    }
}

enum ActionResult {
    Done,
    Failed(String),
    TimedOut,
}

/// Runs rollbacks and keeps their outcomes
#[derive(Debug)]
pub struct RollbackManager {
    timeout: Duration,
    history: Mutex<BoundedBuffer<RollbackOutcome>>,
}

impl RollbackManager {
    /// Create a manager with a total time budget per rollback
    #[must_use]
    pub fn new(timeout: Duration, max_history: usize) -> Self {
        Self {
            timeout,
            history: Mutex::new(BoundedBuffer::new(max_history)),
        }
    }

    /// Compensate the selected hooks, newest first
    #[tracing::instrument(skip(self, ledger, selection), fields(hooks = selection.len()))]
    pub fn rollback(
        &self,
        ledger: &mut RollbackLedger,
        selection: &HashSet<String>,
        scope: RollbackScope,
        failed_hooks: &[String],
    ) -> RollbackOutcome {
        let start = Instant::now();
        let deadline = start + self.timeout;

        let mut records = ledger.take(selection);
        records.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        let mut outcome = RollbackOutcome {
            scope,
            failed_hooks: failed_hooks.to_vec(),
            compensated_hooks: Vec::new(),
            nothing_to_undo: Vec::new(),
            compensated: 0,
            inconsistent: Vec::new(),
            timed_out: false,
            duration_ms: 0.0,
        };

        for mut record in records {
            let actions = record.collect_actions();
            if actions.is_empty() {
                outcome.nothing_to_undo.push(record.hook);
                continue;
            }
            if outcome.timed_out {
                outcome.inconsistent.push(InconsistentRecord {
                    hook: record.hook,
                    reason: "rollback timed out".to_string(),
                });
                continue;
            }

            let mut failure = None;
            // Undo in reverse registration order
            for action in actions.into_iter().rev() {
                if outcome.timed_out {
                    failure.get_or_insert_with(|| "rollback timed out".to_string());
                    continue;
                }
                match run_action(action, deadline) {
                    ActionResult::Done => outcome.compensated += 1,
                    ActionResult::Failed(reason) => {
                        tracing::warn!(hook = %record.hook, %reason, "Compensation failed");
                        failure.get_or_insert(reason);
                    }
                    ActionResult::TimedOut => {
                        tracing::warn!(hook = %record.hook, "Rollback time budget exhausted");
                        outcome.timed_out = true;
                        failure.get_or_insert_with(|| "rollback timed out".to_string());
                    }
                }
            }

            match failure {
                Some(reason) => outcome.inconsistent.push(InconsistentRecord {
                    hook: record.hook,
                    reason,
                }),
                None => outcome.compensated_hooks.push(record.hook),
            }
        }

        outcome.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            scope = %scope,
            compensated = outcome.compensated,
            inconsistent = outcome.inconsistent.len(),
            "Rollback finished"
        );

        self.history.lock().push(outcome.clone());
        outcome
    }

    /// Number of outcomes kept
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// The newest outcomes, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<RollbackOutcome> {
        self.history.lock().latest(n).cloned().collect()
    }
}

/// Run one compensation on its own thread so the deadline can be enforced
///
/// An action that overruns keeps running detached.
fn run_action(action: Compensation, deadline: Instant) -> ActionResult {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = std::thread::Builder::new()
        .name("hookflow-rollback".to_string())
        .spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(action));
            let _ = tx.send(result);
        });
    if let Err(e) = spawned {
        return ActionResult::Failed(format!("failed to start compensation: {e}"));
    }

    match rx.recv_deadline(deadline) {
        Ok(Ok(Ok(()))) => ActionResult::Done,
        Ok(Ok(Err(reason))) => ActionResult::Failed(reason),
        Ok(Err(_)) => ActionResult::Failed("compensation panicked".to_string()),
        Err(RecvTimeoutError::Timeout) => ActionResult::TimedOut,
        Err(RecvTimeoutError::Disconnected) => {
            ActionResult::Failed("compensation thread exited unexpectedly".to_string())
        }
    }
}
