//! Batch execution on a fixed worker pool
//!
//! Batches run strictly one after another; the hooks of a batch run
//! concurrently on a rayon pool. The coordinating thread waits on a channel of
//! worker events and enforces per-hook deadlines. A hook that overruns is
//! cancelled and reported as timed out; if its body ignores the cancellation
//! it keeps its worker busy until it returns.

use crate::history::PerformanceHistory;
use crate::plan::{Batch, ExecutionPlan, ScoredHook, SkippedHook};
use crate::report::{ExecutionResult, PlanReport};
use crate::rollback::{self, RollbackLedger, RollbackManager};
use chrono::Utc;
use crossbeam_channel::{RecvTimeoutError, Sender};
use hookflow_config::PrioritySystemConfig;
use hookflow_core::{
    Compensation, Error, ExecutionContext, ExecutionPhase, HookContext, HookError, HookFailure,
    Result,
};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reason recorded for hooks whose dependency did not succeed
pub const SKIP_DEPENDENCY_FAILED: &str = "dependency failed";

/// Reason recorded for hooks after a required phase failed
pub const SKIP_HALTED: &str = "halted";

enum WorkerEvent {
    Started {
        index: usize,
        at: Instant,
    },
    Finished {
        index: usize,
        result: std::result::Result<std::result::Result<(), HookFailure>, String>,
        elapsed: Duration,
    },
}

/// Outcome of one hook within a batch
struct HookRun {
    name: String,
    success: bool,
    duration_ms: f64,
    error: Option<HookError>,
    compensations: Vec<Compensation>,
    /// Context of a body that was still running when the hook timed out
    unfinished: Option<Arc<HookContext>>,
}

struct Slot<'a> {
    hook: &'a ScoredHook,
    context: Arc<HookContext>,
    timeout: Duration,
    started: Option<Instant>,
    run: Option<HookRun>,
}

impl Slot<'_> {
    fn deadline(&self, batch_ceiling: Instant) -> Instant {
        self.started.map_or(batch_ceiling, |at| at + self.timeout)
    }

    fn resolve(&mut self, success: bool, duration: Duration, error: Option<HookError>) {
        self.run = Some(HookRun {
            name: self.hook.name().to_string(),
            success,
            duration_ms: duration.as_secs_f64() * 1000.0,
            error,
            compensations: self.context.take_compensations(),
            unfinished: None,
        });
    }

    /// Give up on a hook whose body may still be running
    fn abandon(&mut self, duration: Duration, error: HookError) {
        self.context.cancel_token().cancel();
        self.resolve(false, duration, Some(error));
        if let Some(run) = &mut self.run {
            run.unfinished = Some(Arc::clone(&self.context));
        }
    }

    /// Pick up actions registered since the slot was resolved
    fn collect_late_compensations(&mut self) {
        if let Some(run) = &mut self.run {
            run.compensations.extend(self.context.take_compensations());
            run.unfinished = None;
        }
    }
}

/// Runs execution plans
pub struct ExecutionEngine {
    config: Arc<PrioritySystemConfig>,
    pool: rayon::ThreadPool,
    history: Arc<PerformanceHistory>,
    rollback: Arc<RollbackManager>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("workers", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine with `max_workers` threads
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be started.
    pub fn new(
        config: Arc<PrioritySystemConfig>,
        history: Arc<PerformanceHistory>,
        rollback: Arc<RollbackManager>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers.max(1))
            .thread_name(|i| format!("hookflow-worker-{i}"))
            .build()
            .map_err(|e| Error::Runtime(format!("Failed to start worker pool: {e}")))?;

        Ok(Self {
            config,
            pool,
            history,
            rollback,
        })
    }

    /// Execute a plan batch by batch
    #[tracing::instrument(skip_all, fields(trigger = %plan.trigger, hooks = plan.hook_count()))]
    pub fn execute(&self, plan: &ExecutionPlan, context: &ExecutionContext) -> PlanReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let context = Arc::new(context.clone());
        let rollback_enabled = self.config.enable_rollback && context.enable_rollback;
        let scope = self.config.default_rollback_scope;

        let mut results: IndexMap<String, ExecutionResult> = IndexMap::new();
        let mut skipped = plan.skipped.clone();
        let mut unsuccessful: HashSet<String> = HashSet::new();
        let mut ledger = RollbackLedger::new();
        let mut rollbacks = Vec::new();
        let mut overall_success = true;
        let mut halted = false;

        for batch in &plan.batches {
            if halted {
                for hook in &batch.hooks {
                    skipped.push(SkippedHook::new(hook.name(), SKIP_HALTED));
                    unsuccessful.insert(hook.name().to_string());
                }
                continue;
            }

            let (runnable, blocked): (Vec<&ScoredHook>, Vec<&ScoredHook>) =
                batch.hooks.iter().partition(|hook| {
                    !hook
                        .plan_dependencies
                        .iter()
                        .any(|dep| unsuccessful.contains(dep))
                });
            for hook in blocked {
                tracing::debug!(hook = %hook.name(), "Skipping hook: dependency failed");
                skipped.push(SkippedHook::new(hook.name(), SKIP_DEPENDENCY_FAILED));
                unsuccessful.insert(hook.name().to_string());
            }

            let mut failed = Vec::new();
            for run in self.run_batch(batch, &runnable, &context) {
                if self.config.performance_monitoring_enabled {
                    self.history.record(&run.name, run.duration_ms, run.success);
                }
                if !run.success {
                    failed.push(run.name.clone());
                    unsuccessful.insert(run.name.clone());
                }
                match run.unfinished {
                    Some(context) => {
                        ledger.push_unfinished(run.name.clone(), batch.phase, run.compensations, context);
                    }
                    None => ledger.push(run.name.clone(), batch.phase, !run.success, run.compensations),
                }
                results.insert(
                    run.name.clone(),
                    ExecutionResult {
                        hook: run.name,
                        phase: batch.phase,
                        success: run.success,
                        duration_ms: run.duration_ms,
                        error: run.error,
                        rolled_back: false,
                    },
                );
            }

            if failed.is_empty() {
                continue;
            }

            let required = self.config.phase(batch.phase).required;
            if required {
                tracing::warn!(
                    phase = %batch.phase,
                    failed = ?failed,
                    "Required phase failed, halting execution"
                );
                overall_success = false;
                halted = true;
            }

            if rollback_enabled && (required || scope.is_hook_local()) {
                let selection = rollback::select(scope, &failed, batch.phase, &ledger, plan);
                let outcome = self.rollback.rollback(&mut ledger, &selection, scope, &failed);
                for hook in &outcome.compensated_hooks {
                    if let Some(result) = results.get_mut(hook) {
                        result.rolled_back = true;
                    }
                }
                rollbacks.push(outcome);
            }
        }

        let report = PlanReport {
            trigger: plan.trigger.clone(),
            started_at,
            completed_at: Utc::now(),
            overall_success,
            total_execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            results,
            skipped,
            rollback_performed: !rollbacks.is_empty(),
            rollbacks,
        };

        tracing::info!(
            success = report.overall_success,
            executed = report.results.len(),
            skipped = report.skipped.len(),
            elapsed_ms = report.total_execution_time_ms,
            "Plan finished"
        );
        report
    }

    /// Run the runnable hooks of a batch concurrently
    ///
    /// Results come back in batch order.
    fn run_batch(
        &self,
        batch: &Batch,
        runnable: &[&ScoredHook],
        context: &Arc<ExecutionContext>,
    ) -> Vec<HookRun> {
        if runnable.is_empty() {
            return Vec::new();
        }

        let phase_timeout = self.config.phase(batch.phase).timeout_ms;
        let max_execution = Duration::from_millis(self.config.max_execution_time_ms);
        let batch_ceiling = Instant::now() + max_execution;

        tracing::debug!(
            batch = batch.index,
            phase = %batch.phase,
            hooks = runnable.len(),
            "Running batch"
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut slots: Vec<Slot<'_>> = runnable
            .iter()
            .map(|&hook| {
                let timeout = Duration::from_millis(
                    hook.descriptor.timeout_ms.unwrap_or(phase_timeout),
                )
                .min(max_execution);
                Slot {
                    hook,
                    context: Arc::new(HookContext::new(
                        hook.name(),
                        batch.phase,
                        Arc::clone(context),
                    )),
                    timeout,
                    started: None,
                    run: None,
                }
            })
            .collect();

        for (index, slot) in slots.iter().enumerate() {
            self.spawn_hook(index, slot, batch.phase, tx.clone());
        }
        drop(tx);

        let mut pending = slots.len();
        while pending > 0 {
            let next_deadline = slots
                .iter()
                .filter(|s| s.run.is_none())
                .map(|s| s.deadline(batch_ceiling))
                .min()
                .unwrap_or(batch_ceiling);

            match rx.recv_deadline(next_deadline) {
                Ok(WorkerEvent::Started { index, at }) => {
                    if let Some(slot) = slots.get_mut(index)
                        && slot.run.is_none()
                    {
                        slot.started = Some(at);
                    }
                }
                Ok(WorkerEvent::Finished {
                    index,
                    result,
                    elapsed,
                }) => {
                    let Some(slot) = slots.get_mut(index) else {
                        continue;
                    };
                    if slot.run.is_some() {
                        // Timed out earlier; its body has returned now
                        slot.collect_late_compensations();
                    } else {
                        let error = match result {
                            Ok(Ok(())) => None,
                            Ok(Err(failure)) => Some(HookError::execution(failure.message())),
                            Err(panic) => Some(HookError::panicked(panic)),
                        };
                        slot.resolve(error.is_none(), elapsed, error);
                        pending -= 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    for slot in slots.iter_mut().filter(|s| s.run.is_none()) {
                        if slot.deadline(batch_ceiling) > now {
                            continue;
                        }
                        let (elapsed, error) = match slot.started {
                            Some(at) => (
                                now.duration_since(at),
                                HookError::timeout(format!(
                                    "timed out after {}ms",
                                    slot.timeout.as_millis()
                                )),
                            ),
                            None => (
                                Duration::ZERO,
                                HookError::timeout(format!(
                                    "did not start within {}ms",
                                    max_execution.as_millis()
                                )),
                            ),
                        };
                        tracing::warn!(hook = %slot.hook.name(), "Hook timed out");
                        slot.abandon(elapsed, error);
                        pending -= 1;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for slot in slots.iter_mut().filter(|s| s.run.is_none()) {
                        slot.resolve(
                            false,
                            Duration::ZERO,
                            Some(HookError::execution("worker exited without a result")),
                        );
                    }
                    pending = 0;
                }
            }
        }

        slots
            .into_iter()
            .filter_map(|slot| slot.run)
            .inspect(|run| self.trace_run(run))
            .collect()
    }

    fn spawn_hook(&self, index: usize, slot: &Slot<'_>, phase: ExecutionPhase, tx: Sender<WorkerEvent>) {
        let body = Arc::clone(&slot.hook.body);
        let context = Arc::clone(&slot.context);
        let name = slot.hook.name().to_string();

        self.pool.spawn(move || {
            // Gave up on this hook while it was queued
            if context.is_cancelled() {
                return;
            }
            let span = tracing::info_span!("hook_execution", hook_name = %name, phase = %phase);
            let _guard = span.enter();

            let at = Instant::now();
            let _ = tx.send(WorkerEvent::Started { index, at });
            tracing::debug!("Starting hook execution");

            let result = catch_unwind(AssertUnwindSafe(|| body.execute(&context)))
                .map_err(|payload| panic_message(payload.as_ref()));
            let _ = tx.send(WorkerEvent::Finished {
                index,
                result,
                elapsed: at.elapsed(),
            });
        });
    }

    fn trace_run(&self, run: &HookRun) {
        if self.config.enable_performance_tracing {
            tracing::info!(
                hook = %run.name,
                duration_ms = run.duration_ms,
                success = run.success,
                "Hook timing"
            );
        }
        match &run.error {
            None => tracing::debug!(hook = %run.name, elapsed_ms = run.duration_ms, "Hook completed successfully"),
            Some(error) => tracing::error!(hook = %run.name, elapsed_ms = run.duration_ms, %error, "Hook failed"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "hook panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::hooks::HookDescriptor;
    use crate::plan::ConflictResolution;
    use hookflow_core::{ConflictStrategy, HookErrorKind, PriorityLevel};

    fn engine(config: PrioritySystemConfig) -> ExecutionEngine {
        let config = Arc::new(config);
        ExecutionEngine::new(
            Arc::clone(&config),
            Arc::new(PerformanceHistory::new(100, Duration::from_secs(300), true)),
            Arc::new(RollbackManager::new(Duration::from_secs(5), 10)),
        )
        .unwrap()
    }

    fn scored<H: hookflow_core::Hook + 'static>(name: &str, timeout_ms: Option<u64>, body: H) -> ScoredHook {
        let mut descriptor = HookDescriptor::new(name, PriorityLevel::Normal).with_trigger("t");
        descriptor.timeout_ms = timeout_ms;
        ScoredHook {
            descriptor: Arc::new(descriptor),
            body: Arc::new(body),
            priority_score: 0.5,
            assigned_phase: ExecutionPhase::CoreProcessing,
            resource_hint: None,
            plan_dependencies: Vec::new(),
        }
    }

    fn plan(batches: Vec<Vec<ScoredHook>>) -> ExecutionPlan {
        ExecutionPlan {
            trigger: "t".to_string(),
            resolution: ConflictResolution {
                strategy: ConflictStrategy::PriorityBased,
                proceed: Vec::new(),
                skipped: Vec::new(),
                reason: String::new(),
            },
            batches: batches
                .into_iter()
                .enumerate()
                .map(|(index, hooks)| Batch {
                    index,
                    phase: ExecutionPhase::CoreProcessing,
                    hooks,
                })
                .collect(),
            skipped: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn ok(_: &HookContext) -> std::result::Result<(), HookFailure> {
        Ok(())
    }

    #[test]
    fn test_panic_is_captured() {
        let boom = |_: &HookContext| -> std::result::Result<(), HookFailure> { panic!("kaboom") };
        let report = engine(PrioritySystemConfig::default()).execute(
            &plan(vec![vec![scored("boom", None, boom), scored("fine", None, ok)]]),
            &ExecutionContext::new("t"),
        );

        let boom = &report.results["boom"];
        assert!(!boom.success);
        assert_eq!(boom.error.as_ref().unwrap().kind, HookErrorKind::Panicked);
        assert_eq!(boom.error.as_ref().unwrap().message, "kaboom");
        assert!(report.results["fine"].success);
        // core_processing is not required
        assert!(report.overall_success);
    }

    #[test]
    fn test_hook_ceiling_caps_timeout() {
        let slow = |ctx: &HookContext| -> std::result::Result<(), HookFailure> {
            for _ in 0..100 {
                if ctx.is_cancelled() {
                    return Err("cancelled".into());
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        };
        let config = PrioritySystemConfig {
            max_execution_time_ms: 50,
            ..PrioritySystemConfig::default()
        };
        let report = engine(config).execute(
            &plan(vec![vec![scored("slow", Some(10_000), slow)]]),
            &ExecutionContext::new("t"),
        );
        let result = &report.results["slow"];
        assert_eq!(result.error.as_ref().unwrap().kind, HookErrorKind::Timeout);
        assert!(result.duration_ms < 1000.0);
    }

    #[test]
    fn test_dependency_failure_skips_dependents() {
        let fail = |_: &HookContext| -> std::result::Result<(), HookFailure> { Err("nope".into()) };
        let mut dependent = scored("dependent", None, ok);
        dependent.plan_dependencies = vec!["base".to_string()];

        let report = engine(PrioritySystemConfig::default()).execute(
            &plan(vec![vec![scored("base", None, fail)], vec![dependent, scored("other", None, ok)]]),
            &ExecutionContext::new("t"),
        );

        assert!(report.was_skipped("dependent"));
        assert!(report.results["other"].success);
        assert_eq!(report.failed_hooks(), vec!["base"]);
    }

    #[test]
    fn test_history_records_unless_disabled() {
        let history = Arc::new(PerformanceHistory::new(100, Duration::ZERO, true));
        let make = |monitoring: bool| {
            ExecutionEngine::new(
                Arc::new(PrioritySystemConfig {
                    performance_monitoring_enabled: monitoring,
                    ..PrioritySystemConfig::default()
                }),
                Arc::clone(&history),
                Arc::new(RollbackManager::new(Duration::from_secs(1), 10)),
            )
            .unwrap()
        };

        make(true).execute(&plan(vec![vec![scored("a", None, ok)]]), &ExecutionContext::new("t"));
        make(false).execute(&plan(vec![vec![scored("a", None, ok)]]), &ExecutionContext::new("t"));
        assert_eq!(history.total_samples(), 1);
    }

    #[test]
    fn test_empty_plan_succeeds() {
        let report = engine(PrioritySystemConfig::default())
            .execute(&plan(Vec::new()), &ExecutionContext::new("t"));
        assert!(report.overall_success);
        assert!(report.results.is_empty());
        assert!(!report.rollback_performed);
    }

    #[test]
    fn test_failure_without_compensations_is_not_rolled_back() {
        let fail = |_: &HookContext| -> std::result::Result<(), HookFailure> { Err("nope".into()) };
        let report = engine(PrioritySystemConfig::default()).execute(
            &plan(vec![vec![scored("bare", None, fail)]]),
            &ExecutionContext::new("t"),
        );

        assert!(report.rollback_performed);
        assert!(!report.results["bare"].rolled_back);
        assert!(report.rollbacks[0].compensated_hooks.is_empty());
        assert_eq!(report.rollbacks[0].nothing_to_undo, vec!["bare"]);
    }

    /// Ignores cancellation, registers an undo entry once it wakes up
    fn oblivious(
        log: &Arc<parking_lot::Mutex<Vec<String>>>,
        sleep_ms: u64,
    ) -> impl Fn(&HookContext) -> std::result::Result<(), HookFailure> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |ctx: &HookContext| {
            std::thread::sleep(Duration::from_millis(sleep_ms));
            let log = Arc::clone(&log);
            let entry = format!("undo-{}", ctx.hook_name());
            ctx.on_rollback(move || {
                log.lock().push(entry);
                Ok(())
            });
            Ok(())
        }
    }

    #[test]
    fn test_late_compensation_collected_when_body_returns_within_batch() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let fail_later = |_: &HookContext| -> std::result::Result<(), HookFailure> {
            std::thread::sleep(Duration::from_millis(250));
            Err("late failure".into())
        };
        let report = engine(PrioritySystemConfig::default()).execute(
            &plan(vec![vec![
                scored("stuck", Some(30), oblivious(&log, 80)),
                scored("fails", None, fail_later),
            ]]),
            &ExecutionContext::new("t"),
        );

        let stuck = &report.results["stuck"];
        assert_eq!(stuck.error.as_ref().unwrap().kind, HookErrorKind::Timeout);
        assert!(stuck.rolled_back);
        assert_eq!(*log.lock(), vec!["undo-stuck"]);
    }

    #[test]
    fn test_late_compensation_collected_when_rollback_starts() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let fail_later = |_: &HookContext| -> std::result::Result<(), HookFailure> {
            std::thread::sleep(Duration::from_millis(250));
            Err("late failure".into())
        };
        let mut config = PrioritySystemConfig {
            default_rollback_scope: hookflow_core::RollbackScope::FullPlan,
            ..PrioritySystemConfig::default()
        };
        config.phase_configuration.insert(
            ExecutionPhase::Finalization,
            hookflow_config::PhaseSettings {
                timeout_ms: 5000,
                max_parallelism: 4,
                required: true,
            },
        );
        let mut plan = plan(vec![
            vec![scored("stuck", Some(30), oblivious(&log, 80))],
            vec![scored("fails", None, fail_later)],
        ]);
        plan.batches[1].phase = ExecutionPhase::Finalization;
        plan.batches[1].hooks[0].assigned_phase = ExecutionPhase::Finalization;

        let report = engine(config).execute(&plan, &ExecutionContext::new("t"));

        assert!(!report.overall_success);
        assert_eq!(report.rollbacks.len(), 1);
        assert!(report.results["stuck"].rolled_back);
        assert_eq!(report.rollbacks[0].nothing_to_undo, vec!["fails"]);
        assert_eq!(*log.lock(), vec!["undo-stuck"]);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "hook panicked");
    }
}
