//! The priority system facade
//!
//! [`PrioritySystem`] owns every component of the engine: the hook registry,
//! performance history, resource monitor, calculator, scheduler, execution
//! engine and rollback manager. It is constructed explicitly through
//! [`PrioritySystemBuilder`] and stops its resource monitor when dropped.

use crate::conflict::{ConflictResolver, ResolutionInputs};
use crate::executor::ExecutionEngine;
use crate::history::{HookStats, PerformanceHistory};
use crate::hooks::HookRegistry;
use crate::plan::{ExecutionPlan, ScoredHook, SkippedHook};
use crate::priority::{PriorityCalculator, ScoringInputs};
use crate::report::PlanReport;
use crate::resources::{
    ResourceMonitor, ResourceProbe, ResourceSnapshot, ResourceTrend, ResourceTrends, SysinfoProbe,
};
use crate::rollback::RollbackManager;
use crate::scheduler::PhaseScheduler;
use chrono::{DateTime, Utc};
use hookflow_config::PrioritySystemConfig;
use hookflow_core::{ConflictStrategy, Error, ExecutionContext, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Skip reason for hooks that lost conflict resolution
pub const SKIP_CONFLICT: &str = "lost conflict resolution";

/// Average duration above which a hook counts as slow
pub const SLOW_HOOK_THRESHOLD_MS: f64 = 5000.0;

/// Success rate below which a hook counts as unreliable
pub const UNRELIABLE_SUCCESS_RATE: f64 = 0.8;

/// Adjustment applied to a slow hook per optimization pass
pub const SLOW_HOOK_ADJUSTMENT: f64 = -0.1;

/// Lowest adjustment repeated optimization passes can reach
pub const MIN_ADJUSTMENT: f64 = -0.5;

/// Result of an optimization pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// When the pass ran
    pub timestamp: DateTime<Utc>,
    /// Human readable summary of what changed
    pub actions_taken: Vec<String>,
    /// Adjustments set in this pass
    pub priority_adjustments: BTreeMap<String, f64>,
    /// Hooks averaging above the slow threshold
    pub slow_hooks: Vec<String>,
    /// Hooks below the reliability threshold
    pub unreliable_hooks: Vec<String>,
    /// Statistics per hook
    pub performance: BTreeMap<String, HookStats>,
    /// Current usage, trends and advice
    pub resources: ResourceReport,
}

/// Resource section of an optimization report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    /// Latest snapshot
    pub current_usage: ResourceSnapshot,
    /// Trends over the sample history
    pub trends: ResourceTrends,
    /// Advice derived from usage and trends
    pub recommendations: Vec<String>,
}

/// Point-in-time view of the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// When the metrics were taken
    pub timestamp: DateTime<Utc>,
    /// Hooks in the registry
    pub registry_size: usize,
    /// Hooks with recorded samples
    pub tracked_hooks: usize,
    /// Stored performance samples
    pub performance_history_size: usize,
    /// Rollback outcomes kept
    pub rollback_history_size: usize,
    /// Resource monitor state
    pub resource_monitor: MonitorStatus,
    /// Default conflict strategy
    pub default_conflict_strategy: ConflictStrategy,
    /// Whether optimization may change priorities
    pub dynamic_adjustment_enabled: bool,
    /// Worker pool size
    pub max_workers: usize,
    /// Upper bound on any hook's run time
    pub max_execution_time_ms: u64,
    /// Adjustments currently in effect
    pub priority_adjustments: BTreeMap<String, f64>,
}

/// State of the resource monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Whether the sampling thread runs
    pub active: bool,
    /// Samples kept
    pub history_len: usize,
    /// Latest snapshot
    pub current: ResourceSnapshot,
    /// Trends over the kept samples
    pub trends: ResourceTrends,
}

/// Builder for [`PrioritySystem`]
#[derive(Debug, Default)]
pub struct PrioritySystemBuilder {
    config: Option<PrioritySystemConfig>,
    registry: Option<HookRegistry>,
    resources: Option<ResourceSnapshot>,
    seed: Option<u64>,
}

impl PrioritySystemBuilder {
    /// Use a configuration instead of the defaults
    #[must_use]
    pub fn config(mut self, config: PrioritySystemConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a hook registry instead of an empty one
    #[must_use]
    pub fn registry(mut self, registry: HookRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Report a fixed resource snapshot instead of sampling the host
    #[must_use]
    pub fn fixed_resources(mut self, snapshot: ResourceSnapshot) -> Self {
        self.resources = Some(snapshot);
        self
    }

    /// Seed the random source of `weighted_random`
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and start the system
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or when the worker pool or the
    /// resource monitor cannot be started.
    pub fn build(self) -> Result<PrioritySystem> {
        let config = self.config.unwrap_or_default();
        config.ensure_valid()?;
        let config = Arc::new(config);

        let history = Arc::new(PerformanceHistory::new(
            config.performance_history_size,
            Duration::from_secs(config.optimization_interval_seconds),
            config.enable_dynamic_priority_adjustment,
        ));

        let monitor = match self.resources {
            Some(snapshot) => ResourceMonitor::fixed(snapshot),
            None if config.enable_resource_monitoring => ResourceMonitor::start(
                SysinfoProbe::new(),
                Duration::from_secs(config.resource_monitoring_interval_seconds.max(1)),
            )?,
            None => ResourceMonitor::fixed(SysinfoProbe::new().sample()),
        };

        let rollback = Arc::new(RollbackManager::new(
            Duration::from_millis(config.rollback_timeout_ms),
            config.max_rollback_history,
        ));
        let engine = ExecutionEngine::new(
            Arc::clone(&config),
            Arc::clone(&history),
            Arc::clone(&rollback),
        )?;

        tracing::debug!(
            max_workers = config.max_workers,
            strategy = %config.default_conflict_strategy,
            monitoring = monitor.is_active(),
            "Priority system started"
        );

        let resolver = match self.seed {
            Some(seed) => ConflictResolver::with_seed(config.conflict_load_threshold_cpu, seed),
            None => ConflictResolver::new(config.conflict_load_threshold_cpu),
        };

        Ok(PrioritySystem {
            calculator: PriorityCalculator::new(config.priority_weights),
            resolver,
            scheduler: PhaseScheduler::new(Arc::clone(&config)),
            registry: RwLock::new(Arc::new(self.registry.unwrap_or_default())),
            config,
            history,
            monitor,
            engine,
            rollback,
        })
    }
}

/// Scores, schedules and executes hooks
#[derive(Debug)]
pub struct PrioritySystem {
    config: Arc<PrioritySystemConfig>,
    registry: RwLock<Arc<HookRegistry>>,
    history: Arc<PerformanceHistory>,
    monitor: ResourceMonitor,
    calculator: PriorityCalculator,
    resolver: ConflictResolver,
    scheduler: PhaseScheduler,
    engine: ExecutionEngine,
    rollback: Arc<RollbackManager>,
}

impl PrioritySystem {
    /// Start building a system
    pub fn builder() -> PrioritySystemBuilder {
        PrioritySystemBuilder::default()
    }

    /// Active configuration
    pub fn config(&self) -> &PrioritySystemConfig {
        &self.config
    }

    /// Current hook registry
    pub fn registry(&self) -> Arc<HookRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// Swap in a new registry; plans already built keep their hooks
    pub fn replace_registry(&self, registry: HookRegistry) {
        tracing::info!(hooks = registry.len(), "Hook registry replaced");
        *self.registry.write() = Arc::new(registry);
    }

    /// Performance history shared with the execution engine
    pub fn history(&self) -> &PerformanceHistory {
        &self.history
    }

    /// Score calculator, holding the dynamic adjustments
    pub fn calculator(&self) -> &PriorityCalculator {
        &self.calculator
    }

    /// Resource monitor
    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    /// Build an execution plan for a trigger
    ///
    /// An empty `hook_names` selects every hook bound to the trigger. Named
    /// hooks that are not bound to the trigger are skipped.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownHook`] for a name missing from the registry
    /// and with the scheduler's errors on cyclic or mis-phased dependencies.
    #[tracing::instrument(skip(self, hook_names, context), fields(requested = hook_names.len()))]
    pub fn calculate_execution_order(
        &self,
        trigger: &str,
        hook_names: &[String],
        context: &ExecutionContext,
    ) -> Result<ExecutionPlan> {
        let registry = self.registry();
        let names = if hook_names.is_empty() {
            registry.hooks_for_trigger(trigger)
        } else {
            hook_names.to_vec()
        };

        let stats = self.history.snapshot();
        let resources = self.monitor.current();
        let inputs = ScoringInputs {
            registry: &registry,
            context,
            stats: &stats,
            resources: &resources,
        };

        let mut seen = HashSet::with_capacity(names.len());
        let mut skipped = Vec::new();
        let mut candidates = Vec::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let hook = registry
                .get(name)
                .ok_or_else(|| Error::UnknownHook(name.clone()))?;
            let descriptor = &hook.descriptor;
            if !descriptor.is_bound_to(trigger) {
                skipped.push(SkippedHook::new(
                    name.as_str(),
                    format!("not bound to trigger '{trigger}'"),
                ));
                continue;
            }

            candidates.push(ScoredHook {
                descriptor: Arc::clone(descriptor),
                body: Arc::clone(&hook.body),
                priority_score: self.calculator.score(descriptor, &inputs),
                assigned_phase: descriptor.effective_phase(),
                resource_hint: PriorityCalculator::effective_hint(descriptor, context),
                plan_dependencies: Vec::new(),
            });
        }

        let strategy = self.config.strategy_for(trigger);
        let (ordered, resolution) = self.resolver.resolve(
            trigger,
            candidates,
            strategy,
            &ResolutionInputs {
                registry: &registry,
                stats: &stats,
                resources: &resources,
            },
        );
        skipped.extend(
            resolution
                .skipped
                .iter()
                .map(|name| SkippedHook::new(name.as_str(), SKIP_CONFLICT)),
        );

        let batches = self.scheduler.build_plan(ordered, strategy, &resources)?;
        let plan = ExecutionPlan {
            trigger: trigger.to_string(),
            resolution,
            batches,
            skipped,
            created_at: Utc::now(),
        };

        tracing::debug!(
            strategy = %strategy,
            batches = plan.batches.len(),
            hooks = plan.hook_count(),
            skipped = plan.skipped.len(),
            "Execution plan built"
        );
        Ok(plan)
    }

    /// Execute a plan built by [`calculate_execution_order`](Self::calculate_execution_order)
    pub fn execute_with_priority(&self, plan: &ExecutionPlan, context: &ExecutionContext) -> PlanReport {
        self.engine.execute(plan, context)
    }

    /// Plan and execute in one step
    ///
    /// # Errors
    ///
    /// Fails when the plan cannot be built; hook failures are reported in
    /// the returned [`PlanReport`].
    pub fn run(
        &self,
        trigger: &str,
        hook_names: &[String],
        context: &ExecutionContext,
    ) -> Result<PlanReport> {
        let plan = self.calculate_execution_order(trigger, hook_names, context)?;
        Ok(self.execute_with_priority(&plan, context))
    }

    /// Tune priorities from the performance history
    ///
    /// Slow hooks are lowered a step per pass when dynamic adjustment is
    /// enabled; hooks that are no longer slow get their adjustment back.
    #[tracing::instrument(skip(self))]
    pub fn optimize_system_performance(&self) -> OptimizationReport {
        let stats = self.history.live_stats();
        let dynamic = self.config.enable_dynamic_priority_adjustment;

        let mut slow_hooks: Vec<String> = stats
            .iter()
            .filter(|(_, s)| s.avg_duration_ms > SLOW_HOOK_THRESHOLD_MS)
            .map(|(name, _)| name.clone())
            .collect();
        slow_hooks.sort();

        let mut unreliable_hooks: Vec<String> = stats
            .iter()
            .filter(|(_, s)| s.success_rate < UNRELIABLE_SUCCESS_RATE)
            .map(|(name, _)| name.clone())
            .collect();
        unreliable_hooks.sort();

        let mut actions_taken = Vec::new();
        let mut priority_adjustments = BTreeMap::new();

        if dynamic {
            for hook in &slow_hooks {
                let value =
                    (self.calculator.adjustment(hook) + SLOW_HOOK_ADJUSTMENT).max(MIN_ADJUSTMENT);
                self.calculator.set_adjustment(hook, value);
                priority_adjustments.insert(hook.clone(), value);
            }
            if !slow_hooks.is_empty() {
                actions_taken.push(format!(
                    "Lowered priority for {} slow hooks",
                    slow_hooks.len()
                ));
            }

            let recovered: Vec<String> = self
                .calculator
                .adjustments()
                .into_keys()
                .filter(|hook| stats.get(hook).is_some_and(|s| s.avg_duration_ms <= SLOW_HOOK_THRESHOLD_MS))
                .collect();
            for hook in &recovered {
                self.calculator.clear_adjustment(hook);
            }
            if !recovered.is_empty() {
                actions_taken.push(format!(
                    "Restored priority for {} recovered hooks",
                    recovered.len()
                ));
            }

            self.history.refresh_now();
        } else if !slow_hooks.is_empty() {
            actions_taken.push(format!("Identified {} slow hooks", slow_hooks.len()));
        }

        if !unreliable_hooks.is_empty() {
            actions_taken.push(format!(
                "Identified {} unreliable hooks",
                unreliable_hooks.len()
            ));
        }

        let current_usage = self.monitor.current();
        let trends = self.monitor.trends();
        let recommendations = self.recommendations(&current_usage, trends);

        tracing::info!(
            slow = slow_hooks.len(),
            unreliable = unreliable_hooks.len(),
            actions = actions_taken.len(),
            "Optimization pass finished"
        );

        OptimizationReport {
            timestamp: Utc::now(),
            actions_taken,
            priority_adjustments,
            slow_hooks,
            unreliable_hooks,
            performance: stats.into_iter().collect(),
            resources: ResourceReport {
                current_usage,
                trends,
                recommendations,
            },
        }
    }

    fn recommendations(&self, usage: &ResourceSnapshot, trends: ResourceTrends) -> Vec<String> {
        let mut advice = Vec::new();
        if usage.cpu_percent > self.config.resource_threshold_cpu {
            advice.push("High CPU usage detected - consider reducing parallel execution".to_string());
        }
        if usage.memory_percent > self.config.resource_threshold_memory {
            advice.push("High memory usage detected - consider memory optimization".to_string());
        }
        if trends.cpu == ResourceTrend::Increasing {
            advice.push("CPU usage trending upward - monitor for performance issues".to_string());
        }
        if trends.memory == ResourceTrend::Increasing {
            advice.push("Memory usage trending upward - check for memory leaks".to_string());
        }
        advice
    }

    /// Current sizes, settings and resource state
    pub fn metrics(&self) -> SystemMetrics {
        SystemMetrics {
            timestamp: Utc::now(),
            registry_size: self.registry.read().len(),
            tracked_hooks: self.history.hook_count(),
            performance_history_size: self.history.total_samples(),
            rollback_history_size: self.rollback.history_len(),
            resource_monitor: MonitorStatus {
                active: self.monitor.is_active(),
                history_len: self.monitor.history_len(),
                current: self.monitor.current(),
                trends: self.monitor.trends(),
            },
            default_conflict_strategy: self.config.default_conflict_strategy,
            dynamic_adjustment_enabled: self.config.enable_dynamic_priority_adjustment,
            max_workers: self.config.max_workers,
            max_execution_time_ms: self.config.max_execution_time_ms,
            priority_adjustments: self.calculator.adjustments(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::hooks::HookDescriptor;
    use hookflow_core::{ExecutionPhase, HookContext, HookFailure, PriorityLevel};

    fn idle() -> ResourceSnapshot {
        ResourceSnapshot {
            cpu_percent: 10.0,
            memory_percent: 40.0,
            memory_available_mb: 8192.0,
            memory_total_mb: 16384.0,
        }
    }

    fn ok(_: &HookContext) -> std::result::Result<(), HookFailure> {
        Ok(())
    }

    fn system(registry: HookRegistry, config: PrioritySystemConfig) -> PrioritySystem {
        PrioritySystem::builder()
            .config(config)
            .registry(registry)
            .fixed_resources(idle())
            .build()
            .unwrap()
    }

    fn sample_registry() -> HookRegistry {
        HookRegistry::builder()
            .hook(
                HookDescriptor::new("a", PriorityLevel::High)
                    .with_trigger("deploy")
                    .with_phase(ExecutionPhase::Initialization),
                ok,
            )
            .hook(
                HookDescriptor::new("b", PriorityLevel::Normal)
                    .with_trigger("deploy")
                    .with_dependency("a")
                    .with_phase(ExecutionPhase::Initialization),
                ok,
            )
            .hook(
                HookDescriptor::new("c", PriorityLevel::Critical)
                    .with_trigger("deploy")
                    .with_phase(ExecutionPhase::CoreProcessing),
                ok,
            )
            .hook(
                HookDescriptor::new("other", PriorityLevel::Low).with_trigger("commit"),
                ok,
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_names_select_trigger_hooks() {
        let system = system(sample_registry(), PrioritySystemConfig::default());
        let plan = system
            .calculate_execution_order("deploy", &[], &ExecutionContext::new("deploy"))
            .unwrap();

        assert_eq!(plan.hook_count(), 3);
        let a = plan.batch_of("a").unwrap();
        let b = plan.batch_of("b").unwrap();
        let c = plan.batch_of("c").unwrap();
        assert!(a < b);
        assert!(c > a && c > b);
    }

    #[test]
    fn test_unknown_hook_fails() {
        let system = system(sample_registry(), PrioritySystemConfig::default());
        let err = system
            .calculate_execution_order("deploy", &["ghost".to_string()], &ExecutionContext::new("deploy"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownHook(name) if name == "ghost"));
    }

    #[test]
    fn test_unbound_hook_is_skipped() {
        let system = system(sample_registry(), PrioritySystemConfig::default());
        let names = vec!["c".to_string(), "other".to_string()];
        let plan = system
            .calculate_execution_order("deploy", &names, &ExecutionContext::new("deploy"))
            .unwrap();

        assert_eq!(plan.hook_count(), 1);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].hook, "other");
    }

    #[test]
    fn test_first_match_override_per_trigger() {
        let mut config = PrioritySystemConfig::default();
        config
            .conflict_strategies_by_trigger
            .insert("deploy".to_string(), ConflictStrategy::FirstMatch);
        let system = system(sample_registry(), config);
        let plan = system
            .calculate_execution_order("deploy", &[], &ExecutionContext::new("deploy"))
            .unwrap();

        assert_eq!(plan.hook_count(), 1);
        assert_eq!(plan.resolution.proceed, vec!["c".to_string()]);
        assert!(plan.skipped.iter().all(|s| s.reason == SKIP_CONFLICT));
    }

    #[test]
    fn test_round_robin_rotates_between_plans() {
        let config = PrioritySystemConfig {
            default_conflict_strategy: ConflictStrategy::RoundRobin,
            ..PrioritySystemConfig::default()
        };
        let system = system(sample_registry(), config);
        let winners: Vec<String> = (0..4)
            .map(|_| {
                let plan = system
                    .calculate_execution_order("deploy", &[], &ExecutionContext::new("deploy"))
                    .unwrap();
                assert_eq!(plan.hook_count(), 1);
                assert_eq!(plan.skipped.len(), 2);
                plan.resolution.proceed[0].clone()
            })
            .collect();
        assert_eq!(winners, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_load_based_uses_configured_threshold() {
        let config = PrioritySystemConfig {
            default_conflict_strategy: ConflictStrategy::LoadBased,
            conflict_load_threshold_cpu: 5.0,
            ..PrioritySystemConfig::default()
        };
        let system = system(sample_registry(), config);
        system.history().record("a", 800.0, true);
        system.history().record("b", 30.0, true);
        system.history().record("c", 500.0, true);
        system.history().refresh_now();

        // idle() reports 10% CPU, above the 5% threshold
        let plan = system
            .calculate_execution_order("deploy", &[], &ExecutionContext::new("deploy"))
            .unwrap();
        assert_eq!(plan.resolution.proceed, vec!["b".to_string()]);
        assert!(plan.resolution.reason.starts_with("Lightest hook"));
    }

    #[test]
    fn test_optimize_lowers_slow_hooks() {
        let system = system(sample_registry(), PrioritySystemConfig::default());
        system.history().record("c", 6000.0, true);
        system.history().record("a", 10.0, false);

        let report = system.optimize_system_performance();
        assert_eq!(report.slow_hooks, vec!["c".to_string()]);
        assert_eq!(report.unreliable_hooks, vec!["a".to_string()]);
        assert!((report.priority_adjustments["c"] - SLOW_HOOK_ADJUSTMENT).abs() < 1e-9);
        assert!((system.calculator().adjustment("c") - SLOW_HOOK_ADJUSTMENT).abs() < 1e-9);
        assert_eq!(report.actions_taken.len(), 2);
    }

    #[test]
    fn test_optimize_without_dynamic_adjustment_only_reports() {
        let config = PrioritySystemConfig {
            enable_dynamic_priority_adjustment: false,
            ..PrioritySystemConfig::default()
        };
        let system = system(sample_registry(), config);
        system.history().record("c", 6000.0, true);

        let report = system.optimize_system_performance();
        assert_eq!(report.slow_hooks, vec!["c".to_string()]);
        assert!(report.priority_adjustments.is_empty());
        assert!(system.calculator().adjustment("c").abs() < f64::EPSILON);
    }

    #[test]
    fn test_recommendations_follow_thresholds() {
        let system = PrioritySystem::builder()
            .fixed_resources(ResourceSnapshot {
                cpu_percent: 95.0,
                memory_percent: 97.0,
                memory_available_mb: 100.0,
                memory_total_mb: 16384.0,
            })
            .build()
            .unwrap();

        let report = system.optimize_system_performance();
        assert_eq!(report.resources.recommendations.len(), 2);
        assert!(report.resources.recommendations[0].starts_with("High CPU usage"));
    }

    #[test]
    fn test_metrics_reflect_state() {
        let system = system(sample_registry(), PrioritySystemConfig::default());
        system.history().record("a", 5.0, true);
        system.history().record("a", 7.0, true);

        let metrics = system.metrics();
        assert_eq!(metrics.registry_size, 4);
        assert_eq!(metrics.tracked_hooks, 1);
        assert_eq!(metrics.performance_history_size, 2);
        assert!(!metrics.resource_monitor.active);
        assert_eq!(metrics.max_workers, 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PrioritySystemConfig::default();
        config.priority_weights.base_priority = 0.9;
        assert!(PrioritySystem::builder().config(config).build().is_err());
    }
}
