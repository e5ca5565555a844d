//! Phase scheduling and batch packing
//!
//! Hooks are grouped by phase, then packed greedily into batches: a batch
//! takes every hook whose in-plan dependencies sit in earlier batches, in
//! resolver order, up to the batch cap. Oversized batches are split by their
//! resource estimates.

use crate::graph::{self, DependencyMap};
use crate::plan::{Batch, ScoredHook};
use crate::resources::ResourceSnapshot;
use hookflow_config::PrioritySystemConfig;
use hookflow_core::{ConflictStrategy, Error, ExecutionPhase, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Packs resolved hooks into ordered batches
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    config: Arc<PrioritySystemConfig>,
}

impl PhaseScheduler {
    /// Create a scheduler
    #[must_use]
    pub fn new(config: Arc<PrioritySystemConfig>) -> Self {
        Self { config }
    }

    /// Build batches from hooks in resolver order
    ///
    /// Fills in each hook's in-plan dependencies.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DependencyCycle`] when the hooks depend on each
    /// other in a cycle and with [`Error::PhaseOrder`] when a hook depends on
    /// a hook of a later phase.
    pub fn build_plan(
        &self,
        mut hooks: Vec<ScoredHook>,
        strategy: ConflictStrategy,
        resources: &ResourceSnapshot,
    ) -> Result<Vec<Batch>> {
        if hooks.is_empty() {
            return Ok(Vec::new());
        }

        resolve_plan_dependencies(&mut hooks);
        check_cycles(&hooks)?;
        check_phase_order(&hooks)?;

        let mut batches: Vec<Batch> = Vec::new();
        let mut placed: HashSet<String> = HashSet::with_capacity(hooks.len());

        for phase in ExecutionPhase::ALL {
            let remaining: Vec<ScoredHook> = hooks
                .iter()
                .filter(|h| h.assigned_phase == phase)
                .cloned()
                .collect();
            if remaining.is_empty() {
                continue;
            }

            let cap = self.batch_cap(phase, strategy);
            self.pack_phase(phase, remaining, cap, &mut placed, resources, &mut batches)?;
        }

        tracing::debug!(
            hooks = hooks.len(),
            batches = batches.len(),
            "Execution plan built"
        );
        Ok(batches)
    }

    /// Pack the hooks of one phase into batches after those already built
    ///
    /// Hooks become ready once every in-plan dependency is in `placed`. If
    /// none are ready the rest wait on each other or on a later phase.
    fn pack_phase(
        &self,
        phase: ExecutionPhase,
        mut remaining: Vec<ScoredHook>,
        cap: usize,
        placed: &mut HashSet<String>,
        resources: &ResourceSnapshot,
        batches: &mut Vec<Batch>,
    ) -> Result<()> {
        while !remaining.is_empty() {
            let mut ready = Vec::new();
            let mut waiting = Vec::new();
            for hook in remaining {
                let is_ready = ready.len() < cap
                    && hook.plan_dependencies.iter().all(|d| placed.contains(d));
                if is_ready {
                    ready.push(hook);
                } else {
                    waiting.push(hook);
                }
            }

            if ready.is_empty() {
                check_cycles(&waiting)?;
                return Err(Error::Message(format!(
                    "Hooks in phase {phase} wait on hooks that are not scheduled before them: {}",
                    waiting
                        .iter()
                        .map(ScoredHook::name)
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }

            placed.extend(ready.iter().map(|h| h.name().to_string()));
            for group in self.split_by_resources(ready, resources) {
                batches.push(Batch {
                    index: batches.len(),
                    phase,
                    hooks: group,
                });
            }
            remaining = waiting;
        }
        Ok(())
    }

    fn batch_cap(&self, phase: ExecutionPhase, strategy: ConflictStrategy) -> usize {
        if strategy == ConflictStrategy::SequentialStrict {
            return 1;
        }
        self.config
            .max_batch_size
            .min(self.config.phase(phase).max_parallelism)
            .max(1)
    }

    /// Split a batch into sequential groups that stay within the budgets
    ///
    /// Every group holds at least one hook, even if that hook alone exceeds
    /// the budget. Hooks without an estimate count as free.
    fn split_by_resources(
        &self,
        hooks: Vec<ScoredHook>,
        resources: &ResourceSnapshot,
    ) -> Vec<Vec<ScoredHook>> {
        if !self.config.enable_parallel_optimization || hooks.len() < 2 {
            return vec![hooks];
        }

        let (base_cpu, base_memory) = if self.config.load_balancing_enabled {
            (resources.cpu_percent, resources.memory_percent)
        } else {
            (0.0, 0.0)
        };
        let cpu_budget = self.config.resource_threshold_cpu;
        let memory_budget = self.config.resource_threshold_memory;

        let mut groups: Vec<Vec<ScoredHook>> = Vec::new();
        let mut current: Vec<ScoredHook> = Vec::new();
        let (mut cpu, mut memory) = (base_cpu, base_memory);

        for hook in hooks {
            let hint = hook.resource_hint.unwrap_or_default();
            let hook_cpu = hint.cpu_percent;
            let hook_memory = resources.memory_share(hint.memory_mb);

            let exceeds = cpu + hook_cpu > cpu_budget || memory + hook_memory > memory_budget;
            if exceeds && !current.is_empty() {
                groups.push(std::mem::take(&mut current));
                cpu = base_cpu;
                memory = base_memory;
            }
            cpu += hook_cpu;
            memory += hook_memory;
            current.push(hook);
        }
        if !current.is_empty() {
            groups.push(current);
        }

        if groups.len() > 1 {
            tracing::debug!(groups = groups.len(), "Split batch to stay within resource budget");
        }
        groups
    }
}

/// Map each hook's dependencies onto the hooks present in the plan
///
/// Dependencies nobody in the plan satisfies are dropped.
fn resolve_plan_dependencies(hooks: &mut [ScoredHook]) {
    let resolved: Vec<Vec<String>> = hooks
        .iter()
        .map(|hook| {
            let mut targets: Vec<String> = Vec::new();
            for dependency in &hook.descriptor.depends_on {
                for provider in hooks.iter() {
                    if provider.name() != hook.name()
                        && provider.descriptor.satisfies(dependency)
                        && !targets.iter().any(|t| t == provider.name())
                    {
                        targets.push(provider.name().to_string());
                    }
                }
            }
            targets
        })
        .collect();

    for (hook, targets) in hooks.iter_mut().zip(resolved) {
        hook.plan_dependencies = targets;
    }
}

fn check_cycles(hooks: &[ScoredHook]) -> Result<()> {
    let names: Vec<&str> = hooks.iter().map(ScoredHook::name).collect();
    let deps: DependencyMap<'_> = hooks
        .iter()
        .map(|h| {
            (
                h.name(),
                h.plan_dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    match graph::find_cycle(&names, &deps) {
        Some(cycle) => Err(Error::DependencyCycle { cycle }),
        None => Ok(()),
    }
}

fn check_phase_order(hooks: &[ScoredHook]) -> Result<()> {
    let phases: HashMap<&str, ExecutionPhase> = hooks
        .iter()
        .map(|h| (h.name(), h.assigned_phase))
        .collect();

    for hook in hooks {
        for dependency in &hook.plan_dependencies {
            if let Some(&dependency_phase) = phases.get(dependency.as_str())
                && dependency_phase > hook.assigned_phase
            {
                return Err(Error::PhaseOrder {
                    hook: hook.name().to_string(),
                    hook_phase: hook.assigned_phase.to_string(),
                    dependency: dependency.clone(),
                    dependency_phase: dependency_phase.to_string(),
                });
            }
        }
    }
    Ok(())
}
