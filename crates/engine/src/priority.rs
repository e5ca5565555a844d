//! Priority scoring
//!
//! A hook's score is the weighted sum of seven normalized signals plus an
//! optional adjustment learned from its performance. Higher scores run first.

use crate::history::StatsSnapshot;
use crate::hooks::{HookDescriptor, HookRegistry};
use crate::resources::ResourceSnapshot;
use dashmap::DashMap;
use hookflow_config::PriorityWeights;
use hookflow_core::{ExecutionContext, ResourceHint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CPU hint above which a hook counts as heavy for the load signal
const HEAVY_HOOK_CPU_PERCENT: f64 = 20.0;

/// Memory usage below which an unhinted hook is considered unconstrained
const MEMORY_COMFORTABLE_PERCENT: f64 = 80.0;

/// Memory usage above which an unhinted hook is considered starved
const MEMORY_EXHAUSTED_PERCENT: f64 = 95.0;

/// The seven normalized inputs of a score, each between 0 and 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrioritySignals {
    /// Static priority class
    pub base_priority: f64,
    /// Share of other hooks that depend on this one
    pub dependency_depth: f64,
    /// Executions relative to the most executed hook
    pub execution_frequency: f64,
    /// Historical success ratio
    pub success_rate: f64,
    /// Headroom for heavy hooks
    pub system_load: f64,
    /// Urgency of the firing
    pub time_sensitivity: f64,
    /// Whether the hook fits into free resources
    pub resource_availability: f64,
}

impl PrioritySignals {
    /// Weighted sum
    #[must_use]
    pub fn weighted(&self, weights: &PriorityWeights) -> f64 {
        self.base_priority * weights.base_priority
            + self.dependency_depth * weights.dependency_depth
            + self.execution_frequency * weights.execution_frequency
            + self.success_rate * weights.success_rate
            + self.system_load * weights.system_load
            + self.time_sensitivity * weights.time_sensitivity
            + self.resource_availability * weights.resource_availability
    }
}

/// Inputs shared by every score computed for one plan
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs<'a> {
    /// Registry the hooks come from
    pub registry: &'a HookRegistry,
    /// Invocation context
    pub context: &'a ExecutionContext,
    /// Rolling statistics
    pub stats: &'a StatsSnapshot,
    /// Current resource usage
    pub resources: &'a ResourceSnapshot,
}

/// Computes scores and holds per-hook adjustments
#[derive(Debug)]
pub struct PriorityCalculator {
    weights: PriorityWeights,
    adjustments: DashMap<String, f64>,
}

impl PriorityCalculator {
    /// Create a calculator with validated weights
    #[must_use]
    pub fn new(weights: PriorityWeights) -> Self {
        Self {
            weights,
            adjustments: DashMap::new(),
        }
    }

    /// Signal weights
    #[must_use]
    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    /// Resource hint in effect for a hook; the context overrides the descriptor
    #[must_use]
    pub fn effective_hint(
        descriptor: &HookDescriptor,
        context: &ExecutionContext,
    ) -> Option<ResourceHint> {
        context
            .resource_hint(&descriptor.name)
            .or(descriptor.resources)
    }

    /// Compute the individual signals of a hook
    #[must_use]
    pub fn signals(&self, descriptor: &HookDescriptor, inputs: &ScoringInputs<'_>) -> PrioritySignals {
        let hint = Self::effective_hint(descriptor, inputs.context);
        let resources = inputs.resources;

        let system_load = match hint {
            Some(hint) if hint.cpu_percent > HEAVY_HOOK_CPU_PERCENT => {
                (1.0 - resources.cpu_percent / 100.0).clamp(0.0, 1.0)
            }
            _ => 1.0,
        };

        let resource_availability = match hint {
            Some(hint) => {
                if resources.fits(&hint) {
                    1.0
                } else {
                    0.0
                }
            }
            None if resources.memory_percent < MEMORY_COMFORTABLE_PERCENT => 1.0,
            None if resources.memory_percent > MEMORY_EXHAUSTED_PERCENT => 0.0,
            None => 0.5,
        };

        PrioritySignals {
            base_priority: descriptor.base_priority.signal(),
            dependency_depth: inputs.registry.dependency_depth_signal(&descriptor.name),
            execution_frequency: inputs.stats.frequency_signal(&descriptor.name),
            success_rate: inputs.stats.success_signal(&descriptor.name),
            system_load,
            time_sensitivity: inputs.context.time_sensitivity.signal(),
            resource_availability,
        }
    }

    /// Final, non-negative score of a hook
    #[must_use]
    pub fn score(&self, descriptor: &HookDescriptor, inputs: &ScoringInputs<'_>) -> f64 {
        let signals = self.signals(descriptor, inputs);
        let score = signals.weighted(&self.weights) + self.adjustment(&descriptor.name);
        tracing::trace!(hook = %descriptor.name, score, ?signals, "Scored hook");
        score.max(0.0)
    }

    /// Current adjustment of a hook
    #[must_use]
    pub fn adjustment(&self, hook: &str) -> f64 {
        self.adjustments.get(hook).map_or(0.0, |a| *a)
    }

    /// Set the adjustment of a hook
    pub fn set_adjustment(&self, hook: &str, value: f64) {
        self.adjustments.insert(hook.to_string(), value);
    }

    /// Remove the adjustment of a hook, returning it
    pub fn clear_adjustment(&self, hook: &str) -> Option<f64> {
        self.adjustments.remove(hook).map(|(_, value)| value)
    }

    /// Every adjustment, sorted by hook name
    #[must_use]
    pub fn adjustments(&self) -> BTreeMap<String, f64> {
        self.adjustments
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Replace every adjustment
    pub fn replace_adjustments(&self, adjustments: impl IntoIterator<Item = (String, f64)>) {
        self.adjustments.clear();
        for (hook, value) in adjustments {
            self.adjustments.insert(hook, value);
        }
    }
}
