//! Execution plan types

use crate::hooks::HookDescriptor;
use chrono::{DateTime, Utc};
use hookflow_core::{ConflictStrategy, ExecutionPhase, Hook, ResourceHint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A hook selected for a plan, with its score and scheduling data
#[derive(Clone)]
pub struct ScoredHook {
    /// Static metadata
    pub descriptor: Arc<HookDescriptor>,
    /// Executable body
    pub body: Arc<dyn Hook>,
    /// Score at planning time
    pub priority_score: f64,
    /// Phase the hook runs in
    pub assigned_phase: ExecutionPhase,
    /// Resource estimate used for batching
    pub resource_hint: Option<ResourceHint>,
    /// Hooks of the same plan that must finish first
    pub plan_dependencies: Vec<String>,
}

impl ScoredHook {
    /// Hook name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for ScoredHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoredHook")
            .field("name", &self.descriptor.name)
            .field("priority_score", &self.priority_score)
            .field("assigned_phase", &self.assigned_phase)
            .field("resource_hint", &self.resource_hint)
            .field("plan_dependencies", &self.plan_dependencies)
            .finish_non_exhaustive()
    }
}

/// Hooks that run concurrently
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position in the plan
    pub index: usize,
    /// Phase of every hook in the batch
    pub phase: ExecutionPhase,
    /// Hooks in resolver order
    pub hooks: Vec<ScoredHook>,
}

impl Batch {
    /// Names of the hooks in the batch
    #[must_use]
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(ScoredHook::name).collect()
    }
}

/// A hook left out of a plan or a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedHook {
    /// Hook name
    pub hook: String,
    /// Why it was left out
    pub reason: String,
}

impl SkippedHook {
    /// Create an entry
    pub fn new(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

/// How competing hooks were reduced and ordered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Strategy that was applied
    pub strategy: ConflictStrategy,
    /// Hooks that proceed, in resolver order
    pub proceed: Vec<String>,
    /// Hooks excluded by the strategy
    pub skipped: Vec<String>,
    /// Human readable explanation
    pub reason: String,
}

/// Ordered batches for one trigger firing
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Trigger the plan was built for
    pub trigger: String,
    /// Conflict resolution result
    pub resolution: ConflictResolution,
    /// Batches in execution order
    pub batches: Vec<Batch>,
    /// Hooks requested but not planned
    pub skipped: Vec<SkippedHook>,
    /// When the plan was built
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Number of planned hooks
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.batches.iter().map(|b| b.hooks.len()).sum()
    }

    /// Whether nothing is planned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Every planned hook in batch order
    pub fn hooks(&self) -> impl Iterator<Item = &ScoredHook> {
        self.batches.iter().flat_map(|b| b.hooks.iter())
    }

    /// Index of the batch holding a hook
    #[must_use]
    pub fn batch_of(&self, hook: &str) -> Option<usize> {
        self.batches
            .iter()
            .find(|b| b.hooks.iter().any(|h| h.name() == hook))
            .map(|b| b.index)
    }

    /// Serializable view of the plan
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            trigger: self.trigger.clone(),
            strategy: self.resolution.strategy,
            reason: self.resolution.reason.clone(),
            created_at: self.created_at,
            batches: self
                .batches
                .iter()
                .map(|batch| BatchSummary {
                    index: batch.index,
                    phase: batch.phase,
                    hooks: batch
                        .hooks
                        .iter()
                        .map(|hook| PlannedHook {
                            name: hook.name().to_string(),
                            priority_score: hook.priority_score,
                            base_priority: hook.descriptor.base_priority.to_string(),
                            depends_on: hook.plan_dependencies.clone(),
                        })
                        .collect(),
                })
                .collect(),
            skipped: self.skipped.clone(),
        }
    }
}

/// Serializable plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Trigger
    pub trigger: String,
    /// Conflict strategy
    pub strategy: ConflictStrategy,
    /// Resolution explanation
    pub reason: String,
    /// Build time
    pub created_at: DateTime<Utc>,
    /// Batches
    pub batches: Vec<BatchSummary>,
    /// Hooks left out
    pub skipped: Vec<SkippedHook>,
}

/// Serializable batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Position in the plan
    pub index: usize,
    /// Phase
    pub phase: ExecutionPhase,
    /// Hooks
    pub hooks: Vec<PlannedHook>,
}

/// Serializable planned hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedHook {
    /// Hook name
    pub name: String,
    /// Score
    pub priority_score: f64,
    /// Static priority class
    pub base_priority: String,
    /// In-plan dependencies
    pub depends_on: Vec<String>,
}
