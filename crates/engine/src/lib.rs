//! # Hookflow Engine
//!
//! Scheduling and execution engine for prioritized hooks.
//!
//! - **Hooks**: descriptors, the registry and TOML hook directories
//! - **Priority**: weighted scores from static and dynamic signals
//! - **Conflict resolution**: strategies for hooks sharing a trigger
//! - **Scheduling**: phase-ordered, dependency-respecting batches
//! - **Execution**: a fixed worker pool with per-hook timeouts
//! - **Rollback**: scoped, best-effort compensation after failures
//! - **State**: performance history and adjustments persisted with redb

pub mod buffer;
pub mod conflict;
pub mod executor;
pub(crate) mod graph;
pub mod history;
pub mod hooks;
pub mod plan;
pub mod priority;
pub mod report;
pub mod resources;
pub mod rollback;
pub mod scheduler;
pub mod state;
pub mod system;

// Re-export error types from core
pub use hookflow_core::{Error, Result};

// Re-export commonly used types
pub use buffer::BoundedBuffer;
pub use conflict::{ConflictResolver, ResolutionInputs};
pub use executor::{ExecutionEngine, SKIP_DEPENDENCY_FAILED, SKIP_HALTED};
pub use history::{HistoryExport, HookStats, PerformanceHistory, PerformanceSample, StatsSnapshot};
pub use hooks::{
    CommandHook, DuctProcess, HookDescriptor, HookLoader, HookRegistry, HookRegistryBuilder,
    HookSpec, LoadedHook, RegisteredHook, RegistryWatcher,
};
pub use plan::{
    Batch, BatchSummary, ConflictResolution, ExecutionPlan, PlanSummary, PlannedHook, ScoredHook,
    SkippedHook,
};
pub use priority::{PriorityCalculator, PrioritySignals, ScoringInputs};
pub use report::{ExecutionResult, PlanReport};
pub use resources::{
    ResourceMonitor, ResourceProbe, ResourceSnapshot, ResourceTrend, ResourceTrends, SysinfoProbe,
};
pub use rollback::{InconsistentRecord, RollbackManager, RollbackOutcome};
pub use scheduler::PhaseScheduler;
pub use state::{HistoryStore, PersistentState, RedbPersistentState};
pub use system::{
    MonitorStatus, OptimizationReport, PrioritySystem, PrioritySystemBuilder, ResourceReport,
    SKIP_CONFLICT, SLOW_HOOK_THRESHOLD_MS, SystemMetrics,
};
