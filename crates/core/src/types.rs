//! Shared enums and value types
//!
//! These types appear in configuration files, hook definitions and execution
//! reports, so their serialized names are part of the public format.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Static priority class of a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    /// System-critical hooks
    #[serde(alias = "CRITICAL")]
    Critical,
    /// Important operations
    #[serde(alias = "HIGH")]
    High,
    /// Regular hooks
    #[default]
    #[serde(alias = "NORMAL")]
    Normal,
    /// Background tasks
    #[serde(alias = "LOW")]
    Low,
    /// Cleanup and housekeeping
    #[serde(alias = "MAINTENANCE")]
    Maintenance,
}

impl PriorityLevel {
    /// Normalized base priority signal
    #[must_use]
    pub fn signal(self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.8,
            Self::Normal => 0.6,
            Self::Low => 0.4,
            Self::Maintenance => 0.2,
        }
    }

    /// Lowercase name as used in hook files
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            "maintenance" => Ok(Self::Maintenance),
            _ => Err(Error::UnknownPriority(s.to_string())),
        }
    }
}

/// Execution phase, in execution order
///
/// The derived `Ord` follows declaration order, which is the order phases run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Input and environment validation
    PreValidation,
    /// Setup work other hooks rely on
    Initialization,
    /// Main work
    #[default]
    CoreProcessing,
    /// Follow-up work on results
    PostProcessing,
    /// Resource cleanup
    Cleanup,
    /// Last-chance teardown
    Finalization,
}

impl ExecutionPhase {
    /// All phases in execution order
    pub const ALL: [Self; 6] = [
        Self::PreValidation,
        Self::Initialization,
        Self::CoreProcessing,
        Self::PostProcessing,
        Self::Cleanup,
        Self::Finalization,
    ];

    /// Snake-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreValidation => "pre_validation",
            Self::Initialization => "initialization",
            Self::CoreProcessing => "core_processing",
            Self::PostProcessing => "post_processing",
            Self::Cleanup => "cleanup",
            Self::Finalization => "finalization",
        }
    }

    /// Infer a phase from descriptive tags
    ///
    /// Returns `None` when no tag maps to a phase.
    pub fn from_tags<'a, I>(tags: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let tags: Vec<&str> = tags.into_iter().collect();
        let has = |name: &str| tags.iter().any(|t| t.eq_ignore_ascii_case(name));

        if has("validation") {
            Some(Self::PreValidation)
        } else if has("initialization") || has("setup") {
            Some(Self::Initialization)
        } else if has("cleanup") {
            Some(Self::Cleanup)
        } else if has("finalization") || has("teardown") {
            Some(Self::Finalization)
        } else if has("post_process") {
            Some(Self::PostProcessing)
        } else {
            None
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| Error::UnknownPhase(s.to_string()))
    }
}

/// How urgent a trigger firing is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeSensitivity {
    /// Can wait
    Low,
    /// Default urgency
    #[default]
    Normal,
    /// User is waiting on the result
    High,
}

impl TimeSensitivity {
    /// Normalized time sensitivity signal
    #[must_use]
    pub fn signal(self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Normal => 0.5,
            Self::High => 1.0,
        }
    }
}

impl FromStr for TimeSensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(Error::Message(format!("Unknown time sensitivity '{s}'"))),
        }
    }
}

/// Strategy used when several hooks compete for one trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Sort by score, nobody is excluded
    #[default]
    PriorityBased,
    /// Only the best-scoring hook runs
    FirstMatch,
    /// Everybody runs, in caller order
    AllParallel,
    /// Everybody runs, one hook per batch
    SequentialStrict,
    /// One hook runs, taking turns across invocations of a trigger
    RoundRobin,
    /// One hook runs: the fastest when the CPU is busy, the best-scoring otherwise
    LoadBased,
    /// One hook runs, drawn with odds proportional to its base priority
    #[serde(alias = "random")]
    WeightedRandom,
    /// The hook registered first runs
    #[serde(alias = "oldest")]
    FirstRegistered,
    /// The hook registered last runs
    #[serde(alias = "newest")]
    LastRegistered,
}

impl ConflictStrategy {
    /// Snake-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PriorityBased => "priority_based",
            Self::FirstMatch => "first_match",
            Self::AllParallel => "all_parallel",
            Self::SequentialStrict => "sequential_strict",
            Self::RoundRobin => "round_robin",
            Self::LoadBased => "load_based",
            Self::WeightedRandom => "weighted_random",
            Self::FirstRegistered => "first_registered",
            Self::LastRegistered => "last_registered",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "priority_based" => Ok(Self::PriorityBased),
            "first_match" => Ok(Self::FirstMatch),
            "all_parallel" => Ok(Self::AllParallel),
            "sequential_strict" => Ok(Self::SequentialStrict),
            "round_robin" => Ok(Self::RoundRobin),
            "load_based" => Ok(Self::LoadBased),
            "weighted_random" | "random" => Ok(Self::WeightedRandom),
            "first_registered" | "oldest" => Ok(Self::FirstRegistered),
            "last_registered" | "newest" => Ok(Self::LastRegistered),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Which executed hooks a rollback compensates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RollbackScope {
    /// Only the failed hook
    SingleHook,
    /// The failed hook and everything that depends on it
    #[default]
    DependencyChain,
    /// Every hook executed in the failing phase
    #[serde(alias = "trigger_group")]
    Phase,
    /// Every hook executed so far
    #[serde(alias = "system_wide")]
    FullPlan,
}

impl RollbackScope {
    /// Snake-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleHook => "single_hook",
            Self::DependencyChain => "dependency_chain",
            Self::Phase => "phase",
            Self::FullPlan => "full_plan",
        }
    }

    /// Whether the scope only touches the failed hook and its dependents
    #[must_use]
    pub fn is_hook_local(self) -> bool {
        matches!(self, Self::SingleHook | Self::DependencyChain)
    }
}

impl fmt::Display for RollbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollbackScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single_hook" => Ok(Self::SingleHook),
            "dependency_chain" => Ok(Self::DependencyChain),
            "phase" | "trigger_group" => Ok(Self::Phase),
            "full_plan" | "system_wide" => Ok(Self::FullPlan),
            _ => Err(Error::UnknownRollbackScope(s.to_string())),
        }
    }
}

/// Estimated resource cost of running a hook
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceHint {
    /// Share of total CPU the hook is expected to use, in percent
    #[serde(default)]
    pub cpu_percent: f64,
    /// Resident memory the hook is expected to use, in MiB
    #[serde(default)]
    pub memory_mb: f64,
}

impl ResourceHint {
    /// Create a hint
    #[must_use]
    pub fn new(cpu_percent: f64, memory_mb: f64) -> Self {
        Self {
            cpu_percent,
            memory_mb,
        }
    }
}

/// Category of a per-hook failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookErrorKind {
    /// The hook did not finish within its timeout
    Timeout,
    /// The hook body returned an error
    Execution,
    /// The hook body panicked
    Panicked,
}

/// A per-hook failure captured in an execution report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct HookError {
    /// Failure category
    pub kind: HookErrorKind,
    /// Human readable description
    pub message: String,
}

impl HookError {
    /// Timeout failure
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: HookErrorKind::Timeout,
            message: message.into(),
        }
    }

    /// Failure returned by the hook body
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: HookErrorKind::Execution,
            message: message.into(),
        }
    }

    /// Panic inside the hook body
    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: HookErrorKind::Panicked,
            message: message.into(),
        }
    }
}
