//! Configuration management
//!
//! This module handles loading, validating and saving the priority system
//! configuration. Files are JSON; every field is optional and falls back to
//! its default. Unknown fields and invalid values are rejected on load.

use crate::Result;
use hookflow_core::{ConflictStrategy, Error, ExecutionPhase, RollbackScope};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-2;

/// Weights of the seven priority signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityWeights {
    /// Static priority class
    #[serde(default = "default_base_weight")]
    pub base_priority: f64,
    /// How many hooks depend on this one
    #[serde(default = "default_dependency_weight")]
    pub dependency_depth: f64,
    /// How often the hook ran historically
    #[serde(default = "default_frequency_weight")]
    pub execution_frequency: f64,
    /// Historical success ratio
    #[serde(default = "default_success_weight")]
    pub success_rate: f64,
    /// Inverse of current CPU pressure
    #[serde(default = "default_load_weight")]
    pub system_load: f64,
    /// Urgency of the trigger firing
    #[serde(default = "default_time_weight")]
    pub time_sensitivity: f64,
    /// Whether the hook's resource hint fits
    #[serde(default = "default_availability_weight")]
    pub resource_availability: f64,
}

fn default_base_weight() -> f64 {
    0.40
}

fn default_dependency_weight() -> f64 {
    0.15
}

fn default_frequency_weight() -> f64 {
    0.15
}

fn default_success_weight() -> f64 {
    0.10
}

fn default_load_weight() -> f64 {
    0.10
}

fn default_time_weight() -> f64 {
    0.05
}

fn default_availability_weight() -> f64 {
    0.05
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            base_priority: default_base_weight(),
            dependency_depth: default_dependency_weight(),
            execution_frequency: default_frequency_weight(),
            success_rate: default_success_weight(),
            system_load: default_load_weight(),
            time_sensitivity: default_time_weight(),
            resource_availability: default_availability_weight(),
        }
    }
}

impl PriorityWeights {
    /// Weights paired with their names
    #[must_use]
    pub fn entries(&self) -> [(&'static str, f64); 7] {
        [
            ("base_priority", self.base_priority),
            ("dependency_depth", self.dependency_depth),
            ("execution_frequency", self.execution_frequency),
            ("success_rate", self.success_rate),
            ("system_load", self.system_load),
            ("time_sensitivity", self.time_sensitivity),
            ("resource_availability", self.resource_availability),
        ]
    }

    /// Sum of all weights
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.entries().iter().map(|(_, w)| w).sum()
    }
}

/// Per-phase execution limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseSettings {
    /// Default timeout of each hook in the phase
    pub timeout_ms: u64,
    /// Most hooks of this phase in one batch
    pub max_parallelism: usize,
    /// A failure in this phase halts the plan
    #[serde(default)]
    pub required: bool,
}

impl PhaseSettings {
    /// Built-in settings of a phase
    #[must_use]
    pub fn default_for(phase: ExecutionPhase) -> Self {
        let (timeout_ms, max_parallelism, required) = match phase {
            ExecutionPhase::PreValidation => (5_000, 2, true),
            ExecutionPhase::Initialization => (10_000, 4, true),
            ExecutionPhase::CoreProcessing => (20_000, 8, false),
            ExecutionPhase::PostProcessing => (15_000, 6, false),
            ExecutionPhase::Cleanup => (8_000, 4, false),
            ExecutionPhase::Finalization => (10_000, 2, false),
        };
        Self {
            timeout_ms,
            max_parallelism,
            required,
        }
    }
}

fn default_phase_configuration() -> IndexMap<ExecutionPhase, PhaseSettings> {
    ExecutionPhase::ALL
        .into_iter()
        .map(|phase| (phase, PhaseSettings::default_for(phase)))
        .collect()
}

/// Configuration of the priority system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrioritySystemConfig {
    /// Master switch
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Size of the worker pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Ceiling for any single hook timeout, in milliseconds
    #[serde(default = "default_max_execution_time_ms")]
    pub max_execution_time_ms: u64,

    /// Reload hook definitions when the hooks directory changes
    #[serde(default = "default_true")]
    pub enable_hot_reload: bool,

    /// Priority signal weights
    #[serde(default)]
    pub priority_weights: PriorityWeights,

    /// Strategy used when no per-trigger override exists
    #[serde(default)]
    pub default_conflict_strategy: ConflictStrategy,

    /// Per-trigger strategy overrides
    #[serde(default)]
    pub conflict_strategies_by_trigger: IndexMap<String, ConflictStrategy>,

    /// CPU usage, in percent, above which `load_based` picks the fastest hook
    #[serde(default = "default_resource_threshold_cpu")]
    pub conflict_load_threshold_cpu: f64,

    /// Split batches whose resource hints exceed the thresholds
    #[serde(default = "default_true")]
    pub enable_parallel_optimization: bool,

    /// Most hooks in one batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// CPU budget of one batch, in percent
    #[serde(default = "default_resource_threshold_cpu")]
    pub resource_threshold_cpu: f64,

    /// Memory budget of one batch, in percent of total memory
    #[serde(default = "default_resource_threshold_memory")]
    pub resource_threshold_memory: f64,

    /// Compensate executed hooks after failures
    #[serde(default = "default_true")]
    pub enable_rollback: bool,

    /// Scope used for rollback
    #[serde(default)]
    pub default_rollback_scope: RollbackScope,

    /// Total time budget of one rollback, in milliseconds
    #[serde(default = "default_rollback_timeout_ms")]
    pub rollback_timeout_ms: u64,

    /// Rollback outcomes kept for metrics
    #[serde(default = "default_history_size")]
    pub max_rollback_history: usize,

    /// Refresh rolling statistics and apply priority adjustments
    #[serde(default = "default_true")]
    pub enable_dynamic_priority_adjustment: bool,

    /// Record hook timings into the performance history
    #[serde(default = "default_true")]
    pub performance_monitoring_enabled: bool,

    /// Age after which rolling statistics are recomputed, in seconds
    #[serde(default = "default_optimization_interval_seconds")]
    pub optimization_interval_seconds: u64,

    /// Samples kept per hook
    #[serde(default = "default_history_size")]
    pub performance_history_size: usize,

    /// Sample CPU and memory in the background
    #[serde(default = "default_true")]
    pub enable_resource_monitoring: bool,

    /// Sampling interval, in seconds
    #[serde(default = "default_resource_monitoring_interval_seconds")]
    pub resource_monitoring_interval_seconds: u64,

    /// Count current system load against batch budgets
    #[serde(default = "default_true")]
    pub load_balancing_enabled: bool,

    /// Per-phase limits; missing phases use built-in settings
    #[serde(default = "default_phase_configuration")]
    pub phase_configuration: IndexMap<ExecutionPhase, PhaseSettings>,

    /// Force debug-level logging
    #[serde(default)]
    pub enable_debug_logging: bool,

    /// Log level name (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append logs to this file
    #[serde(default)]
    pub log_file_path: Option<std::path::PathBuf>,

    /// Emit per-hook timing events at info level
    #[serde(default)]
    pub enable_performance_tracing: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    8
}

fn default_max_execution_time_ms() -> u64 {
    30_000
}

fn default_max_batch_size() -> usize {
    32
}

fn default_resource_threshold_cpu() -> f64 {
    80.0
}

fn default_resource_threshold_memory() -> f64 {
    90.0
}

fn default_rollback_timeout_ms() -> u64 {
    10_000
}

fn default_history_size() -> usize {
    1000
}

fn default_optimization_interval_seconds() -> u64 {
    300
}

fn default_resource_monitoring_interval_seconds() -> u64 {
    1
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for PrioritySystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: default_max_workers(),
            max_execution_time_ms: default_max_execution_time_ms(),
            enable_hot_reload: true,
            priority_weights: PriorityWeights::default(),
            default_conflict_strategy: ConflictStrategy::default(),
            conflict_strategies_by_trigger: IndexMap::new(),
            conflict_load_threshold_cpu: default_resource_threshold_cpu(),
            enable_parallel_optimization: true,
            max_batch_size: default_max_batch_size(),
            resource_threshold_cpu: default_resource_threshold_cpu(),
            resource_threshold_memory: default_resource_threshold_memory(),
            enable_rollback: true,
            default_rollback_scope: RollbackScope::default(),
            rollback_timeout_ms: default_rollback_timeout_ms(),
            max_rollback_history: default_history_size(),
            enable_dynamic_priority_adjustment: true,
            performance_monitoring_enabled: true,
            optimization_interval_seconds: default_optimization_interval_seconds(),
            performance_history_size: default_history_size(),
            enable_resource_monitoring: true,
            resource_monitoring_interval_seconds: default_resource_monitoring_interval_seconds(),
            load_balancing_enabled: true,
            phase_configuration: default_phase_configuration(),
            enable_debug_logging: false,
            log_level: default_log_level(),
            log_file_path: None,
            enable_performance_tracing: false,
        }
    }
}

impl PrioritySystemConfig {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, contains
    /// unknown fields or strategy names, or fails [`validate`](Self::validate).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let config = Self::from_json_str(&content).map_err(|e| match e {
            Error::Config(message) => {
                Error::Config(format!("Failed to parse {}: {message}", path.display()))
            }
            other => other,
        })?;

        tracing::debug!(path = %path.display(), "Loaded priority system configuration");
        Ok(config)
    }

    /// Load a configuration file, or the defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply a partial JSON object on top of this configuration
    ///
    /// The merged result is validated; `self` is left untouched on error.
    pub fn merged_with(&self, updates: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(updates) = updates else {
            return Err(Error::Config(
                "Configuration updates must be a JSON object".to_string(),
            ));
        };

        let mut current = serde_json::to_value(self)?;
        if let serde_json::Value::Object(fields) = &mut current {
            for (key, value) in updates {
                fields.insert(key.clone(), value.clone());
            }
        }

        let merged: Self = serde_json::from_value(current)?;
        merged.ensure_valid()?;
        Ok(merged)
    }

    /// Collect every validation problem
    ///
    /// An empty list means the configuration is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.max_workers == 0 {
            issues.push("max_workers must be greater than 0".to_string());
        }
        if self.max_execution_time_ms == 0 {
            issues.push("max_execution_time_ms must be greater than 0".to_string());
        }
        if self.max_batch_size == 0 {
            issues.push("max_batch_size must be greater than 0".to_string());
        }
        if self.rollback_timeout_ms == 0 {
            issues.push("rollback_timeout_ms must be greater than 0".to_string());
        }
        if self.performance_history_size == 0 {
            issues.push("performance_history_size must be greater than 0".to_string());
        }
        if self.resource_monitoring_interval_seconds == 0 {
            issues.push("resource_monitoring_interval_seconds must be greater than 0".to_string());
        }

        for (name, weight) in self.priority_weights.entries() {
            if !weight.is_finite() || weight < 0.0 {
                issues.push(format!("Priority weight '{name}' must be a non-negative number"));
            }
        }
        let weight_sum = self.priority_weights.sum();
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            issues.push(format!(
                "Priority weights sum to {weight_sum:.3}, should sum to 1.0"
            ));
        }

        if !(0.0..=100.0).contains(&self.resource_threshold_cpu) {
            issues.push("resource_threshold_cpu must be between 0 and 100".to_string());
        }
        if !(0.0..=100.0).contains(&self.resource_threshold_memory) {
            issues.push("resource_threshold_memory must be between 0 and 100".to_string());
        }
        if !(0.0..=100.0).contains(&self.conflict_load_threshold_cpu) {
            issues.push("conflict_load_threshold_cpu must be between 0 and 100".to_string());
        }

        for (phase, settings) in &self.phase_configuration {
            if settings.timeout_ms == 0 {
                issues.push(format!("Phase '{phase}' must have positive timeout_ms"));
            }
            if settings.max_parallelism == 0 {
                issues.push(format!("Phase '{phase}' must have positive max_parallelism"));
            }
        }

        issues
    }

    /// Fail with every validation problem at once
    pub fn ensure_valid(&self) -> Result<()> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig { issues })
        }
    }

    /// Conflict strategy for a trigger
    #[must_use]
    pub fn strategy_for(&self, trigger: &str) -> ConflictStrategy {
        self.conflict_strategies_by_trigger
            .get(trigger)
            .copied()
            .unwrap_or(self.default_conflict_strategy)
    }

    /// Settings of a phase, falling back to the built-in ones
    #[must_use]
    pub fn phase(&self, phase: ExecutionPhase) -> PhaseSettings {
        self.phase_configuration
            .get(&phase)
            .copied()
            .unwrap_or_else(|| PhaseSettings::default_for(phase))
    }

    /// Whether logging should run at debug level
    #[must_use]
    pub fn debug_logging(&self) -> bool {
        self.enable_debug_logging
            || matches!(
                self.log_level.to_ascii_uppercase().as_str(),
                "DEBUG" | "TRACE"
            )
    }
}
