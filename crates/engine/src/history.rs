//! Per-hook performance history
//!
//! Every finished hook appends a sample to its own bounded buffer. Samples are
//! bucketed by hook name so concurrent workers only contend on the same hook.
//! The calculator reads rolling statistics from a snapshot that is recomputed
//! once it is older than the refresh interval.

use crate::buffer::BoundedBuffer;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One finished hook execution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct PerformanceSample {
    /// Unix timestamp in milliseconds
    pub recorded_at_ms: i64,
    /// Wall-clock duration
    pub duration_ms: f64,
    /// Whether the hook succeeded
    pub success: bool,
}

/// Aggregates over a hook's samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HookStats {
    /// Samples in the buffer
    pub executions: usize,
    /// Successful samples
    pub successes: usize,
    /// `successes / executions`
    pub success_rate: f64,
    /// Mean duration
    pub avg_duration_ms: f64,
    /// Timestamp of the newest sample
    pub last_run_ms: Option<i64>,
}

impl HookStats {
    #[allow(clippy::cast_precision_loss)]
    fn from_samples(samples: &BoundedBuffer<PerformanceSample>) -> Self {
        let executions = samples.len();
        let successes = samples.iter().filter(|s| s.success).count();
        let total_ms: f64 = samples.iter().map(|s| s.duration_ms).sum();
        let (success_rate, avg_duration_ms) = if executions == 0 {
            (1.0, 0.0)
        } else {
            (
                successes as f64 / executions as f64,
                total_ms / executions as f64,
            )
        };
        Self {
            executions,
            successes,
            success_rate,
            avg_duration_ms,
            last_run_ms: samples.last().map(|s| s.recorded_at_ms),
        }
    }
}

/// Rolling statistics as of one point in time
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    computed_at: Instant,
    per_hook: HashMap<String, HookStats>,
    max_executions: usize,
}

impl StatsSnapshot {
    fn empty() -> Self {
        Self {
            computed_at: Instant::now(),
            per_hook: HashMap::new(),
            max_executions: 0,
        }
    }

    /// Statistics of one hook
    #[must_use]
    pub fn get(&self, hook: &str) -> Option<&HookStats> {
        self.per_hook.get(hook)
    }

    /// Executions of a hook relative to the most executed hook
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency_signal(&self, hook: &str) -> f64 {
        if self.max_executions == 0 {
            return 0.0;
        }
        let executions = self.get(hook).map_or(0, |s| s.executions);
        executions as f64 / self.max_executions as f64
    }

    /// Historical success ratio, 1.0 without history
    #[must_use]
    pub fn success_signal(&self, hook: &str) -> f64 {
        self.get(hook).map_or(1.0, |s| s.success_rate)
    }

    /// When the snapshot was computed
    #[must_use]
    pub fn computed_at(&self) -> Instant {
        self.computed_at
    }
}

/// Samples of every hook, as persisted between runs
#[derive(Debug, Clone, Default, PartialEq, bincode::Encode, bincode::Decode)]
pub struct HistoryExport {
    /// Hook name and its samples, oldest first
    pub hooks: Vec<(String, Vec<PerformanceSample>)>,
}

/// Bounded, concurrently updated performance history
#[derive(Debug)]
pub struct PerformanceHistory {
    capacity: usize,
    refresh_interval: Duration,
    auto_refresh: bool,
    buckets: DashMap<String, BoundedBuffer<PerformanceSample>>,
    snapshot: RwLock<Arc<StatsSnapshot>>,
}

impl PerformanceHistory {
    /// Create an empty history
    ///
    /// With `auto_refresh` off the rolling statistics only change through
    /// [`refresh_now`](Self::refresh_now).
    #[must_use]
    pub fn new(capacity: usize, refresh_interval: Duration, auto_refresh: bool) -> Self {
        Self {
            capacity,
            refresh_interval,
            auto_refresh,
            buckets: DashMap::new(),
            snapshot: RwLock::new(Arc::new(StatsSnapshot::empty())),
        }
    }

    /// Record a finished execution
    pub fn record(&self, hook: &str, duration_ms: f64, success: bool) {
        self.push(
            hook,
            PerformanceSample {
                recorded_at_ms: chrono::Utc::now().timestamp_millis(),
                duration_ms,
                success,
            },
        );
    }

    fn push(&self, hook: &str, sample: PerformanceSample) {
        self.buckets
            .entry(hook.to_string())
            .or_insert_with(|| BoundedBuffer::new(self.capacity))
            .push(sample);
    }

    /// Rolling statistics, recomputed when stale
    pub fn snapshot(&self) -> Arc<StatsSnapshot> {
        let current = Arc::clone(&self.snapshot.read());
        if self.auto_refresh && current.computed_at.elapsed() >= self.refresh_interval {
            return self.refresh_now();
        }
        current
    }

    /// Recompute the rolling statistics immediately
    pub fn refresh_now(&self) -> Arc<StatsSnapshot> {
        let per_hook = self.live_stats();
        let max_executions = per_hook.values().map(|s| s.executions).max().unwrap_or(0);
        let snapshot = Arc::new(StatsSnapshot {
            computed_at: Instant::now(),
            per_hook,
            max_executions,
        });
        *self.snapshot.write() = Arc::clone(&snapshot);
        tracing::debug!(hooks = snapshot.per_hook.len(), "Performance statistics refreshed");
        snapshot
    }

    /// Statistics computed from the current samples
    #[must_use]
    pub fn live_stats(&self) -> HashMap<String, HookStats> {
        self.buckets
            .iter()
            .map(|entry| (entry.key().clone(), HookStats::from_samples(entry.value())))
            .collect()
    }

    /// Total number of stored samples
    #[must_use]
    pub fn total_samples(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of hooks with samples
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.buckets.len()
    }

    /// Copy every sample out, sorted by hook name
    #[must_use]
    pub fn export(&self) -> HistoryExport {
        let mut hooks: Vec<(String, Vec<PerformanceSample>)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().to_vec()))
            .collect();
        hooks.sort_by(|a, b| a.0.cmp(&b.0));
        HistoryExport { hooks }
    }

    /// Append persisted samples, then refresh the statistics
    pub fn import(&self, export: HistoryExport) {
        for (hook, samples) in export.hooks {
            for sample in samples {
                self.push(&hook, sample);
            }
        }
        self.refresh_now();
    }
}
