//! Conflict resolution between hooks bound to the same trigger
//!
//! Four strategies decide the order of every candidate. The other five let a
//! single hook through, chosen by rotation, host load, a weighted draw or
//! registration order. [`ConflictResolver`] keeps the rotation cursors and
//! the random source between plans.

use crate::history::StatsSnapshot;
use crate::hooks::HookRegistry;
use crate::plan::{ConflictResolution, ScoredHook};
use crate::resources::ResourceSnapshot;
use dashmap::DashMap;
use hookflow_core::ConflictStrategy;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use std::cmp::Ordering;

/// Descending score, ties broken by ascending name
pub fn by_priority(a: &ScoredHook, b: &ScoredHook) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.name().cmp(b.name()))
}

/// State some strategies look at besides the scores
#[derive(Debug, Clone, Copy)]
pub struct ResolutionInputs<'a> {
    /// Registry the candidates came from, for registration order
    pub registry: &'a HookRegistry,
    /// Rolling statistics, for mean durations
    pub stats: &'a StatsSnapshot,
    /// Host load at planning time
    pub resources: &'a ResourceSnapshot,
}

/// Applies conflict strategies to scored candidates
pub struct ConflictResolver {
    /// Next turn per trigger for round robin
    rotation: DashMap<String, usize>,
    load_threshold_cpu: f64,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("rotating_triggers", &self.rotation.len())
            .field("load_threshold_cpu", &self.load_threshold_cpu)
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    /// Resolver drawing from OS entropy
    ///
    /// `load_threshold_cpu` is the CPU usage above which `load_based` prefers
    /// the hook with the lowest mean duration.
    #[must_use]
    pub fn new(load_threshold_cpu: f64) -> Self {
        Self::with_rng(load_threshold_cpu, StdRng::from_entropy())
    }

    /// Resolver with a reproducible random source
    #[must_use]
    pub fn with_seed(load_threshold_cpu: f64, seed: u64) -> Self {
        Self::with_rng(load_threshold_cpu, StdRng::seed_from_u64(seed))
    }

    fn with_rng(load_threshold_cpu: f64, rng: StdRng) -> Self {
        Self {
            rotation: DashMap::new(),
            load_threshold_cpu,
            rng: Mutex::new(rng),
        }
    }

    /// Apply a strategy to scored candidates given in caller order
    ///
    /// Returns the hooks that proceed, in the order they should be scheduled.
    pub fn resolve(
        &self,
        trigger: &str,
        mut candidates: Vec<ScoredHook>,
        strategy: ConflictStrategy,
        inputs: &ResolutionInputs<'_>,
    ) -> (Vec<ScoredHook>, ConflictResolution) {
        if candidates.is_empty() {
            return (
                Vec::new(),
                ConflictResolution {
                    strategy,
                    proceed: Vec::new(),
                    skipped: Vec::new(),
                    reason: format!("No hooks to run for '{trigger}'"),
                },
            );
        }

        let mut skipped = Vec::new();
        let reason = match strategy {
            ConflictStrategy::PriorityBased => {
                candidates.sort_by(by_priority);
                format!("{} hooks ordered by priority", candidates.len())
            }
            ConflictStrategy::FirstMatch => {
                candidates.sort_by(by_priority);
                skipped = keep_only(&mut candidates, 0);
                format!("Selected highest priority hook '{}'", candidates[0].name())
            }
            ConflictStrategy::AllParallel => {
                format!("{} hooks run in caller order", candidates.len())
            }
            ConflictStrategy::SequentialStrict => {
                candidates.sort_by(by_priority);
                format!("{} hooks run one at a time", candidates.len())
            }
            ConflictStrategy::RoundRobin => {
                sort_by_registration(&mut candidates, inputs.registry);
                let index = self.next_turn(trigger, candidates.len());
                skipped = keep_only(&mut candidates, index);
                format!(
                    "Round-robin selected '{}' (index {index})",
                    candidates[0].name()
                )
            }
            ConflictStrategy::LoadBased => {
                let cpu = inputs.resources.cpu_percent;
                let busy = cpu > self.load_threshold_cpu;
                if busy {
                    candidates.sort_by(|a, b| {
                        mean_duration(a, inputs.stats)
                            .total_cmp(&mean_duration(b, inputs.stats))
                            .then_with(|| by_priority(a, b))
                    });
                } else {
                    candidates.sort_by(by_priority);
                }
                skipped = keep_only(&mut candidates, 0);
                if busy {
                    format!("Lightest hook '{}' selected (CPU: {cpu:.1}%)", candidates[0].name())
                } else {
                    format!(
                        "Highest priority hook '{}' selected (CPU: {cpu:.1}%)",
                        candidates[0].name()
                    )
                }
            }
            ConflictStrategy::WeightedRandom => {
                candidates.sort_by(|a, b| a.name().cmp(b.name()));
                let index = self.draw(&candidates);
                skipped = keep_only(&mut candidates, index);
                format!("Weighted random selected '{}'", candidates[0].name())
            }
            ConflictStrategy::FirstRegistered => {
                sort_by_registration(&mut candidates, inputs.registry);
                skipped = keep_only(&mut candidates, 0);
                format!("First registered hook '{}'", candidates[0].name())
            }
            ConflictStrategy::LastRegistered => {
                sort_by_registration(&mut candidates, inputs.registry);
                let last = candidates.len() - 1;
                skipped = keep_only(&mut candidates, last);
                format!("Last registered hook '{}'", candidates[0].name())
            }
        };

        tracing::debug!(
            trigger,
            strategy = %strategy,
            proceed = candidates.len(),
            skipped = skipped.len(),
            "Resolved hook conflicts"
        );

        let resolution = ConflictResolution {
            strategy,
            proceed: candidates.iter().map(|h| h.name().to_string()).collect(),
            skipped,
            reason,
        };
        (candidates, resolution)
    }

    fn next_turn(&self, trigger: &str, len: usize) -> usize {
        let mut cursor = self.rotation.entry(trigger.to_string()).or_insert(0);
        let index = *cursor % len;
        *cursor = (index + 1) % len;
        index
    }

    /// Index of a candidate, weighted by its base priority
    fn draw(&self, candidates: &[ScoredHook]) -> usize {
        let weights = candidates
            .iter()
            .map(|h| h.descriptor.base_priority.signal());
        match WeightedIndex::new(weights) {
            Ok(distribution) => distribution.sample(&mut *self.rng.lock()),
            Err(e) => {
                tracing::warn!("Falling back to the first candidate: {e}");
                0
            }
        }
    }
}

/// Keep the candidate at `winner`, returning the names of the others
fn keep_only(candidates: &mut Vec<ScoredHook>, winner: usize) -> Vec<String> {
    let chosen = candidates.remove(winner);
    let skipped = candidates
        .drain(..)
        .map(|h| h.descriptor.name.clone())
        .collect();
    candidates.push(chosen);
    skipped
}

/// Registration order; hooks missing from the registry go last, by name
fn sort_by_registration(candidates: &mut [ScoredHook], registry: &HookRegistry) {
    candidates.sort_by(|a, b| {
        let position = |h: &ScoredHook| registry.registration_index(h.name()).unwrap_or(usize::MAX);
        position(a)
            .cmp(&position(b))
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// Mean recorded duration; hooks without history count as instant
fn mean_duration(hook: &ScoredHook, stats: &StatsSnapshot) -> f64 {
    stats.get(hook.name()).map_or(0.0, |s| s.avg_duration_ms)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::PerformanceHistory;
    use crate::hooks::HookDescriptor;
    use hookflow_core::{ExecutionPhase, HookContext, HookFailure, PriorityLevel};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn noop(_: &HookContext) -> Result<(), HookFailure> {
        Ok(())
    }

    fn scored_at(name: &str, level: PriorityLevel, score: f64) -> ScoredHook {
        ScoredHook {
            descriptor: Arc::new(HookDescriptor::new(name, level).with_trigger("t")),
            body: Arc::new(noop),
            priority_score: score,
            assigned_phase: ExecutionPhase::CoreProcessing,
            resource_hint: None,
            plan_dependencies: Vec::new(),
        }
    }

    fn scored(name: &str, score: f64) -> ScoredHook {
        scored_at(name, PriorityLevel::Normal, score)
    }

    fn candidates() -> Vec<ScoredHook> {
        vec![scored("low", 0.2), scored("b_top", 0.9), scored("a_top", 0.9)]
    }

    /// Registry holding `names` in the given order
    fn registry(names: &[&str]) -> HookRegistry {
        names
            .iter()
            .fold(HookRegistry::builder(), |builder, name| {
                builder.hook(
                    HookDescriptor::new(*name, PriorityLevel::Normal).with_trigger("t"),
                    noop,
                )
            })
            .build()
            .unwrap()
    }

    struct Fixture {
        registry: HookRegistry,
        stats: Arc<StatsSnapshot>,
        resources: ResourceSnapshot,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_history(&[])
        }

        fn with_history(durations: &[(&str, f64)]) -> Self {
            let history = PerformanceHistory::new(100, Duration::from_secs(300), true);
            for (hook, duration_ms) in durations {
                history.record(hook, *duration_ms, true);
            }
            Self {
                registry: registry(&["b_top", "low", "a_top"]),
                stats: history.refresh_now(),
                resources: ResourceSnapshot::default(),
            }
        }

        fn cpu(mut self, cpu_percent: f64) -> Self {
            self.resources.cpu_percent = cpu_percent;
            self
        }

        fn inputs(&self) -> ResolutionInputs<'_> {
            ResolutionInputs {
                registry: &self.registry,
                stats: &self.stats,
                resources: &self.resources,
            }
        }
    }

    fn resolve(
        strategy: ConflictStrategy,
        list: Vec<ScoredHook>,
    ) -> (Vec<ScoredHook>, ConflictResolution) {
        let fixture = Fixture::new();
        ConflictResolver::with_seed(80.0, 7).resolve("t", list, strategy, &fixture.inputs())
    }

    #[test]
    fn test_empty_candidates() {
        let (proceed, resolution) = resolve(ConflictStrategy::FirstMatch, Vec::new());
        assert!(proceed.is_empty());
        assert!(resolution.proceed.is_empty());
        assert!(resolution.skipped.is_empty());
    }

    #[test]
    fn test_priority_based_sorts_with_name_tiebreak() {
        let (_, resolution) = resolve(ConflictStrategy::PriorityBased, candidates());
        assert_eq!(resolution.proceed, vec!["a_top", "b_top", "low"]);
        assert!(resolution.skipped.is_empty());
    }

    #[test]
    fn test_first_match_keeps_only_the_best() {
        let (proceed, resolution) = resolve(ConflictStrategy::FirstMatch, candidates());
        assert_eq!(proceed.len(), 1);
        assert_eq!(proceed[0].name(), "a_top");
        assert_eq!(resolution.skipped, vec!["b_top", "low"]);
    }

    #[test]
    fn test_all_parallel_keeps_caller_order() {
        let (proceed, resolution) = resolve(ConflictStrategy::AllParallel, candidates());
        assert_eq!(proceed.len(), 3);
        assert_eq!(resolution.proceed, vec!["low", "b_top", "a_top"]);
    }

    #[test]
    fn test_sequential_strict_sorts() {
        let (_, resolution) = resolve(ConflictStrategy::SequentialStrict, candidates());
        assert_eq!(resolution.proceed, vec!["a_top", "b_top", "low"]);
    }

    #[test]
    fn test_round_robin_rotates_per_trigger() {
        let fixture = Fixture::new();
        let resolver = ConflictResolver::with_seed(80.0, 7);
        let mut winners = Vec::new();
        for _ in 0..4 {
            let (proceed, resolution) =
                resolver.resolve("t", candidates(), ConflictStrategy::RoundRobin, &fixture.inputs());
            assert_eq!(proceed.len(), 1);
            assert_eq!(resolution.skipped.len(), 2);
            winners.push(proceed[0].name().to_string());
        }
        // Registration order is b_top, low, a_top
        assert_eq!(winners, vec!["b_top", "low", "a_top", "b_top"]);

        let (proceed, _) =
            resolver.resolve("other", candidates(), ConflictStrategy::RoundRobin, &fixture.inputs());
        assert_eq!(proceed[0].name(), "b_top");
    }

    #[test]
    fn test_round_robin_survives_shrinking_candidate_list() {
        let fixture = Fixture::new();
        let resolver = ConflictResolver::with_seed(80.0, 7);
        for _ in 0..2 {
            resolver.resolve("t", candidates(), ConflictStrategy::RoundRobin, &fixture.inputs());
        }
        let (proceed, resolution) = resolver.resolve(
            "t",
            vec![scored("low", 0.2)],
            ConflictStrategy::RoundRobin,
            &fixture.inputs(),
        );
        assert_eq!(proceed[0].name(), "low");
        assert!(resolution.skipped.is_empty());
    }

    #[test]
    fn test_load_based_prefers_fastest_hook_when_busy() {
        let fixture =
            Fixture::with_history(&[("a_top", 900.0), ("b_top", 400.0), ("low", 20.0)]).cpu(95.0);
        let resolver = ConflictResolver::with_seed(80.0, 7);
        let (proceed, resolution) =
            resolver.resolve("t", candidates(), ConflictStrategy::LoadBased, &fixture.inputs());
        assert_eq!(proceed.len(), 1);
        assert_eq!(proceed[0].name(), "low");
        assert!(resolution.reason.contains("CPU: 95.0%"));
        assert_eq!(resolution.skipped, vec!["b_top", "a_top"]);
    }

    #[test]
    fn test_load_based_prefers_priority_when_idle() {
        let fixture =
            Fixture::with_history(&[("a_top", 900.0), ("b_top", 400.0), ("low", 20.0)]).cpu(10.0);
        let resolver = ConflictResolver::with_seed(80.0, 7);
        let (proceed, _) =
            resolver.resolve("t", candidates(), ConflictStrategy::LoadBased, &fixture.inputs());
        assert_eq!(proceed[0].name(), "a_top");
    }

    #[test]
    fn test_load_based_threshold_is_configurable() {
        let fixture = Fixture::with_history(&[("a_top", 900.0), ("b_top", 400.0)]).cpu(50.0);
        let strict = ConflictResolver::with_seed(40.0, 7);
        let (proceed, _) =
            strict.resolve("t", candidates(), ConflictStrategy::LoadBased, &fixture.inputs());
        // No history for low, so it counts as the lightest
        assert_eq!(proceed[0].name(), "low");
    }

    #[test]
    fn test_weighted_random_follows_base_priority() {
        let fixture = Fixture::new();
        let resolver = ConflictResolver::with_seed(80.0, 42);
        let mut wins: HashMap<String, usize> = HashMap::new();
        for _ in 0..2000 {
            let list = vec![
                scored_at("critical", PriorityLevel::Critical, 0.5),
                scored_at("maintenance", PriorityLevel::Maintenance, 0.5),
            ];
            let (proceed, resolution) =
                resolver.resolve("t", list, ConflictStrategy::WeightedRandom, &fixture.inputs());
            assert_eq!(proceed.len(), 1);
            assert_eq!(resolution.skipped.len(), 1);
            *wins.entry(proceed[0].name().to_string()).or_default() += 1;
        }
        // Odds are 1.0 to 0.2
        let critical = wins.get("critical").copied().unwrap_or(0);
        let maintenance = wins.get("maintenance").copied().unwrap_or(0);
        assert!(maintenance > 0);
        assert!(critical > maintenance * 3, "{critical} vs {maintenance}");
    }

    #[test]
    fn test_weighted_random_is_reproducible_with_seed() {
        let fixture = Fixture::new();
        let picks = |seed: u64| {
            let resolver = ConflictResolver::with_seed(80.0, seed);
            (0..20)
                .map(|_| {
                    let (proceed, _) = resolver.resolve(
                        "t",
                        candidates(),
                        ConflictStrategy::WeightedRandom,
                        &fixture.inputs(),
                    );
                    proceed[0].name().to_string()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(3), picks(3));
    }

    #[test]
    fn test_first_and_last_registered() {
        let (proceed, resolution) = resolve(ConflictStrategy::FirstRegistered, candidates());
        assert_eq!(proceed[0].name(), "b_top");
        assert_eq!(resolution.skipped, vec!["low", "a_top"]);

        let (proceed, resolution) = resolve(ConflictStrategy::LastRegistered, candidates());
        assert_eq!(proceed[0].name(), "a_top");
        assert_eq!(resolution.skipped, vec!["b_top", "low"]);
        assert!(resolution.reason.contains("Last registered"));
    }
}
