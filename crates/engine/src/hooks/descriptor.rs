//! Static hook metadata

use hookflow_core::{Error, ExecutionPhase, PriorityLevel, ResourceHint, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything the scheduler needs to know about a hook, independent of its body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDescriptor {
    /// Unique name
    pub name: String,

    /// Static priority class
    #[serde(default, alias = "priority")]
    pub base_priority: PriorityLevel,

    /// Triggers the hook responds to (must not be empty)
    #[serde(default)]
    pub triggers: BTreeSet<String>,

    /// Hook names or capabilities that must complete first
    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    /// Capabilities this hook provides to dependents
    #[serde(default)]
    pub provides: BTreeSet<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Explicit phase; inferred from tags when absent
    #[serde(default, alias = "phase", skip_serializing_if = "Option::is_none")]
    pub preferred_phase: Option<ExecutionPhase>,

    /// Timeout override, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Default resource estimate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceHint>,

    /// Human readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl HookDescriptor {
    /// Descriptor with a name and priority and nothing else
    pub fn new(name: impl Into<String>, base_priority: PriorityLevel) -> Self {
        Self {
            name: name.into(),
            base_priority,
            triggers: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            provides: BTreeSet::new(),
            tags: BTreeSet::new(),
            preferred_phase: None,
            timeout_ms: None,
            resources: None,
            description: String::new(),
        }
    }

    /// Bind to a trigger
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.insert(trigger.into());
        self
    }

    /// Depend on a hook name or capability
    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.insert(dependency.into());
        self
    }

    /// Provide a capability
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.provides.insert(capability.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Pin the phase
    #[must_use]
    pub fn with_phase(mut self, phase: ExecutionPhase) -> Self {
        self.preferred_phase = Some(phase);
        self
    }

    /// Override the phase timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the default resource estimate
    #[must_use]
    pub fn with_resources(mut self, hint: ResourceHint) -> Self {
        self.resources = Some(hint);
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Phase the hook runs in
    #[must_use]
    pub fn effective_phase(&self) -> ExecutionPhase {
        self.preferred_phase
            .or_else(|| ExecutionPhase::from_tags(self.tags.iter().map(String::as_str)))
            .unwrap_or_default()
    }

    /// Whether the hook responds to a trigger
    #[must_use]
    pub fn is_bound_to(&self, trigger: &str) -> bool {
        self.triggers.contains(trigger)
    }

    /// Whether this hook satisfies a dependency entry
    #[must_use]
    pub fn satisfies(&self, dependency: &str) -> bool {
        self.name == dependency || self.provides.contains(dependency)
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::HookConfig("Hook name must not be empty".to_string()));
        }
        if self.triggers.is_empty() {
            return Err(Error::HookConfig(format!(
                "Hook '{}' must declare at least one trigger",
                self.name
            )));
        }
        if self.depends_on.contains(&self.name) {
            return Err(Error::DependencyCycle {
                cycle: vec![self.name.clone(), self.name.clone()],
            });
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::HookConfig(format!(
                "Hook '{}' timeout_ms must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_effective_phase_prefers_explicit() {
        let hook = HookDescriptor::new("h", PriorityLevel::Normal)
            .with_tag("cleanup")
            .with_phase(ExecutionPhase::Initialization);
        assert_eq!(hook.effective_phase(), ExecutionPhase::Initialization);
    }

    #[test]
    fn test_effective_phase_from_tags_then_default() {
        let tagged = HookDescriptor::new("h", PriorityLevel::Normal).with_tag("cleanup");
        assert_eq!(tagged.effective_phase(), ExecutionPhase::Cleanup);

        let plain = HookDescriptor::new("h", PriorityLevel::Normal);
        assert_eq!(plain.effective_phase(), ExecutionPhase::CoreProcessing);
    }

    #[test]
    fn test_satisfies_by_name_or_capability() {
        let hook = HookDescriptor::new("auth_manager", PriorityLevel::High)
            .with_capability("authentication");
        assert!(hook.satisfies("auth_manager"));
        assert!(hook.satisfies("authentication"));
        assert!(!hook.satisfies("session"));
    }

    #[test]
    fn test_validate_requires_trigger() {
        let hook = HookDescriptor::new("lonely", PriorityLevel::Low);
        assert!(matches!(hook.validate(), Err(Error::HookConfig(_))));
        assert!(hook.with_trigger("save").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_self_dependency() {
        let hook = HookDescriptor::new("loop", PriorityLevel::Low)
            .with_trigger("save")
            .with_dependency("loop");
        assert!(matches!(
            hook.validate(),
            Err(Error::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let hook: HookDescriptor = toml::from_str(
            r#"
name = "formatter"
priority = "HIGH"
triggers = ["save"]
phase = "post_processing"
timeout_ms = 2000

[resources]
cpu_percent = 30.0
memory_mb = 64.0
"#,
        )
        .unwrap();

        assert_eq!(hook.base_priority, PriorityLevel::High);
        assert_eq!(hook.effective_phase(), ExecutionPhase::PostProcessing);
        assert_eq!(hook.timeout_ms, Some(2000));
        assert_eq!(hook.resources, Some(ResourceHint::new(30.0, 64.0)));
    }
}
