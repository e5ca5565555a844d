//! Hook registry
//!
//! Holds descriptors together with their bodies. A registry is immutable once
//! built; hot reload swaps in a whole new registry between runs.

use super::descriptor::HookDescriptor;
use crate::graph::{self, DependencyMap};
use hookflow_core::{Error, Hook, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A descriptor and the body that runs it
#[derive(Clone)]
pub struct RegisteredHook {
    /// Static metadata
    pub descriptor: Arc<HookDescriptor>,
    /// Executable body
    pub body: Arc<dyn Hook>,
}

impl RegisteredHook {
    /// Hook name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for RegisteredHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHook")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Validated set of hooks
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: IndexMap<String, RegisteredHook>,
    /// Transitive dependent count per hook
    dependents: HashMap<String, usize>,
    /// Fingerprint of the source the hooks were loaded from
    fingerprint: Option<Vec<u8>>,
}

impl HookRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// Look up a hook by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredHook> {
        self.hooks.get(name)
    }

    /// Number of hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredHook> {
        self.hooks.values()
    }

    /// Position of a hook in registration order
    #[must_use]
    pub fn registration_index(&self, name: &str) -> Option<usize> {
        self.hooks.get_index_of(name)
    }

    /// Names of the hooks bound to a trigger, in registration order
    #[must_use]
    pub fn hooks_for_trigger(&self, trigger: &str) -> Vec<String> {
        self.hooks
            .values()
            .filter(|h| h.descriptor.is_bound_to(trigger))
            .map(|h| h.descriptor.name.clone())
            .collect()
    }

    /// Number of hooks that transitively depend on `name`
    #[must_use]
    pub fn dependents_count(&self, name: &str) -> usize {
        self.dependents.get(name).copied().unwrap_or(0)
    }

    /// Dependent count normalized by the number of other hooks
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn dependency_depth_signal(&self, name: &str) -> f64 {
        let others = self.hooks.len().saturating_sub(1);
        if others == 0 {
            return 0.0;
        }
        (self.dependents_count(name) as f64 / others as f64).clamp(0.0, 1.0)
    }

    /// Fingerprint of the hook source, if loaded from disk
    #[must_use]
    pub fn fingerprint(&self) -> Option<&[u8]> {
        self.fingerprint.as_deref()
    }
}

/// Collects hooks and validates them as a whole
#[derive(Default)]
pub struct HookRegistryBuilder {
    hooks: Vec<RegisteredHook>,
    fingerprint: Option<Vec<u8>>,
}

impl HookRegistryBuilder {
    /// Add a hook with a shared body
    #[must_use]
    pub fn register(mut self, descriptor: HookDescriptor, body: Arc<dyn Hook>) -> Self {
        self.hooks.push(RegisteredHook {
            descriptor: Arc::new(descriptor),
            body,
        });
        self
    }

    /// Add a hook, taking ownership of the body
    #[must_use]
    pub fn hook<H: Hook + 'static>(self, descriptor: HookDescriptor, body: H) -> Self {
        self.register(descriptor, Arc::new(body))
    }

    /// Record the fingerprint of the hook source
    #[must_use]
    pub fn fingerprint(mut self, fingerprint: Vec<u8>) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Fails on invalid descriptors, duplicate names or dependency cycles.
    pub fn build(self) -> Result<HookRegistry> {
        let mut hooks: IndexMap<String, RegisteredHook> = IndexMap::with_capacity(self.hooks.len());
        for hook in self.hooks {
            hook.descriptor.validate()?;
            let name = hook.descriptor.name.clone();
            if hooks.contains_key(&name) {
                return Err(Error::DuplicateHook(name));
            }
            hooks.insert(name, hook);
        }

        let deps = dependency_map(&hooks);
        let names: Vec<&str> = hooks.keys().map(String::as_str).collect();
        if let Some(cycle) = graph::find_cycle(&names, &deps) {
            return Err(Error::DependencyCycle { cycle });
        }

        let reversed = graph::reverse(&deps);
        let dependents = names
            .iter()
            .map(|&name| (name.to_string(), graph::reachable(name, &reversed).len()))
            .collect();

        tracing::debug!(hook_count = hooks.len(), "Hook registry built");

        Ok(HookRegistry {
            hooks,
            dependents,
            fingerprint: self.fingerprint,
        })
    }
}

/// Resolve name and capability dependencies into hook-to-hook edges
fn dependency_map(hooks: &IndexMap<String, RegisteredHook>) -> DependencyMap<'_> {
    let mut deps: DependencyMap<'_> = HashMap::with_capacity(hooks.len());

    for hook in hooks.values() {
        let descriptor = &hook.descriptor;
        let mut targets = Vec::new();
        for dependency in &descriptor.depends_on {
            let providers: Vec<&str> = hooks
                .values()
                .filter(|other| other.descriptor.name != descriptor.name)
                .filter(|other| other.descriptor.satisfies(dependency))
                .map(|other| other.descriptor.name.as_str())
                .collect();

            if providers.is_empty() {
                tracing::warn!(
                    hook = %descriptor.name,
                    dependency = %dependency,
                    "Dependency is not provided by any registered hook"
                );
            }
            targets.extend(providers);
        }
        deps.insert(descriptor.name.as_str(), targets);
    }

    deps
}
