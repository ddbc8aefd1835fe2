//! Stop planning
//!
//! Works out which loaded plugins have to be stopped before a target plugin
//! can be unloaded and replaced, and restarted once it is back.

use std::collections::{HashSet, VecDeque};

use hotswap_kernel::PluginDescriptor;
use hotswap_kernel::config::StopScope;

/// Loaded plugins that declare `target` directly, in registry order.
///
/// `target` itself is never part of the result.
pub fn affected_set(target: &str, loaded: &[PluginDescriptor]) -> Vec<PluginDescriptor> {
    loaded
        .iter()
        .filter(|p| p.id != target && p.requires(target))
        .cloned()
        .collect()
}

/// Loaded plugins that depend on `target` directly or through other
/// dependents, in breadth-first discovery order.
pub fn transitive_affected_set(target: &str, loaded: &[PluginDescriptor]) -> Vec<PluginDescriptor> {
    let mut seen: HashSet<&str> = HashSet::from([target]);
    let mut queue: VecDeque<&str> = VecDeque::from([target]);
    let mut affected = Vec::new();

    while let Some(id) = queue.pop_front() {
        for plugin in loaded.iter().filter(|p| p.requires(id)) {
            if seen.insert(plugin.id.as_str()) {
                queue.push_back(plugin.id.as_str());
                affected.push(plugin.clone());
            }
        }
    }

    affected
}

/// Applies the configured [`StopScope`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StopPlanner {
    scope: StopScope,
}

impl StopPlanner {
    pub fn new(scope: StopScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> StopScope {
        self.scope
    }

    /// The affected set for `target` among `loaded`.
    pub fn plan(&self, target: &str, loaded: &[PluginDescriptor]) -> Vec<PluginDescriptor> {
        match self.scope {
            StopScope::Direct => affected_set(target, loaded),
            StopScope::Transitive => transitive_affected_set(target, loaded),
        }
    }
}
