//! Custom-variable plugin host contract
//!
//! The reference design `dlopen`s a shared library exposing a fixed symbol
//! set (`alloc_handle`, `revalidate_handle`, `next_value`, `free_handle`,
//! plus module lifecycle hooks) and calls through it once per variable read.
//! This crate models only the host side of that contract as a trait,
//! [`CustomVarPlugin`], and an in-process registry that a workload resolves
//! variables against by name; dynamic loading is out of scope (§6), but a
//! statically-linked implementation of the trait behaves identically from
//! the workload's point of view — which is how the test suite exercises it.

use crate::error::FlowError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One custom-variable source. `next_value` stands in for the reference
/// design's `next_value(handle, &f64)` call; `revalidate` stands in for
/// `revalidate_handle`, used when a plugin's backing state (e.g. a live
/// counter file) might have gone stale between reads.
pub trait CustomVarPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_value(&self) -> Result<f64, FlowError>;

    /// Default no-op: most plugins have nothing to revalidate.
    fn revalidate(&self) -> Result<(), FlowError> {
        Ok(())
    }
}

/// In-process registry of custom-variable plugins, looked up by the name a
/// workload binds a variable to (`iosize=$cvar:mydist`, conceptually).
#[derive(Default)]
pub struct CustomVarRegistry {
    plugins: Mutex<HashMap<String, Arc<dyn CustomVarPlugin>>>,
}

impl CustomVarRegistry {
    pub fn new() -> Self {
        Self { plugins: Mutex::new(HashMap::new()) }
    }

    /// Register `plugin` under its own `name()`, replacing any prior
    /// registration with the same name.
    pub fn register(&self, plugin: Arc<dyn CustomVarPlugin>) {
        let mut guard = self.plugins.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomVarPlugin>> {
        self.plugins.lock().unwrap_or_else(|p| p.into_inner()).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.lock().unwrap_or_else(|p| p.into_inner()).contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CounterVar {
        name: String,
        counter: AtomicU64,
    }

    impl CustomVarPlugin for CounterVar {
        fn name(&self) -> &str {
            &self.name
        }
        fn next_value(&self) -> Result<f64, FlowError> {
            Ok(self.counter.fetch_add(1, Ordering::Relaxed) as f64)
        }
    }

    #[test]
    fn registered_plugin_is_resolvable_by_name() {
        let registry = CustomVarRegistry::new();
        registry.register(Arc::new(CounterVar { name: "seq".into(), counter: AtomicU64::new(0) }));
        assert!(registry.contains("seq"));
        let plugin = registry.get("seq").unwrap();
        assert_eq!(plugin.next_value().unwrap(), 0.0);
        assert_eq!(plugin.next_value().unwrap(), 1.0);
        assert!(registry.get("missing").is_none());
    }
}
