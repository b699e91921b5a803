use crate::component::Component;
use crate::ComponentError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe store of components: concurrent reads, exclusive writes.
///
/// Constructed explicitly and injected where needed — there is no global
/// default instance. `list` has no defined order; callers needing stable
/// output sort at the boundary.
#[derive(Default)]
pub struct Registry {
    components: RwLock<HashMap<String, Arc<dyn Component>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .components
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("Registry").field("components", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a component under its name. Fails if the name already exists;
    /// the existing entry is left untouched.
    pub fn register(&self, component: Arc<dyn Component>) -> Result<(), ComponentError> {
        let name = component.name().to_owned();
        let mut map = self
            .components
            .write()
            .map_err(|_| ComponentError::LockPoisoned)?;
        if map.contains_key(&name) {
            return Err(ComponentError::AlreadyRegistered(name));
        }
        map.insert(name, component);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.read().ok()?.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.components
            .read()
            .map(|map| map.contains_key(name))
            .unwrap_or(false)
    }

    /// Registered names, in no defined order.
    pub fn list(&self) -> Vec<String> {
        self.components
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a component; returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.components
            .write()
            .map(|mut map| map.remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.components.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
