use serde_json::{Map, Value};
use std::collections::HashMap;

/// String-keyed configuration bag handed to component installs.
///
/// Untyped values exist only at this boundary (the user's config file);
/// components read them through typed accessors that return `None` on a
/// missing key or a type mismatch and never panic. This lets host-based and
/// cluster-native components share one interface without a common concrete
/// config type.
#[derive(Debug, Clone, Default)]
pub struct InstallConfig {
    values: HashMap<String, Value>,
}

impl InstallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Builder-style insert, mostly for tests and presets.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key)?.as_str().map(ToOwned::to_owned)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key)?.as_i64()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key)?.as_bool()
    }

    pub fn get_map(&self, key: &str) -> Option<Map<String, Value>> {
        self.values.get(key)?.as_object().cloned()
    }

    /// All-or-nothing: `None` if the key is absent, not an array, or any
    /// element is not a string.
    pub fn get_string_slice(&self, key: &str) -> Option<Vec<String>> {
        self.values
            .get(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(ToOwned::to_owned))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
