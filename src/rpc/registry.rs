//! Method registry.
//!
//! Entries live in a slab so removal never shifts the others; a name index
//! gives O(1) exact-match lookup. Names are unique within a registry.
//! Iteration follows registration order, even after freed slots are reused.

use super::method::MethodEntry;
use serde_json::{Map, Value};
use slab::Slab;
use std::collections::HashMap;
use thiserror::Error;

/// Errors returned when registering a method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("method name must not be empty")]
    EmptyName,
    #[error("method '{0}' is already registered")]
    Duplicate(String),
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Slab<MethodEntry>,
    index: HashMap<String, usize>,
    /// Slab keys in registration order.
    order: Vec<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Empty and already-registered names are rejected.
    pub fn insert(&mut self, entry: MethodEntry) -> Result<(), RegistryError> {
        if entry.name().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(entry.name()) {
            return Err(RegistryError::Duplicate(entry.name().to_string()));
        }

        let name = entry.name().to_string();
        let key = self.entries.insert(entry);
        self.index.insert(name, key);
        self.order.push(key);
        Ok(())
    }

    /// Remove the entry named `name`. Built-in entries are never removed.
    pub fn remove(&mut self, name: &str) -> Option<MethodEntry> {
        let key = *self.index.get(name)?;
        if self.entries[key].is_builtin() {
            return None;
        }
        self.index.remove(name);
        self.order.retain(|&k| k != key);
        self.entries.try_remove(key)
    }

    /// Look up an entry by exact name.
    pub fn get(&self, name: &str) -> Option<&MethodEntry> {
        self.index.get(name).and_then(|&key| self.entries.get(key))
    }

    /// Check if a method is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Map every user-registered method name to its description.
    pub fn describe(&self) -> Value {
        let methods: Map<String, Value> = self
            .iter()
            .filter(|entry| !entry.is_builtin())
            .map(|entry| (entry.name().to_string(), entry.description().clone()))
            .collect();
        Value::Object(methods)
    }

    /// Iterate over entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodEntry> {
        self.order.iter().filter_map(|&key| self.entries.get(key))
    }

    /// Number of registered entries, built-ins included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::method::{Reply, Target};
    use serde_json::json;

    fn entry(name: &str) -> MethodEntry {
        MethodEntry::new(
            name.to_string(),
            json!(format!("{name} method")),
            Target::Custom(Box::new(|_: &Value| Reply::notification())),
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = Registry::new();
        registry.insert(entry("print")).unwrap();
        registry.insert(entry("notify")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("print").unwrap().name(), "print");
        assert!(registry.get("Print").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn test_reject_empty_and_duplicate() {
        let mut registry = Registry::new();
        assert_eq!(registry.insert(entry("")), Err(RegistryError::EmptyName));

        registry.insert(entry("print")).unwrap();
        assert_eq!(
            registry.insert(entry("print")),
            Err(RegistryError::Duplicate("print".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::new();
        registry.insert(entry("a")).unwrap();
        registry.insert(entry("b")).unwrap();

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.remove("missing").is_none());
        assert!(registry.contains("b"));

        // The freed slot is reused without disturbing the index
        registry.insert(entry("c")).unwrap();
        assert_eq!(registry.get("b").unwrap().name(), "b");
        assert_eq!(registry.get("c").unwrap().name(), "c");
    }

    #[test]
    fn test_reused_slot_keeps_registration_order() {
        let mut registry = Registry::new();
        registry.insert(entry("a")).unwrap();
        registry.insert(entry("b")).unwrap();
        registry.remove("a").unwrap();
        registry.insert(entry("c")).unwrap();

        let names: Vec<&str> = registry.iter().map(MethodEntry::name).collect();
        assert_eq!(names, ["b", "c"]);

        let described = registry.describe();
        let keys: Vec<&String> = described.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["b", "c"]);
    }

    #[test]
    fn test_builtin_not_removable() {
        let mut registry = Registry::new();
        registry
            .insert(MethodEntry::new(
                "system.describe".to_string(),
                Value::Null,
                Target::Describe,
            ))
            .unwrap();

        assert!(registry.remove("system.describe").is_none());
        assert!(registry.contains("system.describe"));
    }

    #[test]
    fn test_describe() {
        let mut registry = Registry::new();
        registry
            .insert(MethodEntry::new(
                "system.describe".to_string(),
                Value::Null,
                Target::Describe,
            ))
            .unwrap();
        registry.insert(entry("print")).unwrap();

        assert_eq!(registry.describe(), json!({"print": "print method"}));
    }
}
