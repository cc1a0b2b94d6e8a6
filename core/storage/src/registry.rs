//! Backend registry for resolving the local store from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use lantern_common::{Error, Result};

use crate::cache::CacheStore;
use crate::memory::MemoryStore;
use crate::queue::QueueStore;
use crate::sqlite::SqliteStore;

/// The process-wide local store: one backend serving both partitions.
#[derive(Clone)]
pub struct LocalStore {
    backend: String,
    pub cache: Arc<dyn CacheStore>,
    pub queue: Arc<dyn QueueStore>,
}

impl LocalStore {
    /// Share one backend instance between the cache and the queue.
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: CacheStore + QueueStore + 'static,
    {
        Self {
            backend: store.name().to_string(),
            cache: store.clone(),
            queue: store,
        }
    }

    /// A fresh in-memory store.
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    /// Name of the backend in use.
    pub fn backend(&self) -> &str {
        &self.backend
    }
}

/// Factory function type for creating stores.
pub type StoreFactory = Box<dyn Fn(Value) -> Result<LocalStore> + Send + Sync>;

/// Registry for local store factories.
///
/// Allows dynamic registration and resolution of backends by name and
/// configuration.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a store factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StoreFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Store backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a store by backend name and configuration.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid for the backend
    pub fn resolve(&self, name: &str, config: Value) -> Result<LocalStore> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Store backend '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered backend names.
    pub fn backends(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::new();

    registry
        .register("memory", Box::new(|_config: Value| Ok(LocalStore::memory())))
        .expect("Failed to register memory backend");

    registry
        .register(
            "sqlite",
            Box::new(|config: Value| {
                let path = config.get("path").and_then(Value::as_str).ok_or_else(|| {
                    Error::Config("sqlite backend requires a 'path'".to_string())
                })?;
                Ok(LocalStore::from_backend(Arc::new(SqliteStore::open(path)?)))
            }),
        )
        .expect("Failed to register sqlite backend");

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_default_backends() {
        let registry = create_default_registry();
        let mut backends = registry.backends();
        backends.sort();
        assert_eq!(backends, vec!["memory".to_string(), "sqlite".to_string()]);
    }

    #[test]
    fn test_resolve_memory() {
        let registry = create_default_registry();
        let store = registry.resolve("memory", Value::Null).unwrap();
        assert_eq!(store.backend(), "memory");
        assert_eq!(store.cache.name(), "memory");
    }

    #[test]
    fn test_resolve_sqlite_requires_path() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.resolve("sqlite", json!({})),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_resolve_sqlite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        let registry = create_default_registry();

        let store = registry
            .resolve("sqlite", json!({ "path": path.to_str().unwrap() }))
            .unwrap();

        assert_eq!(store.backend(), "sqlite");
        assert!(path.exists());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = StoreRegistry::new();
        registry
            .register("test", Box::new(|_| Ok(LocalStore::memory())))
            .unwrap();
        let result = registry.register("test", Box::new(|_| Ok(LocalStore::memory())));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = StoreRegistry::new();
        assert!(registry.resolve("indexeddb", Value::Null).is_err());
    }
}
