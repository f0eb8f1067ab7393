//! Cache Manager
//!
//! Registry of named caches built from configuration. The manager is an
//! ordinary value: create one, share it where needed, `reset()` it in tests.
//!
//! ```text
//! ManagerConfig ──setup()──▶ factory(options) ──▶ Cache ──▶ caches["name"]
//!                                 │
//!                                 └── LoggingBackend wrap when logging is set
//! ```

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use crate::backend::LoggingBackend;
use crate::cache::Cache;
use crate::config::{CacheOptions, ManagerConfig};
use crate::error::{Error, Result};

/// Name of the cache used when none is given
pub const DEFAULT_CACHE: &str = "default";

/// Registry of named caches
#[derive(Debug, Default)]
pub struct CacheManager {
    caches: RwLock<IndexMap<String, Arc<Cache>>>,
    /// Level of backend operation logs, none to disable
    log_level: RwLock<Option<Level>>,
}

impl CacheManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the caches of `config`
    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        let manager = Self::new();
        manager.setup(config)?;
        Ok(manager)
    }

    /// Register every cache of `config`, replacing same-named ones
    pub fn setup(&self, config: &ManagerConfig) -> Result<()> {
        config.validate()?;
        *self.log_level.write() = match &config.logging {
            Some(logging) => Some(logging.level()?),
            None => None,
        };

        for (name, options) in &config.caches {
            let cache = self.factory(options)?;
            self.set(name, cache);
        }
        info!("Cache manager ready with {} caches", self.caches.read().len());
        Ok(())
    }

    /// Build a cache from `options`
    pub fn factory(&self, options: &CacheOptions) -> Result<Cache> {
        let mut backend = options.backend_spec()?.build()?;
        if let Some(level) = *self.log_level.read() {
            backend = Arc::new(LoggingBackend::with_level(backend, level));
        }
        Ok(Cache::with_settings(backend, options.settings()))
    }

    /// Register `cache` under `name`
    pub fn set(&self, name: &str, cache: Cache) -> Arc<Cache> {
        let cache = Arc::new(cache);
        debug!("Registered cache '{}'", name);
        self.caches
            .write()
            .insert(name.to_string(), Arc::clone(&cache));
        cache
    }

    /// Cache registered under `name`
    pub fn get(&self, name: &str) -> Result<Arc<Cache>> {
        self.caches
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CacheNotFound(name.to_string()))
    }

    /// Cache registered under [`DEFAULT_CACHE`]
    pub fn default_cache(&self) -> Result<Arc<Cache>> {
        self.get(DEFAULT_CACHE)
    }

    /// Sub-namespace of the default cache
    pub fn ns(&self, namespace: &str, default_ttl: Option<Duration>) -> Result<Cache> {
        Ok(self.default_cache()?.ns(namespace, default_ttl))
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Level of backend operation logs
    pub fn log_level(&self) -> Option<Level> {
        *self.log_level.read()
    }

    /// Drop every cache and the logging setting
    pub fn reset(&self) {
        self.caches.write().clear();
        *self.log_level.write() = None;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::config::BackendSpec;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn config(yaml: &str) -> ManagerConfig {
        ManagerConfig::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_setup_registers_named_caches() {
        let manager = CacheManager::from_config(&config(
            "caches:\n  default: { backend: { type: memory } }\n  sessions: { backend: { type: dummy }, namespace: s }\n",
        ))
        .unwrap();

        assert_eq!(manager.names(), vec!["default", "sessions"]);
        assert_eq!(manager.get("sessions").unwrap().namespace(), "s");

        let cache = manager.default_cache().unwrap();
        cache.set("foo", json!("bar"), None).unwrap();
        assert_eq!(manager.default_cache().unwrap().get("foo").unwrap(), Some(json!("bar")));
    }

    #[test]
    fn test_unknown_cache() {
        let manager = CacheManager::new();
        assert_matches!(manager.get("nope"), Err(Error::CacheNotFound(name)) if name == "nope");
        assert_matches!(manager.ns("x", None), Err(Error::CacheNotFound(_)));
    }

    #[test]
    fn test_factory_applies_options() {
        let manager = CacheManager::new();
        let mut options = CacheOptions::with_backend(BackendSpec::Memory);
        options.namespace = "app".to_string();
        options.ttl = Some(60);

        let cache = manager.factory(&options).unwrap();
        assert_eq!(cache.namespace(), "app");
        assert_eq!(cache.default_ttl(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_factory_without_backend_fails() {
        let manager = CacheManager::new();
        assert_matches!(
            manager.factory(&CacheOptions::default()),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_ns_uses_default_cache() {
        let manager = CacheManager::new();
        let backend = Arc::new(MemoryBackend::new());
        manager.set(DEFAULT_CACHE, Cache::new(backend.clone()));

        let users = manager.ns("users", None).unwrap();
        users.set("1", json!("ann"), None).unwrap();
        assert_eq!(backend.get("users:1").unwrap(), Some(json!("ann")));
    }

    #[test]
    fn test_logging_wraps_backends() {
        let manager = CacheManager::from_config(&config(
            "logging: { level: trace }\ncaches:\n  default: { backend: { type: memory } }\n",
        ))
        .unwrap();
        assert_eq!(manager.log_level(), Some(Level::TRACE));
        let cache = manager.default_cache().unwrap();
        assert!(cache.set("foo", json!(1), None).unwrap());
        assert!(cache.exists("foo").unwrap());
    }

    #[test]
    fn test_reset() {
        let manager = CacheManager::new();
        manager.set("a", Cache::new(Arc::new(MemoryBackend::new())));
        manager.reset();
        assert!(manager.names().is_empty());
    }
}
