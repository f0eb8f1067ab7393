//! Configuration
//!
//! YAML model of the caches a [`CacheManager`](crate::manager::CacheManager)
//! builds.
//!
//! ```yaml
//! logging:
//!   level: debug
//! caches:
//!   default:
//!     backend: { type: memory }
//!     ttl: 300
//!     variation: 30
//!   pages:
//!     namespace: pages
//!     backend:
//!       type: multi
//!       backends:
//!         - { type: memory }
//!         - { type: file, dir: /var/cache/app, compress: true }
//! ```

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::backend::{Backend, DummyBackend, FileBackend, FileOptions, MemoryBackend, MultiBackend};
use crate::cache::{CacheSettings, DEFAULT_SEPARATOR};
use crate::error::{Error, Result};

/// Backend to construct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSpec {
    /// [`MemoryBackend`]
    Memory,
    /// [`DummyBackend`]
    Dummy,
    /// [`FileBackend`]
    File(FileOptions),
    /// [`MultiBackend`] over the listed backends, first one read first
    Multi {
        /// Composed backends
        backends: Vec<BackendSpec>,
    },
}

impl BackendSpec {
    /// Construct the backend
    pub fn build(&self) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self {
            BackendSpec::Memory => Arc::new(MemoryBackend::new()),
            BackendSpec::Dummy => Arc::new(DummyBackend),
            BackendSpec::File(options) => Arc::new(FileBackend::new(options.clone())?),
            BackendSpec::Multi { backends } => {
                if backends.is_empty() {
                    return Err(Error::Config(
                        "multi backend needs at least one backend".to_string(),
                    ));
                }
                let backends = backends
                    .iter()
                    .map(BackendSpec::build)
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(MultiBackend::new(backends))
            }
        };
        Ok(backend)
    }
}

/// Options of one cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Backend to construct, required
    pub backend: Option<BackendSpec>,
    /// Namespace prefix
    pub namespace: String,
    /// Default TTL in seconds, none for no expiration
    pub ttl: Option<u64>,
    /// TTL variation bound in seconds
    pub variation: u64,
    /// Namespace separator, `":"` when unset
    pub separator: Option<String>,
}

impl CacheOptions {
    /// Options for `backend`, other settings default
    pub fn with_backend(backend: BackendSpec) -> Self {
        Self {
            backend: Some(backend),
            ..Default::default()
        }
    }

    /// Backend spec, failing when none is configured
    pub fn backend_spec(&self) -> Result<&BackendSpec> {
        self.backend
            .as_ref()
            .ok_or_else(|| Error::Config("no backend specified in cache options".to_string()))
    }

    /// Facade settings
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            namespace: self.namespace.clone(),
            default_ttl: self.ttl.map(Duration::from_secs),
            ttl_variation: Duration::from_secs(self.variation),
            separator: self
                .separator
                .clone()
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        }
    }
}

/// Backend operation logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Level of the operation events: trace, debug, info, warn or error
    pub level: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

impl LoggingOptions {
    /// Parsed level
    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.level)
            .map_err(|_| Error::Config(format!("invalid log level '{}'", self.level)))
    }
}

/// Manager configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Wrap every backend in a logging decorator when set
    pub logging: Option<LoggingOptions>,
    /// Caches by name
    pub caches: IndexMap<String, CacheOptions>,
}

impl ManagerConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Check every cache has a backend and the log level parses
    pub fn validate(&self) -> Result<()> {
        if let Some(logging) = &self.logging {
            logging.level()?;
        }
        for (name, options) in &self.caches {
            options
                .backend_spec()
                .map_err(|e| Error::Config(format!("cache '{}': {}", name, e)))?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
