//! CacheCache - Caching Facade over Pluggable Backends
//!
//! Turns a flat key/value store into namespaced, TTL-aware, batchable caching
//! operations: load/save and output capture stacks, memoized function and
//! method calls, and pipelines that group commands into multi-key calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          CacheManager                            │
//! │                 (named caches from YAML config)                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Cache     │───▶│   Pipeline   │───▶│   Backend    │       │
//! │  │  (facade)    │    │  (batching)  │    │  (storage)   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`backend`] - Backend contract and the bundled stores
//! - [`cache`] - Cache facade, pipelines, output capture, memoization
//! - [`config`] - YAML configuration model
//! - [`error`] - Error types
//! - [`manager`] - Named cache registry
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cachecache::{Backend, Cache, MemoryBackend};
//! use serde_json::json;
//!
//! let cache = Cache::new(Arc::new(MemoryBackend::new()));
//! let users = cache.ns("users", Some(Duration::from_secs(60)));
//! users.set("42", json!({"name": "ann"}), None).unwrap();
//! assert!(cache.exists("users:42").unwrap());
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod manager;

pub use backend::{
    Backend, CommandPipeline, DummyBackend, FileBackend, FileOptions, Items, LoggingBackend,
    MemoryBackend, MultiBackend, PipelineReply,
};
pub use cache::{Cache, CacheSettings, Invokable, ObjectWrapper, Output, ValueOrProducer};
pub use config::{BackendSpec, CacheOptions, ManagerConfig};
pub use error::{Error, Result};
pub use manager::{CacheManager, DEFAULT_CACHE};
