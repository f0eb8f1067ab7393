//! Logging Backend
//!
//! Decorates a backend to provide insight on its usage: every operation is
//! emitted as a tracing event and counted.
//!
//! Event messages look like `GET(users:42) = HIT` or `SET(users:42, ttl=60)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::Level;

use super::{Backend, CommandPipeline, Items};
use crate::error::Result;

/// Operation counters
#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,
}

/// Snapshot of the operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingStats {
    /// Lookups (exists, get, each id of a multi-get)
    pub reads: u64,
    /// Lookups that found a value
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Stored ids (add, set, each id of a multi-set)
    pub writes: u64,
    /// Delete calls
    pub deletes: u64,
    /// Flush calls
    pub flushes: u64,
}

impl LoggingStats {
    /// Hit ratio (0.0 - 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = (self.hits + self.misses) as f64;
        if total == 0.0 {
            0.0
        } else {
            self.hits as f64 / total
        }
    }
}

/// Backend decorator logging every operation
pub struct LoggingBackend {
    backend: Arc<dyn Backend>,
    level: Level,
    counters: Counters,
}

impl LoggingBackend {
    /// Wrap `backend`, logging at DEBUG
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_level(backend, Level::DEBUG)
    }

    /// Wrap `backend`, logging at `level`
    pub fn with_level(backend: Arc<dyn Backend>, level: Level) -> Self {
        Self {
            backend,
            level,
            counters: Counters::default(),
        }
    }

    /// Wrapped backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Level events are emitted at
    pub fn level(&self) -> Level {
        self.level
    }

    /// Change the level events are emitted at
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    /// Current counters
    pub fn stats(&self) -> LoggingStats {
        LoggingStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
        }
    }

    fn record_lookup(&self, hit: bool) {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn log(&self, operation: &str, ids: Option<&str>, ttl: Option<Duration>, hit: Option<bool>) {
        let message = format_operation(operation, ids, ttl, hit);
        match self.level {
            Level::TRACE => tracing::trace!(target: "cachecache::backend", "{}", message),
            Level::DEBUG => tracing::debug!(target: "cachecache::backend", "{}", message),
            Level::INFO => tracing::info!(target: "cachecache::backend", "{}", message),
            Level::WARN => tracing::warn!(target: "cachecache::backend", "{}", message),
            Level::ERROR => tracing::error!(target: "cachecache::backend", "{}", message),
        }
    }
}

/// Render `OP(ids[, ttl=N])[ = HIT|MISS]`
fn format_operation(
    operation: &str,
    ids: Option<&str>,
    ttl: Option<Duration>,
    hit: Option<bool>,
) -> String {
    let mut message = operation.to_uppercase();
    match (ids, ttl) {
        (Some(ids), Some(ttl)) => message.push_str(&format!("({}, ttl={})", ids, ttl.as_secs())),
        (Some(ids), None) => message.push_str(&format!("({})", ids)),
        _ => {}
    }
    if let Some(hit) = hit {
        message.push_str(if hit { " = HIT" } else { " = MISS" });
    }
    message
}

impl std::fmt::Debug for LoggingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingBackend")
            .field("level", &self.level)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Backend for LoggingBackend {
    fn exists(&self, id: &str) -> Result<bool> {
        let exists = self.backend.exists(id)?;
        self.record_lookup(exists);
        self.log("exists", Some(id), None, Some(exists));
        Ok(exists)
    }

    fn get(&self, id: &str) -> Result<Option<Value>> {
        let value = self.backend.get(id)?;
        self.record_lookup(value.is_some());
        self.log("get", Some(id), None, Some(value.is_some()));
        Ok(value)
    }

    fn get_multi(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
        let values = self.backend.get_multi(ids)?;
        for value in &values {
            self.record_lookup(value.is_some());
        }
        let all_hit = values.iter().all(Option::is_some);
        self.log("getMulti", Some(&ids.join(", ")), None, Some(all_hit));
        Ok(values)
    }

    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let success = self.backend.add(id, value, ttl)?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.log("add", Some(id), ttl, None);
        Ok(success)
    }

    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let success = self.backend.set(id, value, ttl)?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.log("set", Some(id), ttl, None);
        Ok(success)
    }

    fn set_multi(&self, items: Items, ttl: Option<Duration>) -> Result<bool> {
        let ids: Vec<String> = items.keys().cloned().collect();
        let success = self.backend.set_multi(items, ttl)?;
        self.counters
            .writes
            .fetch_add(ids.len() as u64, Ordering::Relaxed);
        self.log("setMulti", Some(&ids.join(", ")), ttl, None);
        Ok(success)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let success = self.backend.delete(id)?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.log("delete", Some(id), None, None);
        Ok(success)
    }

    fn flush_all(&self) -> Result<bool> {
        let success = self.backend.flush_all()?;
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        self.log("flushAll", None, None, None);
        Ok(success)
    }

    fn supports_pipelines(&self) -> bool {
        self.backend.supports_pipelines()
    }

    fn create_pipeline(&self) -> Option<Box<dyn CommandPipeline + '_>> {
        self.backend.create_pipeline()
    }
}

// =============================================================================
// Tests
// =============================================================================
