//! Storage Backends
//!
//! The flat key/value contract every store implements, plus the stores that
//! ship with the crate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      Cache facade (namespacing, TTL)                  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                          Backend contract                             │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌─────────┐  ┌─────────┐  │
//! │  │ Memory   │  │ File     │  │ Dummy    │  │ Multi   │  │ Logging │  │
//! │  │ (DashMap)│  │ (JSON+LZ4│  │ (no-op)  │  │ (tiers) │  │ (decor.)│  │
//! │  └──────────┘  └──────────┘  └──────────┘  └─────────┘  └─────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Absence is always `None`. A stored `false`, `null`, `0` or `""` is a
//! present value.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::Result;

mod dummy;
mod file;
mod logging;
mod memory;
mod multi;

pub use dummy::DummyBackend;
pub use file::{FileBackend, FileOptions};
pub use logging::{LoggingBackend, LoggingStats};
pub use memory::MemoryBackend;
pub use multi::MultiBackend;

/// Ordered id -> value mapping used by multi-set operations
pub type Items = IndexMap<String, Value>;

/// Result of one command recorded in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineReply {
    /// Outcome of a `set` command
    Stored(bool),
    /// Outcome of a `get` command
    Value(Option<Value>),
}

impl PipelineReply {
    /// Fetched value, if this is a successful `get` reply
    pub fn value(&self) -> Option<&Value> {
        match self {
            PipelineReply::Value(value) => value.as_ref(),
            PipelineReply::Stored(_) => None,
        }
    }

    /// Whether this is a successful `set` reply
    pub fn is_stored(&self) -> bool {
        matches!(self, PipelineReply::Stored(true))
    }
}

/// Command recording API shared by the generic pipeline and native ones
pub trait CommandPipeline {
    /// Record a GET command
    fn get(&mut self, id: &str);

    /// Record a SET command
    fn set(&mut self, id: &str, value: Value);

    /// TTL applied to every SET command of the batch
    fn ttl(&mut self, ttl: Option<Duration>);

    /// Number of recorded, not yet executed, commands
    fn len(&self) -> usize;

    /// True when no command is recorded
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the recorded commands and clear the queue.
    ///
    /// Replies are returned in command issuance order.
    fn execute(&mut self) -> Result<Vec<PipelineReply>>;
}

/// Key/value store capability
pub trait Backend: Send + Sync {
    /// Check if the id exists
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Retrieve the value stored under id, `None` when unknown or expired
    fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Retrieve multiple values, aligned with `ids`
    fn get_multi(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Store value only if id does not exist already
    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        if self.exists(id)? {
            return Ok(false);
        }
        self.set(id, value, ttl)
    }

    /// Store value, overwriting any existing one
    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool>;

    /// Store multiple values at once
    fn set_multi(&self, items: Items, ttl: Option<Duration>) -> Result<bool> {
        let mut success = true;
        for (id, value) in items {
            success &= self.set(&id, value, ttl)?;
        }
        Ok(success)
    }

    /// Delete an id
    fn delete(&self, id: &str) -> Result<bool>;

    /// Delete everything
    fn flush_all(&self) -> Result<bool>;

    /// Whether this backend provides its own pipeline
    fn supports_pipelines(&self) -> bool {
        false
    }

    /// Create a native pipeline, `None` when unsupported
    fn create_pipeline(&self) -> Option<Box<dyn CommandPipeline + '_>> {
        None
    }
}

impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    fn exists(&self, id: &str) -> Result<bool> {
        (**self).exists(id)
    }

    fn get(&self, id: &str) -> Result<Option<Value>> {
        (**self).get(id)
    }

    fn get_multi(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
        (**self).get_multi(ids)
    }

    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        (**self).add(id, value, ttl)
    }

    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        (**self).set(id, value, ttl)
    }

    fn set_multi(&self, items: Items, ttl: Option<Duration>) -> Result<bool> {
        (**self).set_multi(items, ttl)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        (**self).delete(id)
    }

    fn flush_all(&self) -> Result<bool> {
        (**self).flush_all()
    }

    fn supports_pipelines(&self) -> bool {
        (**self).supports_pipelines()
    }

    fn create_pipeline(&self) -> Option<Box<dyn CommandPipeline + '_>> {
        (**self).create_pipeline()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    /// Backend implementing only the required methods
    #[derive(Default)]
    struct MinimalBackend {
        data: Mutex<HashMap<String, Value>>,
    }

    impl Backend for MinimalBackend {
        fn get(&self, id: &str) -> Result<Option<Value>> {
            Ok(self.data.lock().get(id).cloned())
        }

        fn set(&self, id: &str, value: Value, _ttl: Option<Duration>) -> Result<bool> {
            self.data.lock().insert(id.to_string(), value);
            Ok(true)
        }

        fn delete(&self, id: &str) -> Result<bool> {
            Ok(self.data.lock().remove(id).is_some())
        }

        fn flush_all(&self) -> Result<bool> {
            self.data.lock().clear();
            Ok(true)
        }
    }

    #[test]
    fn test_default_exists_sees_falsy_values() {
        let backend = MinimalBackend::default();
        assert!(!backend.exists("foo").unwrap());

        backend.set("foo", json!(false), None).unwrap();
        assert!(backend.exists("foo").unwrap());
        assert_eq!(backend.get("foo").unwrap(), Some(json!(false)));
    }

    #[test]
    fn test_default_add_does_not_overwrite() {
        let backend = MinimalBackend::default();
        assert!(backend.add("foo", json!("bar"), None).unwrap());
        assert!(!backend.add("foo", json!("baz"), None).unwrap());
        assert_eq!(backend.get("foo").unwrap(), Some(json!("bar")));
    }

    #[test]
    fn test_default_multi_operations_keep_order() {
        let backend = MinimalBackend::default();
        let mut items = Items::new();
        items.insert("a".to_string(), json!(1));
        items.insert("b".to_string(), json!(2));
        assert!(backend.set_multi(items, None).unwrap());

        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let values = backend.get_multi(&ids).unwrap();
        assert_eq!(values, vec![Some(json!(2)), None, Some(json!(1))]);
    }

    #[test]
    fn test_default_has_no_pipeline() {
        let backend = MinimalBackend::default();
        assert!(!backend.supports_pipelines());
        assert!(backend.create_pipeline().is_none());
    }

    #[test]
    fn test_pipeline_reply_accessors() {
        assert!(PipelineReply::Stored(true).is_stored());
        assert!(!PipelineReply::Stored(false).is_stored());
        assert_eq!(PipelineReply::Value(Some(json!(3))).value(), Some(&json!(3)));
        assert_eq!(PipelineReply::Value(None).value(), None);
    }
}
