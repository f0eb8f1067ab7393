//! Generic Pipeline
//!
//! Batches get/set commands for backends without native pipelining.
//!
//! Contiguous commands of the same kind form a group, and each group costs
//! one backend call:
//!
//! ```text
//!   set a  set b │ get a │ set a │ get a
//!   ─────────────┼───────┼───────┼──────
//!    set_multi   │ get_  │ set_  │ get_
//!   {a, b}       │ multi │ multi │ multi
//! ```
//!
//! # Known limitations
//!
//! - There is one reply per SET command, not one per distinct key, so
//!   replies line up with the commands issued. A group setting the same key
//!   twice still yields two replies.
//! - `set_multi` reports one aggregate flag, broadcast to every SET of the
//!   group.
//! - A key set twice in one group keeps the last value.
//! - One TTL per batch, no per-command override.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::facade::Cache;
use crate::backend::{Backend, CommandPipeline, Items, PipelineReply};
use crate::error::Result;

/// A recorded command
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Get(String),
    Set(String, Value),
}

/// Contiguous run of same-kind commands
#[derive(Debug)]
enum Group {
    Get(Vec<String>),
    /// Values plus the number of SET commands folded into them
    Set(Items, usize),
}

/// Group contiguous commands of the same kind, preserving order
fn group(commands: Vec<Command>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for command in commands {
        match command {
            Command::Get(id) => {
                if let Some(Group::Get(ids)) = groups.last_mut() {
                    ids.push(id);
                    continue;
                }
                groups.push(Group::Get(vec![id]));
            }
            Command::Set(id, value) => {
                if let Some(Group::Set(items, count)) = groups.last_mut() {
                    items.insert(id, value);
                    *count += 1;
                    continue;
                }
                let mut items = Items::new();
                items.insert(id, value);
                groups.push(Group::Set(items, 1));
            }
        }
    }
    groups
}

/// Pipeline executing through any backend's multi operations
pub struct Pipeline<'a> {
    backend: &'a dyn Backend,
    commands: Vec<Command>,
    ttl: Option<Duration>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline executing against `backend`
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            commands: Vec::new(),
            ttl: None,
        }
    }
}

impl CommandPipeline for Pipeline<'_> {
    fn get(&mut self, id: &str) {
        self.commands.push(Command::Get(id.to_string()));
    }

    fn set(&mut self, id: &str, value: Value) {
        self.commands.push(Command::Set(id.to_string(), value));
    }

    fn ttl(&mut self, ttl: Option<Duration>) {
        self.ttl = ttl;
    }

    fn len(&self) -> usize {
        self.commands.len()
    }

    fn execute(&mut self) -> Result<Vec<PipelineReply>> {
        let commands = std::mem::take(&mut self.commands);
        let total = commands.len();
        let groups = group(commands);
        debug!("Executing pipeline: {} commands in {} groups", total, groups.len());

        let mut replies = Vec::with_capacity(total);
        for group in groups {
            match group {
                Group::Set(items, count) => {
                    let stored = self.backend.set_multi(items, self.ttl)?;
                    replies.extend(std::iter::repeat(PipelineReply::Stored(stored)).take(count));
                }
                Group::Get(ids) => {
                    let values = self.backend.get_multi(&ids)?;
                    replies.extend(values.into_iter().map(PipelineReply::Value));
                }
            }
        }
        Ok(replies)
    }
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("commands", &self.commands)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Native backend pipeline seen through a cache's namespace and TTL policy
pub struct NamespacedPipeline<'a> {
    cache: &'a Cache,
    inner: Box<dyn CommandPipeline + 'a>,
    ttl: Option<Duration>,
}

impl<'a> NamespacedPipeline<'a> {
    /// Wrap a pipeline created by `cache`'s backend
    pub fn new(cache: &'a Cache, inner: Box<dyn CommandPipeline + 'a>) -> Self {
        Self {
            cache,
            inner,
            ttl: None,
        }
    }
}

impl CommandPipeline for NamespacedPipeline<'_> {
    fn get(&mut self, id: &str) {
        self.inner.get(&self.cache.id(id));
    }

    fn set(&mut self, id: &str, value: Value) {
        self.inner.set(&self.cache.id(id), value);
    }

    fn ttl(&mut self, ttl: Option<Duration>) {
        self.ttl = ttl;
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn execute(&mut self) -> Result<Vec<PipelineReply>> {
        self.inner.ttl(self.cache.compute_ttl(self.ttl));
        self.inner.execute()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records the backend calls a pipeline makes
    #[derive(Default)]
    struct RecordingBackend {
        inner: MemoryBackend,
        calls: Mutex<Vec<String>>,
        ttls: Mutex<Vec<Option<Duration>>>,
    }

    impl Backend for RecordingBackend {
        fn get(&self, id: &str) -> Result<Option<Value>> {
            self.calls.lock().push(format!("get {}", id));
            self.inner.get(id)
        }

        fn get_multi(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
            self.calls.lock().push(format!("get_multi {}", ids.join(",")));
            self.inner.get_multi(ids)
        }

        fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
            self.calls.lock().push(format!("set {}", id));
            self.inner.set(id, value, ttl)
        }

        fn set_multi(&self, items: Items, ttl: Option<Duration>) -> Result<bool> {
            let ids: Vec<String> = items.keys().cloned().collect();
            self.calls.lock().push(format!("set_multi {}", ids.join(",")));
            self.ttls.lock().push(ttl);
            for (id, value) in items {
                self.inner.set(&id, value, ttl)?;
            }
            Ok(true)
        }

        fn delete(&self, id: &str) -> Result<bool> {
            self.inner.delete(id)
        }

        fn flush_all(&self) -> Result<bool> {
            self.inner.flush_all()
        }
    }

    #[test]
    fn test_grouping_and_reply_order() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        pipe.set("a", json!("1"));
        pipe.set("b", json!("2"));
        pipe.get("a");
        pipe.set("a", json!("3"));
        pipe.get("a");

        let replies = pipe.execute().unwrap();
        assert_eq!(
            replies,
            vec![
                PipelineReply::Stored(true),
                PipelineReply::Stored(true),
                PipelineReply::Value(Some(json!("1"))),
                PipelineReply::Stored(true),
                PipelineReply::Value(Some(json!("3"))),
            ]
        );
        assert_eq!(
            *backend.calls.lock(),
            vec!["set_multi a,b", "get_multi a", "set_multi a", "get_multi a"]
        );
    }

    #[test]
    fn test_recording_does_not_execute() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        pipe.set("a", json!(1));
        pipe.get("a");
        assert_eq!(pipe.len(), 2);
        assert!(backend.calls.lock().is_empty());
    }

    #[test]
    fn test_queue_is_cleared_after_execute() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        pipe.set("a", json!(1));
        pipe.execute().unwrap();
        assert!(pipe.is_empty());

        pipe.get("a");
        let replies = pipe.execute().unwrap();
        assert_eq!(replies, vec![PipelineReply::Value(Some(json!(1)))]);
    }

    #[test]
    fn test_ttl_applies_to_every_set_group() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        pipe.ttl(Some(Duration::from_secs(5)));
        pipe.set("a", json!(1));
        pipe.get("a");
        pipe.set("b", json!(2));
        pipe.execute().unwrap();

        assert_eq!(
            *backend.ttls.lock(),
            vec![Some(Duration::from_secs(5)), Some(Duration::from_secs(5))]
        );
    }

    #[test]
    fn test_duplicate_key_in_group_keeps_last_value() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        pipe.set("a", json!(1));
        pipe.set("a", json!(2));
        pipe.get("a");

        let replies = pipe.execute().unwrap();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[2], PipelineReply::Value(Some(json!(2))));
        assert_eq!(backend.calls.lock()[0], "set_multi a");
    }

    #[test]
    fn test_missing_keys_reply_absent() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        pipe.get("nope");
        assert_eq!(pipe.execute().unwrap(), vec![PipelineReply::Value(None)]);
    }

    #[test]
    fn test_empty_pipeline() {
        let backend = RecordingBackend::default();
        let mut pipe = Pipeline::new(&backend);
        assert!(pipe.execute().unwrap().is_empty());
        assert!(backend.calls.lock().is_empty());
    }
}
