//! Dummy Backend
//!
//! Stores nothing. Used to disable caching without touching call sites.

use std::time::Duration;

use serde_json::Value;

use super::Backend;
use crate::error::Result;

/// Backend that never retains a value
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyBackend;

impl DummyBackend {
    /// Create a dummy backend
    pub fn new() -> Self {
        Self
    }
}

impl Backend for DummyBackend {
    fn get(&self, _id: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn set(&self, _id: &str, _value: Value, _ttl: Option<Duration>) -> Result<bool> {
        Ok(true)
    }

    fn delete(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }

    fn flush_all(&self) -> Result<bool> {
        Ok(true)
    }
}
