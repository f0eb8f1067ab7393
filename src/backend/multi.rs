//! Multi Backend
//!
//! Layers several backends: reads stop at the first backend holding the id,
//! writes fan out to every backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{Backend, Items};
use crate::error::Result;

/// Ordered composition of backends, fastest first
#[derive(Clone)]
pub struct MultiBackend {
    backends: Vec<Arc<dyn Backend>>,
}

impl MultiBackend {
    /// Compose `backends`, queried in the given order
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self { backends }
    }

    /// Composed backends
    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }
}

impl std::fmt::Debug for MultiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiBackend")
            .field("backends", &self.backends.len())
            .finish()
    }
}

impl Backend for MultiBackend {
    fn exists(&self, id: &str) -> Result<bool> {
        for backend in &self.backends {
            if backend.exists(id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self, id: &str) -> Result<Option<Value>> {
        for backend in &self.backends {
            if let Some(value) = backend.get(id)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn get_multi(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
        let mut values: Vec<Option<Value>> = vec![None; ids.len()];
        for backend in &self.backends {
            let missing: Vec<usize> = (0..ids.len()).filter(|&i| values[i].is_none()).collect();
            if missing.is_empty() {
                break;
            }
            let wanted: Vec<String> = missing.iter().map(|&i| ids[i].clone()).collect();
            for (i, value) in missing.into_iter().zip(backend.get_multi(&wanted)?) {
                values[i] = value;
            }
        }
        Ok(values)
    }

    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let mut success = true;
        for backend in &self.backends {
            success &= backend.add(id, value.clone(), ttl)?;
        }
        Ok(success)
    }

    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let mut success = true;
        for backend in &self.backends {
            success &= backend.set(id, value.clone(), ttl)?;
        }
        Ok(success)
    }

    fn set_multi(&self, items: Items, ttl: Option<Duration>) -> Result<bool> {
        let mut success = true;
        for backend in &self.backends {
            success &= backend.set_multi(items.clone(), ttl)?;
        }
        Ok(success)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut deleted = false;
        for backend in &self.backends {
            deleted |= backend.delete(id)?;
        }
        Ok(deleted)
    }

    fn flush_all(&self) -> Result<bool> {
        let mut success = true;
        for backend in &self.backends {
            success &= backend.flush_all()?;
        }
        Ok(success)
    }
}
