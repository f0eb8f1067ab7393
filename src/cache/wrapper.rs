//! Object-call Memoizer
//!
//! Memoizes every method of a wrapped object. The key of a call covers the
//! method name, its arguments and a JSON snapshot of the object, so mutating
//! the object invalidates what was memoized for it.
//!
//! Field access goes through `Deref`/`DerefMut` and is never memoized.

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::facade::Cache;
use super::keys;
use crate::backend::Backend;
use crate::error::{Error, Result};

/// Method name of the string conversion form
pub const TO_STRING: &str = "to_string";

/// Method name of the call-invocation form
pub const INVOKE: &str = "invoke";

/// Object whose methods can be dispatched by name
pub trait Invokable: Serialize {
    /// Run `method` with `args`.
    ///
    /// Unsupported methods should fail with [`unknown_method`].
    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value>;
}

/// Error for a method the object does not provide
pub fn unknown_method(method: &str) -> Error {
    Error::Invocation {
        method: method.to_string(),
        reason: "unknown method".to_string(),
    }
}

/// Wrapped object with memoized method calls
#[derive(Debug)]
pub struct ObjectWrapper<T> {
    object: T,
    cache: Cache,
}

impl<T: Invokable> ObjectWrapper<T> {
    pub(super) fn new(object: T, cache: Cache) -> Self {
        Self { object, cache }
    }

    /// Memoized call of `method`
    pub fn call(&mut self, method: &str, args: &[Value]) -> Result<Value> {
        let state = serde_json::to_value(&self.object)?;
        let key = keys::method_key(method, args, &state)?;
        if let Some(cached) = self.cache.get(&key)? {
            debug!("Memoized {}::{} hit", self.cache.namespace(), method);
            return Ok(cached);
        }

        let result = self.object.invoke(method, args)?;
        self.cache.add(&key, result.clone(), None)?;
        Ok(result)
    }

    /// Memoized string conversion
    pub fn to_string_cached(&mut self) -> Result<String> {
        match self.call(TO_STRING, &[])? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }

    /// Memoized call-invocation form
    pub fn invoke_cached(&mut self, args: &[Value]) -> Result<Value> {
        self.call(INVOKE, args)
    }

    /// Cache holding the memoized calls
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Unwrap the object
    pub fn into_inner(self) -> T {
        self.object
    }
}

impl<T> Deref for ObjectWrapper<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> DerefMut for ObjectWrapper<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

// =============================================================================
// Tests
// =============================================================================
