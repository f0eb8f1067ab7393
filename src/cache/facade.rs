//! Cache facade
//!
//! Namespacing, TTL computation, the load/save and start/end capture stack,
//! memoized calls and pipeline creation, all on top of a shared backend.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::capture::Output;
use super::keys;
use super::page::{PageCapture, PageGuard, RequestContext};
use super::pipeline::{NamespacedPipeline, Pipeline};
use super::ttl::{Jitter, TtlPolicy};
use super::wrapper::{Invokable, ObjectWrapper};
use super::DEFAULT_SEPARATOR;
use crate::backend::{Backend, CommandPipeline, Items, PipelineReply};
use crate::error::{Error, Result};

/// Facade settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Prefix of every id
    pub namespace: String,
    /// TTL used when a write does not give one
    pub default_ttl: Option<Duration>,
    /// Upper bound of the random variation added to TTLs
    pub ttl_variation: Duration,
    /// Joins namespace and id parts
    pub separator: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            default_ttl: None,
            ttl_variation: Duration::ZERO,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// Value for [`Cache::getset`], computed only on a miss when a producer
pub enum ValueOrProducer<'a> {
    /// Precomputed value
    Value(Value),
    /// Called with the cache on a miss
    Producer(Box<dyn FnOnce(&Cache) -> Result<Value> + 'a>),
}

impl<'a> ValueOrProducer<'a> {
    /// Wrap a producer closure
    pub fn producer(f: impl FnOnce(&Cache) -> Result<Value> + 'a) -> Self {
        ValueOrProducer::Producer(Box::new(f))
    }

    fn resolve(self, cache: &Cache) -> Result<Value> {
        match self {
            ValueOrProducer::Value(value) => Ok(value),
            ValueOrProducer::Producer(produce) => produce(cache),
        }
    }
}

impl From<Value> for ValueOrProducer<'_> {
    fn from(value: Value) -> Self {
        ValueOrProducer::Value(value)
    }
}

/// Pending load or capture
#[derive(Debug)]
struct CaptureEntry {
    id: String,
    /// Started by `start()`, an output buffer is open for it
    output: bool,
    /// Unique per push, tells apart entries pushed at the same depth
    ticket: u64,
}

#[derive(Debug, Default)]
struct CaptureStack {
    entries: Vec<CaptureEntry>,
    /// Entries with an open output buffer
    capturing: usize,
    next_ticket: u64,
}

/// Namespaced, TTL-aware cache over a shared backend
pub struct Cache {
    backend: Arc<dyn Backend>,
    namespace: String,
    separator: String,
    ttl: TtlPolicy,
    output: Arc<Output>,
    stack: Mutex<CaptureStack>,
}

impl Cache {
    /// Cache with default settings, writing captured output to stdout
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_settings(backend, CacheSettings::default())
    }

    /// Cache with custom settings
    pub fn with_settings(backend: Arc<dyn Backend>, settings: CacheSettings) -> Self {
        Self {
            backend,
            namespace: settings.namespace,
            separator: settings.separator,
            ttl: TtlPolicy::new(settings.default_ttl, settings.ttl_variation),
            output: Arc::new(Output::stdout()),
            stack: Mutex::new(CaptureStack::default()),
        }
    }

    /// Use `output` as the ambient output stream
    pub fn with_output(mut self, output: Arc<Output>) -> Self {
        self.output = output;
        self
    }

    /// Use `jitter` as the TTL variation source
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.ttl = self.ttl.with_jitter(jitter);
        self
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Shared backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Replace the backend
    pub fn set_backend(&mut self, backend: Arc<dyn Backend>) {
        self.backend = backend;
    }

    /// Namespace prefix
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Replace the namespace prefix
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    /// Namespace separator
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Default TTL
    pub fn default_ttl(&self) -> Option<Duration> {
        self.ttl.default_ttl()
    }

    /// Replace the default TTL
    pub fn set_default_ttl(&mut self, ttl: Option<Duration>) {
        self.ttl.set_default_ttl(ttl);
    }

    /// Upper bound of the TTL variation
    pub fn ttl_variation(&self) -> Duration {
        self.ttl.variation()
    }

    /// Replace the TTL variation bound
    pub fn set_ttl_variation(&mut self, amplitude: Duration) {
        self.ttl.set_variation(amplitude);
    }

    /// Ambient output stream
    pub fn output(&self) -> &Arc<Output> {
        &self.output
    }

    /// Write text to the ambient output stream
    pub fn echo(&self, text: &str) -> Result<()> {
        self.output.write(text)
    }

    // =========================================================================
    // Keys and TTLs
    // =========================================================================

    /// Backend id of `id` in this namespace
    pub fn id(&self, id: &str) -> String {
        self.id_parts(&[id])
    }

    /// Backend id of the joined `parts` in this namespace.
    ///
    /// Leading and trailing separators are trimmed.
    pub fn id_parts(&self, parts: &[&str]) -> String {
        let mut joined = self.namespace.clone();
        for part in parts {
            joined.push_str(&self.separator);
            joined.push_str(part);
        }
        trim_separator(&joined, &self.separator).to_string()
    }

    /// Cache for a sub-namespace, sharing backend, output and jitter
    pub fn ns(&self, namespace: &str, default_ttl: Option<Duration>) -> Cache {
        Cache {
            backend: Arc::clone(&self.backend),
            namespace: self.id(namespace),
            separator: self.separator.clone(),
            ttl: self.ttl.inherit(default_ttl),
            output: Arc::clone(&self.output),
            stack: Mutex::new(CaptureStack::default()),
        }
    }

    /// Effective TTL: given or default, plus variation
    pub fn compute_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        self.ttl.compute(ttl)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value of `id`, or `default` when absent
    pub fn get_or(&self, id: &str, default: Value) -> Result<Value> {
        Ok(self.get(id)?.unwrap_or(default))
    }

    /// Value of `id`; on a miss, add and return the given or produced value.
    ///
    /// Never overwrites: a concurrent writer winning the race keeps its value
    /// in the backend while this call returns the local one.
    pub fn getset(
        &self,
        id: &str,
        value: ValueOrProducer<'_>,
        ttl: Option<Duration>,
    ) -> Result<Value> {
        if let Some(cached) = self.get(id)? {
            return Ok(cached);
        }
        let value = value.resolve(self)?;
        self.add(id, value.clone(), ttl)?;
        Ok(value)
    }

    // =========================================================================
    // Load / Save
    // =========================================================================

    /// Cached value of `id`; on a miss, remember `id` for [`Cache::save`].
    ///
    /// ```
    /// use std::sync::Arc;
    /// use cachecache::{Backend, Cache, MemoryBackend};
    /// use serde_json::json;
    ///
    /// let cache = Cache::new(Arc::new(MemoryBackend::new()));
    /// let data = match cache.load("report").unwrap() {
    ///     Some(data) => data,
    ///     None => {
    ///         let data = json!("expensive");
    ///         cache.save(data.clone(), None).unwrap();
    ///         data
    ///     }
    /// };
    /// assert_eq!(cache.get("report").unwrap(), Some(data));
    /// ```
    pub fn load(&self, id: &str) -> Result<Option<Value>> {
        if let Some(value) = self.get(id)? {
            debug!("Load hit: {}", id);
            return Ok(Some(value));
        }
        self.push(id, false);
        Ok(None)
    }

    /// Add `data` under the id of the last missed [`Cache::load`]
    pub fn save(&self, data: Value, ttl: Option<Duration>) -> Result<bool> {
        let entry = {
            let mut stack = self.stack.lock();
            let entry = stack.entries.pop().ok_or(Error::LoadNotCalled)?;
            if entry.output {
                stack.capturing -= 1;
            }
            entry
        };
        if entry.output {
            // Saving a start() entry closes its buffer too
            self.output.flush_top()?;
        }
        self.add(&entry.id, data, ttl)
    }

    fn push(&self, id: &str, output: bool) {
        let mut stack = self.stack.lock();
        let ticket = stack.next_ticket;
        stack.next_ticket += 1;
        stack.entries.push(CaptureEntry {
            id: id.to_string(),
            output,
            ticket,
        });
        if output {
            stack.capturing += 1;
        }
    }

    // =========================================================================
    // Output Capture
    // =========================================================================

    /// Like [`Cache::load`], capturing output on a miss.
    ///
    /// On a hit the cached output is returned, and echoed when `echo`.
    pub fn start(&self, id: &str, echo: bool) -> Result<Option<String>> {
        if let Some(value) = self.get(id)? {
            let output = value_to_text(value);
            if echo {
                self.output.write(&output)?;
            }
            return Ok(Some(output));
        }
        self.output.begin();
        self.push(id, true);
        debug!("Capture started: {}", id);
        Ok(None)
    }

    /// Stop the innermost capture, store and return its output.
    ///
    /// Returns `None` when the innermost pending entry is a plain load.
    pub fn end(&self, ttl: Option<Duration>, echo: bool) -> Result<Option<String>> {
        let entry = {
            let mut stack = self.stack.lock();
            match stack.entries.last() {
                None => return Err(Error::EndWithoutStart),
                Some(top) if !top.output || stack.capturing == 0 => return Ok(None),
                Some(_) => {}
            }
            stack.capturing -= 1;
            stack.entries.pop().ok_or(Error::EndWithoutStart)?
        };

        let text = self.output.end().unwrap_or_default();
        let stored = self.add(&entry.id, Value::String(text.clone()), ttl);
        if echo {
            self.output.write(&text)?;
        }
        stored?;
        debug!("Capture stored: {} ({} bytes)", entry.id, text.len());
        Ok(Some(text))
    }

    /// True while at least one capture is open
    pub fn is_capturing(&self) -> bool {
        self.stack.lock().capturing > 0
    }

    /// Number of pending loads and captures
    pub fn pending(&self) -> usize {
        self.stack.lock().entries.len()
    }

    /// Ticket of the innermost entry when it is an open capture
    pub(super) fn innermost_capture(&self) -> Option<u64> {
        let stack = self.stack.lock();
        stack
            .entries
            .last()
            .filter(|entry| entry.output)
            .map(|entry| entry.ticket)
    }

    /// Abort the last pending load or capture.
    ///
    /// A capture's buffered output is flushed to the output, not stored.
    /// Returns false when nothing was pending.
    pub fn cancel(&self) -> Result<bool> {
        let entry = {
            let mut stack = self.stack.lock();
            let Some(entry) = stack.entries.pop() else {
                return Ok(false);
            };
            if entry.output {
                stack.capturing -= 1;
            }
            entry
        };
        if entry.output {
            self.output.flush_top()?;
        }
        debug!("Cancelled: {}", entry.id);
        Ok(true)
    }

    /// Cached output of `id`, or the output `callback` writes, stored.
    ///
    /// A failing callback cancels the capture and its error is returned.
    pub fn capture<F>(
        &self,
        id: &str,
        callback: F,
        ttl: Option<Duration>,
        echo: bool,
    ) -> Result<Option<String>>
    where
        F: FnOnce(&Cache) -> Result<()>,
    {
        if let Some(output) = self.start(id, echo)? {
            return Ok(Some(output));
        }
        if let Err(e) = callback(self) {
            self.cancel()?;
            return Err(e);
        }
        self.end(ttl, echo)
    }

    /// Capture the whole output of a request.
    ///
    /// Without `id`, the id derives from the request's uri and parameters.
    /// On a miss the returned guard stores the page when dropped.
    pub fn capture_page(
        &self,
        request: &RequestContext,
        id: Option<&str>,
        ttl: Option<Duration>,
        exit: bool,
    ) -> Result<PageCapture<'_>> {
        let id = match id {
            Some(id) => id.to_string(),
            None => keys::page_key(request)?,
        };
        match self.start(&id, true)? {
            Some(output) => Ok(PageCapture::Hit { output, exit }),
            None => Ok(PageCapture::Capturing(PageGuard::new(self, ttl))),
        }
    }

    // =========================================================================
    // Memoization
    // =========================================================================

    /// Memoized call of the function known as `name`.
    ///
    /// The id derives from `name` and the serialized `args`.
    pub fn call<A, R, F>(&self, name: &str, args: A, ttl: Option<Duration>, f: F) -> Result<R>
    where
        A: Serialize,
        R: Serialize + DeserializeOwned,
        F: FnOnce(A) -> R,
    {
        let id = keys::call_key(name, &args)?;
        if let Some(cached) = self.get(&id)? {
            return Ok(serde_json::from_value(cached)?);
        }
        let result = f(args);
        self.add(&id, serde_json::to_value(&result)?, ttl)?;
        Ok(result)
    }

    /// Memoize every method call of `object`.
    ///
    /// Calls are cached in the sub-namespace `id`, by default the type name.
    pub fn wrap<T: Invokable>(
        &self,
        object: T,
        id: Option<&str>,
        ttl: Option<Duration>,
    ) -> ObjectWrapper<T> {
        let id = id.unwrap_or_else(|| short_type_name::<T>());
        ObjectWrapper::new(object, self.ns(id, ttl))
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    /// Unexecuted pipeline, native when the backend has one
    pub fn pipeline(&self) -> Box<dyn CommandPipeline + '_> {
        if self.backend.supports_pipelines() {
            if let Some(native) = self.backend.create_pipeline() {
                return Box::new(NamespacedPipeline::new(self, native));
            }
        }
        Box::new(Pipeline::new(self))
    }

    /// Record commands with `callback`, then execute them
    pub fn pipeline_with<F>(&self, callback: F) -> Result<Vec<PipelineReply>>
    where
        F: FnOnce(&mut dyn CommandPipeline),
    {
        let mut pipe = self.pipeline();
        callback(pipe.as_mut());
        pipe.execute()
    }
}

/// Strip every leading and trailing occurrence of `separator`
fn trim_separator<'a>(mut s: &'a str, separator: &str) -> &'a str {
    if separator.is_empty() {
        return s;
    }
    while let Some(rest) = s.strip_prefix(separator) {
        s = rest;
    }
    while let Some(rest) = s.strip_suffix(separator) {
        s = rest;
    }
    s
}

/// Cached output as text
fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Last path segment of a type name, generics dropped
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl Backend for Cache {
    fn exists(&self, id: &str) -> Result<bool> {
        self.backend.exists(&self.id(id))
    }

    fn get(&self, id: &str) -> Result<Option<Value>> {
        self.backend.get(&self.id(id))
    }

    fn get_multi(&self, ids: &[String]) -> Result<Vec<Option<Value>>> {
        let ids: Vec<String> = ids.iter().map(|id| self.id(id)).collect();
        self.backend.get_multi(&ids)
    }

    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        self.backend.add(&self.id(id), value, self.compute_ttl(ttl))
    }

    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        self.backend.set(&self.id(id), value, self.compute_ttl(ttl))
    }

    fn set_multi(&self, items: Items, ttl: Option<Duration>) -> Result<bool> {
        let items: Items = items
            .into_iter()
            .map(|(id, value)| (self.id(&id), value))
            .collect();
        self.backend.set_multi(items, self.compute_ttl(ttl))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.backend.delete(&self.id(id))
    }

    fn flush_all(&self) -> Result<bool> {
        self.backend.flush_all()
    }

    fn supports_pipelines(&self) -> bool {
        true
    }

    fn create_pipeline(&self) -> Option<Box<dyn CommandPipeline + '_>> {
        Some(self.pipeline())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stack = self.stack.lock();
        f.debug_struct("Cache")
            .field("namespace", &self.namespace)
            .field("separator", &self.separator)
            .field("ttl", &self.ttl)
            .field("pending", &stack.entries.len())
            .field("capturing", &stack.capturing)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
