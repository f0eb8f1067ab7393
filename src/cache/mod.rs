//! Cache Facade
//!
//! Turns a flat key/value [`Backend`](crate::backend::Backend) into
//! namespaced, TTL-aware, batchable caching operations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               Cache                                       │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  id()/ns()        │ TTL policy        │ Capture stack     │ Memoization  │
//! │  ┌─────────────┐  │ ┌──────────────┐  │ ┌──────────────┐  │ ┌──────────┐ │
//! │  │ namespace + │  │ │ default TTL  │  │ │ load / save  │  │ │ getset   │ │
//! │  │ separator   │  │ │ + jitter     │  │ │ start / end  │  │ │ call     │ │
//! │  └─────────────┘  │ └──────────────┘  │ │ cancel       │  │ │ wrap     │ │
//! │                   │                   │ └──────────────┘  │ └──────────┘ │
//! │         │                  │                   │                │        │
//! │         └──────────────────┴─────────┬─────────┴────────────────┘        │
//! │                                      │                                    │
//! │                    Backend  ◀──── Pipeline (grouped get/set)              │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The facade implements `Backend` itself, so caches nest: a cache can be the
//! backend of another cache or of a [`LoggingBackend`](crate::backend::LoggingBackend).
//!
//! # Concurrency
//!
//! Every operation runs to completion on the calling thread. The capture
//! stack is per-instance state; share one instance per logical call stack.

mod capture;
mod facade;
mod keys;
mod page;
mod pipeline;
mod ttl;
mod wrapper;

#[cfg(test)]
mod proptest;

pub use capture::Output;
pub use facade::{Cache, CacheSettings, ValueOrProducer};
pub use keys::{call_key, method_key, page_key};
pub use page::{PageCapture, PageGuard, RequestContext};
pub use pipeline::{NamespacedPipeline, Pipeline};
pub use ttl::{FixedJitter, Jitter, RandomJitter, SeededJitter, TtlPolicy};
pub use wrapper::{unknown_method, Invokable, ObjectWrapper, INVOKE, TO_STRING};

/// Default namespace separator
pub const DEFAULT_SEPARATOR: &str = ":";
