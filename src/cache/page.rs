//! Whole-page Capture
//!
//! Memoizes everything a request writes. On a miss the returned guard plays
//! the role of a termination hook: dropping it at the end of the request ends
//! the capture and stores the output.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::facade::Cache;
use crate::error::Result;

/// Data identifying the current request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Route or request URI
    pub uri: String,
    /// Request parameters, ordered by name
    pub params: BTreeMap<String, String>,
}

impl RequestContext {
    /// Request without parameters
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a request parameter
    pub fn param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Outcome of [`Cache::capture_page`]
#[derive(Debug)]
pub enum PageCapture<'a> {
    /// Page found and replayed to the output
    Hit {
        /// Replayed output
        output: String,
        /// Caller must stop processing the request
        exit: bool,
    },
    /// Page not cached, output is being captured
    Capturing(PageGuard<'a>),
}

impl PageCapture<'_> {
    /// True when the page was served from the cache
    pub fn is_hit(&self) -> bool {
        matches!(self, PageCapture::Hit { .. })
    }
}

/// Pending page capture, ended on drop
#[derive(Debug)]
pub struct PageGuard<'a> {
    cache: &'a Cache,
    ttl: Option<Duration>,
    /// Ticket of the capture this guard ends
    ticket: Option<u64>,
    done: bool,
}

impl<'a> PageGuard<'a> {
    pub(super) fn new(cache: &'a Cache, ttl: Option<Duration>) -> Self {
        Self {
            cache,
            ttl,
            ticket: cache.innermost_capture(),
            done: false,
        }
    }

    /// End the capture now, storing and echoing the page
    pub fn finish(mut self) -> Result<Option<String>> {
        self.done = true;
        self.cache.end(self.ttl, true)
    }

    /// Whether this capture is still the innermost one
    fn is_innermost(&self) -> bool {
        self.ticket.is_some() && self.cache.innermost_capture() == self.ticket
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if !self.is_innermost() {
            debug!("Page capture already closed, nothing to store");
            return;
        }
        if let Err(e) = self.cache.end(self.ttl, true) {
            warn!("Failed to store captured page: {}", e);
        }
    }
}
