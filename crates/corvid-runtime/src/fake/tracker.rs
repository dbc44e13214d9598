//! Per-path storage for in-flight pager and poller responders.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::http::Request;

/// Path suffix appended to fake polling URLs.
pub const FAKE_POLL_SUFFIX: &str = "/get/fake/status";

/// Normalize a request path so the initial request, its next-link requests
/// and its polling requests all map to the same key.
pub fn sanitize_path(path: &str) -> String {
    let path = path.strip_suffix(FAKE_POLL_SUFFIX).unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Responders keyed by sanitized request path.
///
/// Values are taken out for the duration of a request and put back while
/// they still have responses, so the lock is held only for map access.
#[derive(Debug)]
pub struct Tracker<T> {
    items: Mutex<HashMap<String, T>>,
}

impl<T> Default for Tracker<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Tracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the responder for this request's path.
    pub fn take(&self, request: &Request) -> Option<T> {
        self.lock().remove(&sanitize_path(request.url().path()))
    }

    /// Store a responder for this request's path.
    pub fn put(&self, request: &Request, item: T) {
        self.lock().insert(sanitize_path(request.url().path()), item);
    }

    /// Number of tracked responders.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
