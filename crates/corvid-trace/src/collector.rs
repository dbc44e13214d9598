//! Trace collector shared by concurrent pipeline calls.
//!
//! The collector is passed explicitly (usually as a [`SharedCollector`]) to
//! whoever records spans; there is no task-local or global state. Each call
//! owns its [`ActiveSpan`] while in flight and hands it back on completion,
//! so concurrent calls never contend on a span stack.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::types::{Span, Trace};

/// A collector that can be shared across tasks.
pub type SharedCollector = Arc<TraceCollector>;

/// Accumulates completed spans into a [`Trace`].
#[derive(Debug)]
pub struct TraceCollector {
    trace: Mutex<Trace>,
}

impl TraceCollector {
    /// Create a collector with a random trace ID.
    pub fn new() -> Self {
        Self {
            trace: Mutex::new(Trace::new_random()),
        }
    }

    /// Create a collector with a specific trace ID.
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace: Mutex::new(Trace::new(trace_id)),
        }
    }

    /// Create a shareable collector with a random trace ID.
    pub fn shared() -> SharedCollector {
        Arc::new(Self::new())
    }

    /// Get the trace ID.
    pub fn trace_id(&self) -> String {
        self.lock().trace_id.clone()
    }

    /// Add trace-level metadata.
    pub fn add_metadata(&self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(v) = serde_json::to_value(value) {
            self.lock().metadata.insert(key.into(), v);
        }
    }

    /// Start a span for one call. Nothing is recorded until it is finished.
    pub fn start_span(&self, name: impl Into<String>) -> ActiveSpan<'_> {
        ActiveSpan {
            collector: self,
            span: Some(Span::new(name)),
        }
    }

    /// Number of completed spans so far.
    pub fn span_count(&self) -> usize {
        self.lock().spans.len()
    }

    /// Copy of the trace as it stands, without completing it.
    pub fn snapshot(&self) -> Trace {
        self.lock().clone()
    }

    /// Take the collected spans as a completed trace, leaving a fresh trace
    /// with the same ID behind.
    pub fn finalize(&self) -> Trace {
        let mut guard = self.lock();
        let fresh = Trace::new(guard.trace_id.clone());
        let mut trace = std::mem::replace(&mut *guard, fresh);
        trace.complete();
        trace
    }

    fn attach(&self, span: Span) {
        self.lock().spans.push(span);
    }

    // A panic while holding the lock cannot leave a Trace half-written, so a
    // poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, Trace> {
        self.trace.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-flight span.
///
/// Finish it with [`ActiveSpan::finish_ok`] or [`ActiveSpan::finish_error`].
/// A span dropped without being finished is recorded as an error.
#[derive(Debug)]
pub struct ActiveSpan<'a> {
    collector: &'a TraceCollector,
    span: Option<Span>,
}

impl ActiveSpan<'_> {
    /// Set an attribute on the span.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Some(span) = self.span.as_mut() {
            span.set_attribute(key, value);
        }
    }

    /// Record an event on the span.
    pub fn record_event(&mut self, name: impl Into<String>, data: Option<impl Serialize>) {
        if let Some(span) = self.span.as_mut() {
            span.record_event(name, data);
        }
    }

    /// Complete the span successfully.
    pub fn finish_ok(mut self) {
        if let Some(mut span) = self.span.take() {
            span.complete_ok();
            self.collector.attach(span);
        }
    }

    /// Complete the span with an error.
    pub fn finish_error(mut self, message: impl Into<String>) {
        if let Some(mut span) = self.span.take() {
            span.complete_error(message);
            self.collector.attach(span);
        }
    }
}

impl Drop for ActiveSpan<'_> {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.complete_error("span not explicitly finished");
            self.collector.attach(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_spans_are_collected() {
        let collector = TraceCollector::with_trace_id("trace-1");

        let mut span = collector.start_span("WidgetsClient.List");
        span.set_attribute("http.method", "GET");
        span.record_event("response", Some(200));
        span.finish_ok();

        collector.start_span("WidgetsClient.Get").finish_error("boom");

        let trace = collector.finalize();
        assert_eq!(trace.trace_id, "trace-1");
        assert_eq!(trace.spans.len(), 2);
        assert!(trace.spans[0].is_ok());
        assert!(!trace.spans[1].is_ok());
        assert!(trace.ended_at.is_some());
    }

    #[test]
    fn test_dropped_span_is_recorded_as_error() {
        let collector = TraceCollector::new();
        {
            let _span = collector.start_span("JobsClient.BeginCreate");
        }
        let trace = collector.snapshot();
        assert_eq!(trace.spans.len(), 1);
        assert!(!trace.spans[0].is_ok());
    }

    #[test]
    fn test_finalize_resets_spans() {
        let collector = TraceCollector::new();
        collector.start_span("A.B").finish_ok();
        assert_eq!(collector.finalize().spans.len(), 1);
        assert_eq!(collector.span_count(), 0);
    }

    #[test]
    fn test_concurrent_spans() {
        let collector = TraceCollector::shared();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    let mut span = collector.start_span(format!("Client.Op{}", i));
                    span.set_attribute("index", i);
                    span.finish_ok();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(collector.span_count(), 8);
    }
}
