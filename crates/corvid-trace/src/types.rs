//! Trace data types.
//!
//! A [`Trace`] groups the spans recorded for a client over some window (one
//! CLI invocation, one test). Each [`Span`] covers one pipeline call and is
//! named after the operation identity (`Client.Method`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A set of completed call spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique identifier for this trace.
    pub trace_id: String,

    /// When the trace started.
    pub started_at: DateTime<Utc>,

    /// When the trace was finalized.
    pub ended_at: Option<DateTime<Utc>>,

    /// Total duration in milliseconds.
    pub duration_ms: Option<u64>,

    /// Completed spans, in completion order.
    pub spans: Vec<Span>,

    /// Trace-level metadata (e.g. endpoint, CLI command).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One pipeline call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier for this span within the trace.
    pub span_id: String,

    /// Operation identity, e.g. `"WidgetsClient.List"`.
    pub name: String,

    /// When the span started.
    pub started_at: DateTime<Utc>,

    /// When the span completed.
    pub ended_at: Option<DateTime<Utc>>,

    /// Wall-clock duration in milliseconds, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Request/response attributes (`http.method`, `http.status_code`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Events that occurred during this span.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,

    /// Outcome of the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SpanOutcome>,
}

/// Outcome of a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SpanOutcome {
    #[serde(rename = "ok")]
    Ok,

    #[serde(rename = "error")]
    Error { message: String },
}

/// A point-in-time occurrence within a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event name (e.g. `"retry"`, `"response"`).
    pub name: String,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Event-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Trace {
    /// Create an empty trace with the given ID.
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            spans: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an empty trace with a random UUID.
    pub fn new_random() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Stamp the end time and duration.
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(millis_between(self.started_at, now));
    }

    /// Spans whose name matches `operation`.
    pub fn spans_named<'a>(&'a self, operation: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans.iter().filter(move |s| s.name == operation)
    }
}

impl Span {
    /// Start a new span now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            span_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            attributes: BTreeMap::new(),
            events: Vec::new(),
            outcome: None,
        }
    }

    /// Set an attribute. Values that fail to serialize are dropped.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(v) = serde_json::to_value(value) {
            self.attributes.insert(key.into(), v);
        }
    }

    /// Record an event with optional data.
    pub fn record_event(&mut self, name: impl Into<String>, data: Option<impl Serialize>) {
        self.events.push(Event {
            name: name.into(),
            timestamp: Utc::now(),
            data: data.and_then(|d| serde_json::to_value(d).ok()),
        });
    }

    /// Mark the span as complete with success.
    pub fn complete_ok(&mut self) {
        self.finish(SpanOutcome::Ok);
    }

    /// Mark the span as complete with an error.
    pub fn complete_error(&mut self, message: impl Into<String>) {
        self.finish(SpanOutcome::Error {
            message: message.into(),
        });
    }

    /// Whether the span completed successfully.
    pub fn is_ok(&self) -> bool {
        self.outcome == Some(SpanOutcome::Ok)
    }

    fn finish(&mut self, outcome: SpanOutcome) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(millis_between(self.started_at, now));
        self.outcome = Some(outcome);
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}
