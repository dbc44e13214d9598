//! Per-call trace collection for corvid pipelines.
//!
//! - **Types**: `Trace`, `Span`, `Event` serde structures
//! - **Collector**: an explicitly shared [`TraceCollector`]; each pipeline call
//!   records one span named after its operation identity
//! - **Writer**: JSONL persistence, single file or daily rotation
//!
//! # Usage
//!
//! ```rust,no_run
//! use corvid_trace::{TraceCollector, TraceWriter, WriterConfig};
//!
//! let collector = TraceCollector::shared();
//!
//! let mut span = collector.start_span("WidgetsClient.List");
//! span.set_attribute("http.status_code", 200);
//! span.finish_ok();
//!
//! let writer = TraceWriter::new(WriterConfig::single_file("traces.jsonl")).unwrap();
//! writer.write(&collector.finalize()).unwrap();
//! ```

pub mod collector;
pub mod types;
pub mod writer;

pub use collector::{ActiveSpan, SharedCollector, TraceCollector};
pub use types::{Event, Span, SpanOutcome, Trace};
pub use writer::{TraceLayout, TraceWriter, WriteError, WriterConfig};
