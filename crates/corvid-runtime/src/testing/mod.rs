//! Testing utilities for corvid-runtime.
//!
//! # Components
//!
//! - [`fixtures`]: Request and response builders
//! - [`mock_transport`]: Scripted transport with request capture
//! - [`mock_server`]: Real HTTP server for transport tests (test builds only)

pub mod fixtures;
#[cfg(test)]
pub mod mock_server;
pub mod mock_transport;

pub use fixtures::*;
#[cfg(test)]
pub use mock_server::MockHttpServer;
pub use mock_transport::MockTransport;
