//! Fake server transports for testing generated clients without a network.
//!
//! A test builds one fake server per client (a struct of optional handler
//! closures), wraps them in a [`ClientSet`] and hands a
//! [`ServerFactoryTransport`] to the client options. Requests are routed by
//! their [`OperationId`](crate::http::OperationId):
//!
//! ```text
//! ServerFactoryTransport ──client name──▶ per-client server transport ──method──▶ handler
//! ```
//!
//! # Components
//!
//! - [`factory`]: client-key routing with lazily built sub-transports
//! - [`responder`]: canned success and error responses
//! - [`pager`] / [`poller`]: scripted paged and long-running responses
//! - [`tracker`]: keeps pagers and pollers between requests
//! - [`server`]: helpers the per-client server transports share

pub mod factory;
pub mod pager;
pub mod poller;
pub mod responder;
pub mod server;
pub mod tracker;

pub use factory::{ClientKey, ClientSet, ServerFactoryTransport};
pub use pager::{PagerResponder, SetNextLink};
pub use poller::PollerResponder;
pub use responder::{
    ErrorResponder, FakeFn, FakePagerFn, FakePollerFn, FakeResult, Responder, fake_fn, pager_fn,
    poller_fn,
};
pub use server::{PathParams, check_status, handler, respond, unmarshal_json};
pub use tracker::{Tracker, sanitize_path};
