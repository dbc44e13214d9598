//! corvid-runtime: the runtime layer generated HTTP clients plug into
//!
//! This crate provides:
//! - An ordered policy pipeline terminating in a transport
//! - Built-in policies for headers, api version, request ids, retry, logging and traces
//! - Fake server transports routed by operation identity, for tests
//! - Decoding of discriminated unions
//! - Paged results and long-running operation pollers
//! - Per-call cancellation and deadlines through [`Context`]

pub mod context;
pub mod error;
pub mod fake;
pub mod http;
pub mod pager;
pub mod pipeline;
pub mod policies;
pub mod poller;
pub mod polymorphic;
pub mod transport;

// Testing utilities: scripted transport and fixtures. The HTTP mock server
// is only compiled for this crate's own tests.
pub mod testing;

pub use context::{CancelHandle, Context};
pub use error::{ErrorKind, Result, RuntimeError, ServiceError};
pub use fake::{
    ClientKey, ClientSet, ErrorResponder, FakeFn, FakePagerFn, FakePollerFn, FakeResult,
    PagerResponder, PollerResponder, Responder, ServerFactoryTransport, SetNextLink, fake_fn,
    pager_fn, poller_fn,
};
pub use http::{OperationId, Request, Response};
pub use pager::{Page, Pager};
pub use pipeline::{ClientOptions, Next, Pipeline, PipelineBuilder, Policy, SharedPolicy};
pub use policies::{
    ApiKeyPolicy, ApiVersionPolicy, ClientRequestIdPolicy, HeadersPolicy, LoggingPolicy,
    RetryOptions, RetryPolicy, TracePolicy,
};
pub use poller::{FinalStateVia, PollOptions, PollState, Poller};
pub use polymorphic::{Polymorphic, VariantSetKind};
pub use transport::{ReqwestConfig, ReqwestTransport, SharedTransport, Transport};

pub use reqwest::{Method, StatusCode, Url};
