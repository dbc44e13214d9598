//! Ordered policy chains ending in a transport.
//!
//! A [`Pipeline`] owns a fixed list of [`Policy`] values and one transport.
//! Each policy receives the request plus a [`Next`] handle for the rest of
//! the chain; it may edit the request, call `next` once (or not at all to
//! short-circuit), and post-process the response. `Next::run` consumes the
//! handle; retry clones `Next` explicitly for each attempt.
//!
//! Built-in ordering (outermost first):
//!
//! ```text
//! client-request-id → api-version → per-call → retry → per-retry → logging → trace → transport
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use corvid_trace::SharedCollector;

use crate::context::Context;
use crate::error::Result;
use crate::http::{Request, Response};
use crate::policies::{
    ApiVersionPolicy, ClientRequestIdPolicy, LoggingPolicy, RetryOptions, RetryPolicy, TracePolicy,
};
use crate::transport::{ReqwestConfig, ReqwestTransport, SharedTransport, Transport};

/// One stage of the pipeline.
#[async_trait]
pub trait Policy: Send + Sync {
    /// Handle the request, usually by delegating to `next`.
    async fn send(&self, ctx: &Context, request: Request, next: Next<'_>) -> Result<Response>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A policy shared between pipelines.
pub type SharedPolicy = Arc<dyn Policy>;

/// The remainder of a policy chain.
///
/// Consumed by [`Next::run`]. A policy that needs to call the remainder more
/// than once (retry) clones it first.
#[derive(Clone)]
pub struct Next<'a> {
    policies: &'a [SharedPolicy],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(policies: &'a [SharedPolicy], transport: &'a dyn Transport) -> Self {
        Self {
            policies,
            transport,
        }
    }

    /// Run the rest of the chain.
    pub async fn run(self, ctx: &Context, request: Request) -> Result<Response> {
        match self.policies.split_first() {
            Some((policy, rest)) => {
                policy
                    .send(ctx, request, Next::new(rest, self.transport))
                    .await
            }
            None => {
                ctx.check()?;
                self.transport.send(ctx, request).await
            }
        }
    }

    /// Number of policies left before the transport.
    pub fn remaining(&self) -> usize {
        self.policies.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable policy chain plus its transport. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    policies: Arc<[SharedPolicy]>,
    transport: SharedTransport,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "policies",
                &self.policies.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// A pipeline with exactly these policies, in this order.
    pub fn new(policies: Vec<SharedPolicy>, transport: SharedTransport) -> Self {
        Self {
            policies: policies.into(),
            transport,
        }
    }

    /// Start building a pipeline.
    pub fn builder(transport: SharedTransport) -> PipelineBuilder {
        PipelineBuilder::new(transport)
    }

    /// Send a request through every policy and the transport.
    ///
    /// The caller's request is never mutated; policies see a copy.
    pub async fn send(&self, ctx: &Context, request: &Request) -> Result<Response> {
        ctx.check()?;
        Next::new(&self.policies, self.transport.as_ref())
            .run(ctx, request.clone())
            .await
    }

    /// Policy names in execution order.
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// The terminal transport.
    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }
}

/// Assembles a [`Pipeline`] in the built-in order.
pub struct PipelineBuilder {
    transport: SharedTransport,
    head: Vec<SharedPolicy>,
    per_call: Vec<SharedPolicy>,
    retry: Option<SharedPolicy>,
    per_retry: Vec<SharedPolicy>,
    tail: Vec<SharedPolicy>,
}

impl PipelineBuilder {
    fn new(transport: SharedTransport) -> Self {
        Self {
            transport,
            head: Vec::new(),
            per_call: Vec::new(),
            retry: None,
            per_retry: Vec::new(),
            tail: Vec::new(),
        }
    }

    /// Policies that run once per logical call, before retry.
    pub fn per_call(mut self, policy: impl Policy + 'static) -> Self {
        self.per_call.push(Arc::new(policy));
        self
    }

    /// Policies that run on every attempt, after retry.
    pub fn per_retry(mut self, policy: impl Policy + 'static) -> Self {
        self.per_retry.push(Arc::new(policy));
        self
    }

    /// Add already-shared per-call policies.
    pub fn per_call_shared(mut self, policies: impl IntoIterator<Item = SharedPolicy>) -> Self {
        self.per_call.extend(policies);
        self
    }

    /// Add already-shared per-retry policies.
    pub fn per_retry_shared(mut self, policies: impl IntoIterator<Item = SharedPolicy>) -> Self {
        self.per_retry.extend(policies);
        self
    }

    /// Install the retry policy.
    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.retry = Some(Arc::new(RetryPolicy::new(options)));
        self
    }

    fn head(mut self, policy: impl Policy + 'static) -> Self {
        self.head.push(Arc::new(policy));
        self
    }

    fn tail(mut self, policy: impl Policy + 'static) -> Self {
        self.tail.push(Arc::new(policy));
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Pipeline {
        let policies: Vec<SharedPolicy> = self
            .head
            .into_iter()
            .chain(self.per_call)
            .chain(self.retry)
            .chain(self.per_retry)
            .chain(self.tail)
            .collect();
        Pipeline::new(policies, self.transport)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client options
// ─────────────────────────────────────────────────────────────────────────────

/// Options accepted by every generated client constructor.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Replace the HTTP transport, e.g. with a fake server transport.
    #[serde(skip)]
    pub transport: Option<SharedTransport>,

    /// Extra policies run once per call.
    #[serde(skip)]
    pub per_call_policies: Vec<SharedPolicy>,

    /// Extra policies run on every attempt.
    #[serde(skip)]
    pub per_retry_policies: Vec<SharedPolicy>,

    /// Retry behaviour.
    pub retry: RetryOptions,

    /// Value for the `api-version` query parameter.
    pub api_version: Option<String>,

    /// Disable the client request id header.
    pub disable_request_id: bool,

    /// Log requests and responses at debug level.
    pub logging: bool,

    /// Record one span per call into this collector.
    #[serde(skip)]
    pub trace: Option<SharedCollector>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("transport_override", &self.transport.is_some())
            .field("per_call_policies", &self.per_call_policies.len())
            .field("per_retry_policies", &self.per_retry_policies.len())
            .field("retry", &self.retry)
            .field("api_version", &self.api_version)
            .field("disable_request_id", &self.disable_request_id)
            .field("logging", &self.logging)
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

impl ClientOptions {
    /// Use this transport instead of HTTP.
    pub fn with_transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the retry options.
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Set the api version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Add a per-call policy.
    pub fn with_per_call_policy(mut self, policy: impl Policy + 'static) -> Self {
        self.per_call_policies.push(Arc::new(policy));
        self
    }

    /// Add a per-retry policy.
    pub fn with_per_retry_policy(mut self, policy: impl Policy + 'static) -> Self {
        self.per_retry_policies.push(Arc::new(policy));
        self
    }

    /// Record call spans into `collector`.
    pub fn with_trace(mut self, collector: SharedCollector) -> Self {
        self.trace = Some(collector);
        self
    }

    /// Enable request logging.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Build the pipeline a client uses.
    ///
    /// `default_api_version` applies when the options carry none.
    pub fn build_pipeline(&self, default_api_version: Option<&str>) -> Result<Pipeline> {
        let transport: SharedTransport = match &self.transport {
            Some(t) => Arc::clone(t),
            None => Arc::new(ReqwestTransport::new(ReqwestConfig::default())?),
        };

        let mut builder = Pipeline::builder(transport);
        if !self.disable_request_id {
            builder = builder.head(ClientRequestIdPolicy::new());
        }
        if let Some(version) = self.api_version.as_deref().or(default_api_version) {
            builder = builder.head(ApiVersionPolicy::new(version));
        }
        builder = builder
            .per_call_shared(self.per_call_policies.iter().cloned())
            .retry(self.retry.clone())
            .per_retry_shared(self.per_retry_policies.iter().cloned());
        if self.logging {
            builder = builder.tail(LoggingPolicy::new());
        }
        if let Some(collector) = &self.trace {
            builder = builder.tail(TracePolicy::new(Arc::clone(collector)));
        }
        Ok(builder.build())
    }
}
