//! Built-in pipeline policies.
//!
//! | Policy | Effect |
//! |--------|--------|
//! | [`HeadersPolicy`] | Adds fixed headers |
//! | [`ApiVersionPolicy`] | Sets the `api-version` query parameter |
//! | [`ApiKeyPolicy`] | Sets an API key header |
//! | [`ClientRequestIdPolicy`] | Adds `x-ms-client-request-id` when absent |
//! | [`RetryPolicy`] | Re-sends retryable failures with exponential backoff |
//! | [`LoggingPolicy`] | Logs each attempt through `tracing` |
//! | [`TracePolicy`] | Records one span per call |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use corvid_trace::SharedCollector;

use crate::context::Context;
use crate::error::{Result, RuntimeError, is_retryable_status};
use crate::http::{Request, Response};
use crate::pipeline::{Next, Policy};

/// Header carrying the per-call request id.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Query parameter carrying the api version.
pub const API_VERSION_PARAM: &str = "api-version";

// ─────────────────────────────────────────────────────────────────────────────
// Header policies
// ─────────────────────────────────────────────────────────────────────────────

/// Adds a fixed set of headers, overwriting existing values.
#[derive(Debug, Clone, Default)]
pub struct HeadersPolicy {
    headers: Vec<(String, String)>,
}

impl HeadersPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl Policy for HeadersPolicy {
    async fn send(&self, ctx: &Context, mut request: Request, next: Next<'_>) -> Result<Response> {
        for (name, value) in &self.headers {
            request.set_header(name, value)?;
        }
        next.run(ctx, request).await
    }
}

/// Sets the `api-version` query parameter, replacing any existing one, or a
/// named header when built with [`ApiVersionPolicy::in_header`].
#[derive(Debug, Clone)]
pub struct ApiVersionPolicy {
    version: String,
    header: Option<String>,
}

impl ApiVersionPolicy {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            header: None,
        }
    }

    /// Send the version in `header` instead of the query string.
    pub fn in_header(header: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            header: Some(header.into()),
        }
    }
}

#[async_trait]
impl Policy for ApiVersionPolicy {
    async fn send(&self, ctx: &Context, mut request: Request, next: Next<'_>) -> Result<Response> {
        if let Some(header) = &self.header {
            return next.run(ctx, request.with_header(header, &self.version)?).await;
        }
        let url = request.url_mut();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != API_VERSION_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            pairs.extend_pairs(kept);
            pairs.append_pair(API_VERSION_PARAM, &self.version);
        }
        next.run(ctx, request).await
    }
}

/// Sends an API key in a header.
#[derive(Clone)]
pub struct ApiKeyPolicy {
    header: String,
    key: String,
}

impl std::fmt::Debug for ApiKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyPolicy")
            .field("header", &self.header)
            .field("key", &"[redacted]")
            .finish()
    }
}

impl ApiKeyPolicy {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }

    /// Read the key from an environment variable.
    pub fn from_env(header: impl Into<String>, var: &str) -> Result<Self> {
        let key = std::env::var(var).map_err(|_| {
            RuntimeError::Config(format!("{} environment variable not set", var))
        })?;
        Ok(Self::new(header, key))
    }
}

#[async_trait]
impl Policy for ApiKeyPolicy {
    async fn send(&self, ctx: &Context, mut request: Request, next: Next<'_>) -> Result<Response> {
        request.set_header(&self.header, &self.key)?;
        next.run(ctx, request).await
    }
}

/// Adds a fresh UUID request id unless the caller supplied one.
#[derive(Debug, Clone, Default)]
pub struct ClientRequestIdPolicy;

impl ClientRequestIdPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Policy for ClientRequestIdPolicy {
    async fn send(&self, ctx: &Context, mut request: Request, next: Next<'_>) -> Result<Response> {
        if request.header(CLIENT_REQUEST_ID_HEADER).is_none() {
            request.set_header(CLIENT_REQUEST_ID_HEADER, &uuid::Uuid::new_v4().to_string())?;
        }
        next.run(ctx, request).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Retries after the first attempt. Zero disables retry.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Also retry non-idempotent methods such as POST.
    pub retry_non_idempotent: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            retry_non_idempotent: false,
        }
    }
}

impl RetryOptions {
    /// Options that never retry.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Re-sends failed attempts with exponential backoff.
///
/// Network errors and 408/429/5xx responses are retried. A `Retry-After`
/// header on the response replaces the computed delay. Waits observe the
/// call's context, so cancellation interrupts a backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    options: RetryOptions,
}

impl RetryPolicy {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    async fn send(&self, ctx: &Context, request: Request, next: Next<'_>) -> Result<Response> {
        let may_retry = request.is_idempotent() || self.options.retry_non_idempotent;
        let max_retries = if may_retry { self.options.max_retries } else { 0 };

        let mut attempt = 0;
        loop {
            ctx.check()?;
            let outcome = next.clone().run(ctx, request.clone()).await;

            let delay = match &outcome {
                Ok(response) if is_retryable_status(response.status().as_u16()) => Some(
                    response
                        .retry_after()
                        .unwrap_or_else(|| self.options.backoff_for(attempt)),
                ),
                Err(e) if e.is_retryable() => Some(self.options.backoff_for(attempt)),
                _ => None,
            };
            let Some(delay) = delay else {
                return outcome;
            };
            if attempt >= max_retries {
                return outcome;
            }

            let operation = request.operation().map(|o| o.to_string()).unwrap_or_default();
            tracing::warn!(
                operation = %operation,
                attempt = attempt + 1,
                max_retries = max_retries,
                backoff_ms = delay.as_millis() as u64,
                "Request failed, retrying"
            );
            ctx.sleep(delay).await?;
            attempt += 1;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observability
// ─────────────────────────────────────────────────────────────────────────────

/// Logs each attempt at debug level, failures at warn.
#[derive(Debug, Clone, Default)]
pub struct LoggingPolicy;

impl LoggingPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Policy for LoggingPolicy {
    async fn send(&self, ctx: &Context, request: Request, next: Next<'_>) -> Result<Response> {
        let operation = request
            .operation()
            .map(|o| o.to_string())
            .unwrap_or_default();
        tracing::debug!(
            operation = %operation,
            method = %request.method(),
            url = %request.url(),
            body_bytes = request.body().len(),
            "Sending request"
        );

        let start = Instant::now();
        let result = next.run(ctx, request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::debug!(
                    operation = %operation,
                    status = response.status().as_u16(),
                    body_bytes = response.body().len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Received response"
                );
            }
            Err(e) => {
                tracing::warn!(
                    operation = %operation,
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Request failed"
                );
            }
        }

        result
    }
}

/// Records one span per attempt into a shared trace collector, named by the
/// request's operation identity.
#[derive(Clone)]
pub struct TracePolicy {
    collector: SharedCollector,
}

impl TracePolicy {
    pub fn new(collector: SharedCollector) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl Policy for TracePolicy {
    async fn send(&self, ctx: &Context, request: Request, next: Next<'_>) -> Result<Response> {
        let name = request
            .operation()
            .map(|o| o.to_string())
            .unwrap_or_else(|| format!("{} {}", request.method(), request.url().path()));
        let method = request.method().to_string();
        let url = request.url().to_string();

        let mut span = self.collector.start_span(name);
        span.set_attribute("http.method", method);
        span.set_attribute("http.url", url);

        let result = next.run(ctx, request).await;

        match &result {
            Ok(response) => {
                span.set_attribute("http.status_code", response.status().as_u16());
                span.finish_ok();
            }
            Err(e) => span.finish_error(e.to_string()),
        }

        result
    }
}
