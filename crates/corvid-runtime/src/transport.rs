//! The transport seam: the last stage of every pipeline.
//!
//! A [`Transport`] turns a [`Request`] into a [`Response`]. The production
//! implementation is [`ReqwestTransport`]; fake server transports and the
//! test mocks implement the same trait so clients cannot tell them apart.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::http::{Request, Response};

/// Default timeout for a single HTTP exchange.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Sends one request and returns one response.
///
/// Implementations must be safe to share across tasks; a pipeline holds a
/// single transport for its whole lifetime.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the exchange. Must honour `ctx` cancellation.
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response>;
}

/// A transport shared between pipelines and clients.
pub type SharedTransport = Arc<dyn Transport>;

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        (**self).send(ctx, request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        (**self).send(ctx, request).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// reqwest transport
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestConfig {
    /// Total timeout for one exchange.
    pub timeout: Duration,

    /// Timeout for establishing a connection.
    pub connect_timeout: Option<Duration>,

    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for ReqwestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: None,
            user_agent: concat!("corvid/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ReqwestConfig {
    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Transport backed by a real HTTP client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: ReqwestConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent);
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RuntimeError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn exchange(&self, request: Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Response::new(status, headers, body))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        ctx.run(self.exchange(request)).await
    }
}
