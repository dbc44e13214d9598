//! Scripted transport for pipeline tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::http::{Request, Response};
use crate::testing::fixtures::status_response;
use crate::transport::Transport;

/// A transport that replays queued outcomes and records every request.
///
/// # Example
///
/// ```ignore
/// use corvid_runtime::testing::MockTransport;
///
/// let transport = MockTransport::new()
///     .with_status(StatusCode::SERVICE_UNAVAILABLE)
///     .with_status(StatusCode::OK);
///
/// // First send gets 503, second gets 200.
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<Result<Response>>>>,
    requests: Arc<Mutex<Vec<Request>>>,
    latency: Option<Duration>,
}

impl MockTransport {
    /// Create a transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn with_response(self, response: Response) -> Self {
        self.queue_response(response);
        self
    }

    /// Queue an empty response with `status`.
    pub fn with_status(self, status: StatusCode) -> Self {
        self.with_response(status_response(status))
    }

    /// Queue an error.
    pub fn with_error(self, error: RuntimeError) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(error));
        self
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a response on a shared transport.
    pub fn queue_response(&self, response: Response) {
        self.outcomes.lock().unwrap().push_back(Ok(response));
    }

    /// All requests received so far.
    pub fn captured_requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Assert that exactly N requests were made.
    ///
    /// # Panics
    ///
    /// Panics if the request count doesn't match.
    pub fn assert_request_count(&self, expected: usize) {
        let actual = self.request_count();
        assert_eq!(
            actual, expected,
            "Expected {} requests, but got {}",
            expected, actual
        );
    }

    /// Outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        self.requests.lock().unwrap().push(request);

        if let Some(latency) = self.latency {
            ctx.sleep(latency).await?;
        }

        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(RuntimeError::Config(
                "MockTransport: no more responses queued".to_string(),
            ))
        })
    }
}
