//! Canned responses returned by fake handlers.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::error::{Result, RuntimeError};
use crate::fake::pager::PagerResponder;
use crate::fake::poller::PollerResponder;
use crate::http::{ERROR_CODE_HEADER, Request, Response};

/// What a fake handler returns: a success responder or an error responder,
/// never both.
pub type FakeResult<T> = std::result::Result<Responder<T>, ErrorResponder>;

/// A fake handler for a plain operation. `A` carries the parsed arguments.
pub type FakeFn<A, T> = Arc<dyn Fn(A) -> FakeResult<T> + Send + Sync>;

/// A fake handler for a paged operation.
pub type FakePagerFn<A, P> = Arc<dyn Fn(A) -> PagerResponder<P> + Send + Sync>;

/// A fake handler for a long-running operation.
pub type FakePollerFn<A, T> =
    Arc<dyn Fn(A) -> std::result::Result<PollerResponder<T>, ErrorResponder> + Send + Sync>;

/// Wrap a closure as a plain operation handler.
pub fn fake_fn<A, T>(f: impl Fn(A) -> FakeResult<T> + Send + Sync + 'static) -> Option<FakeFn<A, T>> {
    Some(Arc::new(f))
}

/// Wrap a closure as a paged operation handler.
pub fn pager_fn<A, P>(f: impl Fn(A) -> PagerResponder<P> + Send + Sync + 'static) -> Option<FakePagerFn<A, P>> {
    Some(Arc::new(f))
}

/// Wrap a closure as a long-running operation handler.
pub fn poller_fn<A, T>(
    f: impl Fn(A) -> std::result::Result<PollerResponder<T>, ErrorResponder> + Send + Sync + 'static,
) -> Option<FakePollerFn<A, T>> {
    Some(Arc::new(f))
}

// ─────────────────────────────────────────────────────────────────────────────
// Success
// ─────────────────────────────────────────────────────────────────────────────

/// A successful fake response: status, headers and an optional typed body.
#[derive(Debug, Clone)]
pub struct Responder<T> {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Option<T>,
}

impl<T> Responder<T> {
    /// Respond with `status` and `body`.
    pub fn new(status: StatusCode, body: T) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Respond with `status` and no body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Render as a response with a JSON body.
    pub fn into_response(self) -> Result<Response>
    where
        T: Serialize,
    {
        let mut response = match &self.body {
            Some(body) => Response::json_body(self.status, body)?,
            None => Response::new(self.status, HeaderMap::new(), Vec::new()),
        };
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RuntimeError::InvalidResponder(format!("header '{}': {}", name, e)))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| RuntimeError::InvalidResponder(format!("header value: {}", e)))?;
            response.headers_mut().insert(name, value);
        }
        Ok(response)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ErrorSource {
    Status {
        status: StatusCode,
        code: Option<String>,
    },
    Error(RuntimeError),
}

/// A failing fake response: a service error by status and code, or an
/// arbitrary error returned from the transport.
///
/// An `ErrorResponder` with neither is a configuration mistake and fails
/// with [`RuntimeError::InvalidResponder`].
#[derive(Debug, Default)]
pub struct ErrorResponder {
    source: Option<ErrorSource>,
}

impl ErrorResponder {
    /// An empty responder; sending it fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// A service error response with `status`.
    pub fn status(status: StatusCode) -> Self {
        Self {
            source: Some(ErrorSource::Status { status, code: None }),
        }
    }

    /// A service error response with `status` and an error code.
    pub fn status_with_code(status: StatusCode, code: impl Into<String>) -> Self {
        Self {
            source: Some(ErrorSource::Status {
                status,
                code: Some(code.into()),
            }),
        }
    }

    /// Fail the transport call with `error`.
    pub fn error(error: RuntimeError) -> Self {
        Self {
            source: Some(ErrorSource::Error(error)),
        }
    }

    /// Whether anything was configured.
    pub fn is_set(&self) -> bool {
        self.source.is_some()
    }

    /// Render as an error response, or return the configured error.
    pub fn into_response(self, request: &Request) -> Result<Response> {
        match self.source {
            Some(ErrorSource::Status { status, code }) => {
                let message = format!(
                    "fake error for {} {}",
                    request.method(),
                    request.url().path()
                );
                let body = serde_json::json!({
                    "error": {
                        "code": code.clone().unwrap_or_else(|| status.as_u16().to_string()),
                        "message": message,
                    }
                });
                let mut response = Response::json_body(status, &body)?;
                if let Some(code) = code {
                    let value = code
                        .parse::<HeaderValue>()
                        .map_err(|e| RuntimeError::InvalidResponder(format!("error code: {}", e)))?;
                    response.headers_mut().insert(ERROR_CODE_HEADER, value);
                }
                Ok(response)
            }
            Some(ErrorSource::Error(error)) => Err(error),
            None => Err(RuntimeError::InvalidResponder(
                "ErrorResponder has neither a status nor an error".to_string(),
            )),
        }
    }
}
