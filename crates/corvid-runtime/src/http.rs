//! Request, response and operation identity types.
//!
//! These are the values that flow through the pipeline. A [`Request`] carries
//! its [`OperationId`] explicitly as request-scoped metadata instead of in any
//! ambient context, so fake transports and tracing read it straight off the
//! request.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, RuntimeError, ServiceError};

/// Separator between client and method in an operation identity.
pub const OPERATION_SEPARATOR: char = '.';

/// Header carrying the service error code.
pub const ERROR_CODE_HEADER: &str = "x-ms-error-code";

// ─────────────────────────────────────────────────────────────────────────────
// Operation identity
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of the generated client method that issued a request,
/// rendered as `"<Client>.<Method>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    client: String,
    method: String,
}

impl OperationId {
    /// Build an identity from its parts.
    ///
    /// Fails if the client name is empty or contains the separator.
    pub fn new(client: impl Into<String>, method: impl Into<String>) -> Result<Self> {
        let client = client.into();
        let method = method.into();
        if client.is_empty() || method.is_empty() || client.contains(OPERATION_SEPARATOR) {
            return Err(RuntimeError::InvalidOperationId(format!(
                "{}{}{}",
                client, OPERATION_SEPARATOR, method
            )));
        }
        Ok(Self { client, method })
    }

    /// Parse `"Client.Method"`, splitting on the first separator.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(OPERATION_SEPARATOR) {
            Some((client, method)) => Self::new(client, method),
            None => Err(RuntimeError::InvalidOperationId(s.to_string())),
        }
    }

    /// The client type name, e.g. `"BirdsClient"`.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// The method name, e.g. `"GetModel"`.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.client, OPERATION_SEPARATOR, self.method)
    }
}

impl FromStr for OperationId {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// An HTTP request plus its operation identity.
///
/// Cloning is cheap: the body is reference-counted. Policies receive their
/// own copy, so edits never reach the caller's value.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
    operation: Option<OperationId>,
}

impl Request {
    /// Create a request with an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            operation: None,
        }
    }

    /// Create a request by parsing `url`.
    pub fn from_url(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| RuntimeError::Config(format!("invalid URL '{}': {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    /// Tag the request with the operation that issued it.
    pub fn with_operation(mut self, operation: OperationId) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Set a header, replacing any existing value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.set_header(name, value)?;
        Ok(self)
    }

    /// Set a JSON body and the matching content type.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Bytes::from(serde_json::to_vec(body)?);
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    /// Set a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The operation identity, if the request was tagged.
    pub fn operation(&self) -> Option<&OperationId> {
        self.operation.as_ref()
    }

    /// Set a header from strings, replacing any existing value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RuntimeError::Config(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RuntimeError::Config(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// A header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Whether resending this request cannot change server state beyond the
    /// first attempt.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// An HTTP response. The caller owns the body; it is released on drop.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Create a JSON response.
    pub fn json_body<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(Self::new(status, headers, serde_json::to_vec(body)?))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and take the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// A header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Server-suggested delay from `retry-after-ms`, `x-ms-retry-after-ms`
    /// or `Retry-After` (delay-seconds or an HTTP-date). A date already in
    /// the past means no delay.
    pub fn retry_after(&self) -> Option<Duration> {
        for name in ["retry-after-ms", "x-ms-retry-after-ms"] {
            if let Some(ms) = self.header(name).and_then(|v| v.trim().parse::<u64>().ok()) {
                return Some(Duration::from_millis(ms));
            }
        }
        let value = self.header("retry-after")?.trim();
        if let Ok(secs) = value.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
        Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Pass the response through if its status is one of `accepted`,
    /// otherwise convert it into a [`RuntimeError::Service`].
    pub fn ensure_status(self, accepted: &[u16]) -> Result<Self> {
        if accepted.contains(&self.status.as_u16()) {
            Ok(self)
        } else {
            Err(RuntimeError::Service(self.into_service_error()))
        }
    }

    /// Describe this response as a service error.
    pub fn into_service_error(self) -> ServiceError {
        let body = String::from_utf8_lossy(&self.body).into_owned();
        let parsed: Option<serde_json::Value> = serde_json::from_slice(&self.body).ok();
        let error_obj = parsed.as_ref().and_then(|v| v.get("error"));

        let code = self
            .header(ERROR_CODE_HEADER)
            .map(str::to_string)
            .or_else(|| {
                error_obj
                    .and_then(|e| e.get("code"))
                    .and_then(|c| c.as_str())
                    .map(str::to_string)
            });
        let message = error_obj
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string);

        ServiceError {
            status: self.status.as_u16(),
            code,
            message,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_parse() {
        let op = OperationId::parse("BirdsClient.GetModel").unwrap();
        assert_eq!(op.client(), "BirdsClient");
        assert_eq!(op.method(), "GetModel");
        assert_eq!(op.to_string(), "BirdsClient.GetModel");
    }

    #[test]
    fn test_operation_id_splits_on_first_separator() {
        let op: OperationId = "JobsClient.Begin.Create".parse().unwrap();
        assert_eq!(op.client(), "JobsClient");
        assert_eq!(op.method(), "Begin.Create");
    }

    #[test]
    fn test_operation_id_rejects_malformed() {
        assert!(OperationId::parse("NoSeparator").is_err());
        assert!(OperationId::parse(".Method").is_err());
        assert!(OperationId::parse("Client.").is_err());
        assert!(OperationId::new("Bad.Client", "Get").is_err());
    }

    #[test]
    fn test_request_json_round_trip() {
        let req = Request::from_url(Method::PUT, "https://example.test/widgets/1")
            .unwrap()
            .with_json(&serde_json::json!({"name": "sprocket"}))
            .unwrap();

        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: serde_json::Value = req.json().unwrap();
        assert_eq!(body["name"], "sprocket");
        assert!(req.is_idempotent());
        assert!(req.operation().is_none());
    }

    #[test]
    fn test_post_is_not_idempotent() {
        let req = Request::from_url(Method::POST, "https://example.test/jobs").unwrap();
        assert!(!req.is_idempotent());
    }

    #[test]
    fn test_retry_after_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        let resp = Response::new(StatusCode::TOO_MANY_REQUESTS, headers, Bytes::new());
        assert_eq!(resp.retry_after(), Some(Duration::from_secs(3)));

        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        headers.insert("retry-after", HeaderValue::from_static("3"));
        let resp = Response::new(StatusCode::ACCEPTED, headers, Bytes::new());
        assert_eq!(resp.retry_after(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let retry_after = |value: &str| {
            let mut headers = HeaderMap::new();
            headers.insert("retry-after", value.parse::<HeaderValue>().unwrap());
            Response::new(StatusCode::SERVICE_UNAVAILABLE, headers, Bytes::new()).retry_after()
        };

        let later = (Utc::now() + chrono::Duration::seconds(120))
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let delay = retry_after(&later).unwrap();
        assert!(delay > Duration::from_secs(100) && delay <= Duration::from_secs(120));

        assert_eq!(
            retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(retry_after("soon"), None);
    }

    #[test]
    fn test_ensure_status_maps_service_error() {
        let resp = Response::json_body(
            StatusCode::NOT_FOUND,
            &serde_json::json!({"error": {"code": "NotFound", "message": "missing"}}),
        )
        .unwrap();

        let err = resp.ensure_status(&[200]).unwrap_err();
        match err {
            RuntimeError::Service(e) => {
                assert_eq!(e.status, 404);
                assert_eq!(e.code.as_deref(), Some("NotFound"));
                assert_eq!(e.message.as_deref(), Some("missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
