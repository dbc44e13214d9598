//! Request and response builders that cut test boilerplate.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::http::{OperationId, Request, Response};

// ============================================================================
// Request Helpers
// ============================================================================

/// A GET request to `url`.
pub fn get_request(url: &str) -> Request {
    Request::from_url(Method::GET, url).expect("fixture URL must parse")
}

/// A request tagged with `operation` (`"Client.Method"`).
pub fn operation_request(method: Method, url: &str, operation: &str) -> Request {
    Request::from_url(method, url)
        .expect("fixture URL must parse")
        .with_operation(OperationId::parse(operation).expect("fixture operation must parse"))
}

// ============================================================================
// Response Helpers
// ============================================================================

/// An empty response with `status`.
pub fn status_response(status: StatusCode) -> Response {
    Response::new(status, HeaderMap::new(), Vec::new())
}

/// A JSON response.
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    Response::json_body(status, &body).expect("fixture body must serialize")
}

/// A response carrying one extra header.
pub fn response_with_header(mut response: Response, name: &'static str, value: &str) -> Response {
    response.headers_mut().insert(
        name,
        value
            .parse::<HeaderValue>()
            .expect("fixture header value must parse"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_request() {
        let req = operation_request(Method::DELETE, "https://example.test/a", "JobsClient.Delete");
        assert_eq!(*req.method(), Method::DELETE);
        assert_eq!(req.operation().unwrap().method(), "Delete");
    }

    #[test]
    fn test_response_with_header() {
        let resp = response_with_header(status_response(StatusCode::ACCEPTED), "retry-after", "1");
        assert_eq!(resp.header("retry-after"), Some("1"));
    }
}
