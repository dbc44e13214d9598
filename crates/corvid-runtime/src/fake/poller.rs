//! Scripted long-running-operation responses.

use std::collections::VecDeque;

use reqwest::StatusCode;
use reqwest::header::HeaderValue;
use serde::Serialize;

use crate::error::{Result, RuntimeError};
use crate::fake::responder::ErrorResponder;
use crate::fake::tracker::{FAKE_POLL_SUFFIX, sanitize_path};
use crate::http::{Request, Response};
use crate::poller::OPERATION_LOCATION_HEADER;

#[derive(Debug)]
enum Step {
    InProgress(StatusCode),
    Error(ErrorResponder),
}

#[derive(Debug)]
enum Terminal<T> {
    Result { status: StatusCode, result: T },
    Failed { status: StatusCode, code: String },
}

/// Non-terminal responses followed by one terminal outcome.
///
/// Every non-terminal response carries `{"status": "InProgress"}` and an
/// `operation-location` header that leads the client's poller back to the
/// same fake.
#[derive(Debug)]
pub struct PollerResponder<T> {
    steps: VecDeque<Step>,
    terminal: Option<Terminal<T>>,
}

impl<T> Default for PollerResponder<T> {
    fn default() -> Self {
        Self {
            steps: VecDeque::new(),
            terminal: None,
        }
    }
}

impl<T> PollerResponder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an in-progress response.
    pub fn add_non_terminal(&mut self, status: StatusCode) {
        self.steps.push_back(Step::InProgress(status));
    }

    /// Append a transient error returned while polling.
    pub fn add_polling_error(&mut self, error: ErrorResponder) {
        self.steps.push_back(Step::Error(error));
    }

    /// Finish with a successful result.
    pub fn set_terminal_response(&mut self, status: StatusCode, result: T) {
        self.terminal = Some(Terminal::Result { status, result });
    }

    /// Finish with a failed operation.
    pub fn set_terminal_error(&mut self, status: StatusCode, code: impl Into<String>) {
        self.terminal = Some(Terminal::Failed {
            status,
            code: code.into(),
        });
    }

    /// Builder form of [`add_non_terminal`](Self::add_non_terminal).
    pub fn with_non_terminal(mut self, status: StatusCode) -> Self {
        self.add_non_terminal(status);
        self
    }

    /// Builder form of [`set_terminal_response`](Self::set_terminal_response).
    pub fn with_terminal_response(mut self, status: StatusCode, result: T) -> Self {
        self.set_terminal_response(status, result);
        self
    }

    /// Builder form of [`set_terminal_error`](Self::set_terminal_error).
    pub fn with_terminal_error(mut self, status: StatusCode, code: impl Into<String>) -> Self {
        self.set_terminal_error(status, code);
        self
    }

    /// Whether responses remain.
    pub fn more(&self) -> bool {
        !self.steps.is_empty() || self.terminal.is_some()
    }

    /// Return the next scripted response.
    pub fn next(&mut self, request: &Request) -> Result<Response>
    where
        T: Serialize,
    {
        if let Some(step) = self.steps.pop_front() {
            return match step {
                Step::InProgress(status) => in_progress(status, request),
                Step::Error(error) => error.into_response(request),
            };
        }

        match self.terminal.take() {
            Some(Terminal::Result { status, result }) => Response::json_body(status, &result),
            Some(Terminal::Failed { status, code }) => {
                let body = serde_json::json!({
                    "status": "Failed",
                    "error": {
                        "code": code,
                        "message": format!("fake operation at {} failed", request.url().path()),
                    }
                });
                Response::json_body(status, &body)
            }
            None => Err(RuntimeError::InvalidResponder(
                "PollerResponder has no terminal response".to_string(),
            )),
        }
    }
}

fn in_progress(status: StatusCode, request: &Request) -> Result<Response> {
    let mut poll_url = request.url().clone();
    poll_url.set_query(None);
    poll_url.set_path(&format!(
        "{}{}",
        sanitize_path(request.url().path()),
        FAKE_POLL_SUFFIX
    ));

    let mut response = Response::json_body(status, &serde_json::json!({"status": "InProgress"}))?;
    let location = HeaderValue::from_str(poll_url.as_str())
        .map_err(|e| RuntimeError::InvalidResponder(format!("poll URL: {}", e)))?;
    response
        .headers_mut()
        .insert(OPERATION_LOCATION_HEADER, location);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::get_request;

    #[test]
    fn test_in_progress_then_result() {
        let request = get_request("https://fake.test/jobs/7");
        let mut poller = PollerResponder::new()
            .with_non_terminal(StatusCode::ACCEPTED)
            .with_terminal_response(StatusCode::OK, serde_json::json!({"id": "7"}));

        let first = poller.next(&request).unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        assert_eq!(
            first.header(OPERATION_LOCATION_HEADER),
            Some("https://fake.test/jobs/7/get/fake/status")
        );
        let body: serde_json::Value = first.json().unwrap();
        assert_eq!(body["status"], "InProgress");
        assert!(poller.more());

        // Polling the status URL keeps the same location.
        let poll = get_request("https://fake.test/jobs/7/get/fake/status");
        let last = poller.next(&poll).unwrap();
        assert_eq!(last.status(), StatusCode::OK);
        assert!(!poller.more());
        assert!(poller.next(&poll).is_err());
    }

    #[test]
    fn test_terminal_error_body() {
        let request = get_request("https://fake.test/jobs/9");
        let mut poller =
            PollerResponder::<()>::new().with_terminal_error(StatusCode::OK, "QuotaExceeded");

        let response = poller.next(&request).unwrap();
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["status"], "Failed");
        assert_eq!(body["error"]["code"], "QuotaExceeded");
    }
}
