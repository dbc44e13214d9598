//! Helpers shared by per-client fake server transports.

use std::collections::HashMap;

use regex::Regex;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, RuntimeError};
use crate::fake::responder::FakeResult;
use crate::http::{Request, Response};

/// Borrow a configured handler, or fail because the fake was never set.
pub fn handler<'a, H: ?Sized>(slot: &'a Option<std::sync::Arc<H>>, operation: &str) -> Result<&'a H> {
    slot.as_deref().ok_or_else(|| RuntimeError::NotImplemented {
        operation: operation.to_string(),
    })
}

/// Fail unless `status` is one of the operation's success codes.
pub fn check_status(status: StatusCode, accepted: &[u16]) -> Result<()> {
    if accepted.contains(&status.as_u16()) {
        Ok(())
    } else {
        Err(RuntimeError::UnexpectedStatus {
            status: status.as_u16(),
            expected: accepted.to_vec(),
        })
    }
}

/// Turn a handler outcome into a response.
///
/// Success responders are validated against `accepted`; error responders
/// pass through as error responses.
pub fn respond<T: Serialize>(
    outcome: FakeResult<T>,
    request: &Request,
    accepted: &[u16],
) -> Result<Response> {
    match outcome {
        Ok(responder) => {
            check_status(responder.status(), accepted)?;
            responder.into_response()
        }
        Err(error) => error.into_response(request),
    }
}

/// Deserialize the request's JSON body.
pub fn unmarshal_json<T: DeserializeOwned>(request: &Request) -> Result<T> {
    request.json()
}

/// Named path segments captured by a route regex, percent-decoded.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    values: HashMap<String, String>,
}

impl PathParams {
    /// Match `regex` against the request's (still escaped) path.
    pub fn parse(regex: &Regex, request: &Request) -> Result<Self> {
        let path = request.url().path();
        let captures = regex
            .captures(path)
            .ok_or_else(|| RuntimeError::Config(format!("failed to parse path {}", path)))?;

        let mut values = HashMap::new();
        for name in regex.capture_names().flatten() {
            if let Some(m) = captures.name(name) {
                let decoded = urlencoding::decode(m.as_str()).map_err(|e| {
                    RuntimeError::Config(format!("invalid path segment '{}': {}", name, e))
                })?;
                values.insert(name.to_string(), decoded.into_owned());
            }
        }
        Ok(Self { values })
    }

    /// A captured value.
    pub fn get(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RuntimeError::Config(format!("missing path parameter '{}'", name)))
    }
}
