//! Long-running operation polling.
//!
//! A [`Poller`] is created from the response that started an operation and
//! drives it through `InProgress → {Succeeded, Failed, Canceled}`. Polling
//! requests go through the same pipeline and carry the same operation
//! identity as the initial request.
//!
//! When the operation is tracked through a status monitor
//! (`operation-location` or `azure-asyncoperation`), the monitor only
//! reports progress. Once it reports success the poller issues one more GET
//! for the final resource, chosen by [`FinalStateVia`] and the initial
//! request method.

use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::http::{OperationId, Request, Response};
use crate::pipeline::Pipeline;

/// Header naming the status monitor URL.
pub const OPERATION_LOCATION_HEADER: &str = "operation-location";

/// Legacy status monitor header.
pub const AZURE_ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Header naming the resource, polled when no status monitor is sent.
pub const LOCATION_HEADER: &str = "location";

/// Status monitor body field naming the final resource.
pub const RESOURCE_LOCATION_FIELD: &str = "resourceLocation";

/// Default delay between polls.
const DEFAULT_FREQUENCY_SECS: u64 = 30;

/// Operation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl PollState {
    /// Whether the operation has finished.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::InProgress)
    }

    /// Map a service status string. Anything unrecognized is in progress.
    fn from_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "succeeded" => PollState::Succeeded,
            "failed" => PollState::Failed,
            "canceled" | "cancelled" => PollState::Canceled,
            _ => PollState::InProgress,
        }
    }

    /// State named by the body's `status` or `properties.provisioningState`.
    fn from_body(response: &Response) -> Option<Self> {
        let body: Value = serde_json::from_slice(response.body()).ok()?;
        body.get("status")
            .or_else(|| body.get("properties").and_then(|p| p.get("provisioningState")))
            .and_then(Value::as_str)
            .map(PollState::from_status)
    }

    /// State carried by a status response.
    fn from_response(response: &Response) -> Self {
        if !response.status().is_success() {
            return PollState::Failed;
        }
        match PollState::from_body(response) {
            Some(state) => state,
            None if response.status().as_u16() == 202 => PollState::InProgress,
            None => PollState::Succeeded,
        }
    }
}

/// Where the result of a status-monitored operation is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinalStateVia {
    /// The status monitor body holds the result; no final GET for POST.
    AzureAsyncOperation,
    /// GET the `location` header of the initial response.
    Location,
    /// GET the URL of the initial request.
    OriginalUri,
    /// GET the monitor's `resourceLocation`, else use the monitor body.
    OperationLocation,
}

impl FromStr for FinalStateVia {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "azure-async-operation" => Ok(FinalStateVia::AzureAsyncOperation),
            "location" => Ok(FinalStateVia::Location),
            "original-uri" => Ok(FinalStateVia::OriginalUri),
            "operation-location" => Ok(FinalStateVia::OperationLocation),
            other => Err(RuntimeError::Config(format!(
                "unknown final-state-via '{}'",
                other
            ))),
        }
    }
}

/// How progress is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Tracking {
    /// A status monitor URL from `operation-location` or `azure-asyncoperation`.
    StatusMonitor,
    /// The `location` header, which serves the resource once done.
    Location,
    /// The original request URL.
    Body,
}

/// Options for [`Poller::poll_until_done`].
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Delay between polls when the service suggests none.
    pub frequency: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            frequency: Duration::from_secs(DEFAULT_FREQUENCY_SECS),
        }
    }
}

impl PollOptions {
    pub fn with_frequency(frequency: Duration) -> Self {
        Self { frequency }
    }
}

/// Serialized form of an in-progress poller.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeState {
    operation: Option<String>,
    method: String,
    original_url: String,
    poll_url: String,
    location: Option<String>,
    tracking: Tracking,
    final_state_via: Option<FinalStateVia>,
    state: PollState,
}

/// Tracks a long-running operation until it reaches a terminal state.
pub struct Poller<T> {
    pipeline: Pipeline,
    operation: Option<OperationId>,
    method: Method,
    original_url: Url,
    poll_url: Url,
    location: Option<Url>,
    tracking: Tracking,
    final_state_via: Option<FinalStateVia>,
    state: PollState,
    // Succeeded through a status monitor, final resource not fetched yet.
    final_pending: bool,
    last: Option<Response>,
    _result: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Poller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("operation", &self.operation)
            .field("method", &self.method)
            .field("poll_url", &self.poll_url.as_str())
            .field("final_state_via", &self.final_state_via)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> Poller<T> {
    /// Start tracking an operation from the response to `request`.
    ///
    /// A non-success initial response is returned as a service error.
    pub fn from_response(pipeline: Pipeline, request: &Request, response: Response) -> Result<Self> {
        if !response.status().is_success() {
            return Err(RuntimeError::Service(response.into_service_error()));
        }

        let join = |url: &str| {
            request
                .url()
                .join(url)
                .map_err(|e| RuntimeError::Config(format!("invalid poll URL '{}': {}", url, e)))
        };
        let location = response.header(LOCATION_HEADER).map(join).transpose()?;
        let monitor = [OPERATION_LOCATION_HEADER, AZURE_ASYNC_OPERATION_HEADER]
            .into_iter()
            .find_map(|name| response.header(name));

        let (tracking, poll_url) = match (monitor, &location) {
            (Some(url), _) => (Tracking::StatusMonitor, join(url)?),
            (None, Some(location)) => (Tracking::Location, location.clone()),
            (None, None) => (Tracking::Body, request.url().clone()),
        };

        let state = match tracking {
            Tracking::StatusMonitor => PollState::from_body(&response).unwrap_or(PollState::InProgress),
            _ => PollState::from_response(&response),
        };
        tracing::debug!(
            operation = ?request.operation().map(|o| o.to_string()),
            poll_url = %poll_url,
            tracking = ?tracking,
            state = ?state,
            "Created poller"
        );

        Ok(Self {
            pipeline,
            operation: request.operation().cloned(),
            method: request.method().clone(),
            original_url: request.url().clone(),
            poll_url,
            location,
            tracking,
            final_state_via: None,
            state,
            final_pending: tracking == Tracking::StatusMonitor && state == PollState::Succeeded,
            last: Some(response),
            _result: PhantomData,
        })
    }

    /// Choose where the final resource is read from once a status monitor
    /// reports success. Without it the initial method decides: PUT and PATCH
    /// read the original URL, POST reads `location` when one was sent.
    pub fn with_final_state_via(mut self, via: FinalStateVia) -> Self {
        self.final_state_via = Some(via);
        self
    }

    /// Rebuild a poller from [`Poller::resume_token`].
    pub fn resume(pipeline: Pipeline, token: &str) -> Result<Self> {
        let invalid = |e: &dyn std::fmt::Display| RuntimeError::InvalidResumeToken(e.to_string());
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|e| invalid(&e))?;
        let saved: ResumeState = serde_json::from_slice(&bytes).map_err(|e| invalid(&e))?;
        if saved.state.is_terminal() {
            return Err(RuntimeError::InvalidResumeToken(format!(
                "operation already {:?}",
                saved.state
            )));
        }

        let operation = saved
            .operation
            .as_deref()
            .map(OperationId::parse)
            .transpose()
            .map_err(|e| invalid(&e))?;
        let method = Method::from_bytes(saved.method.as_bytes()).map_err(|e| invalid(&e))?;
        let original_url = Url::parse(&saved.original_url).map_err(|e| invalid(&e))?;
        let poll_url = Url::parse(&saved.poll_url).map_err(|e| invalid(&e))?;
        let location = saved
            .location
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| invalid(&e))?;

        Ok(Self {
            pipeline,
            operation,
            method,
            original_url,
            poll_url,
            location,
            tracking: saved.tracking,
            final_state_via: saved.final_state_via,
            state: saved.state,
            final_pending: false,
            last: None,
            _result: PhantomData,
        })
    }

    /// Current state.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Whether the operation has finished.
    pub fn done(&self) -> bool {
        self.state.is_terminal()
    }

    /// The URL polled for status.
    pub fn poll_url(&self) -> &Url {
        &self.poll_url
    }

    /// Opaque token that [`Poller::resume`] accepts. Fails once terminal.
    pub fn resume_token(&self) -> Result<String> {
        if self.done() {
            return Err(RuntimeError::InvalidResumeToken(
                "a terminal poller cannot be resumed".to_string(),
            ));
        }
        let saved = ResumeState {
            operation: self.operation.as_ref().map(|o| o.to_string()),
            method: self.method.to_string(),
            original_url: self.original_url.to_string(),
            poll_url: self.poll_url.to_string(),
            location: self.location.as_ref().map(Url::to_string),
            tracking: self.tracking,
            final_state_via: self.final_state_via,
            state: self.state,
        };
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(&saved)?))
    }

    /// Issue one status request and update the state. A status monitor that
    /// reports success is followed by the GET for the final resource.
    ///
    /// A terminal poller returns its state without a status request.
    pub async fn poll(&mut self, ctx: &Context) -> Result<PollState> {
        if self.done() {
            if self.final_pending {
                self.fetch_final(ctx).await?;
            }
            return Ok(self.state);
        }
        ctx.check()?;

        let response = self.pipeline.send(ctx, &self.get(self.poll_url.clone())).await?;

        self.state = PollState::from_response(&response);
        tracing::debug!(
            poll_url = %self.poll_url,
            status = response.status().as_u16(),
            state = ?self.state,
            "Polled operation"
        );
        self.last = Some(response);

        if self.tracking == Tracking::StatusMonitor && self.state == PollState::Succeeded {
            self.final_pending = true;
            self.fetch_final(ctx).await?;
        }
        Ok(self.state)
    }

    /// Poll until the operation finishes, then return its result.
    ///
    /// Waits for the service's `Retry-After` when present, otherwise
    /// `options.frequency`. Cancellation interrupts the wait and no further
    /// request is issued.
    pub async fn poll_until_done(&mut self, ctx: &Context, options: PollOptions) -> Result<T> {
        while !self.done() {
            let delay = self
                .last
                .as_ref()
                .and_then(Response::retry_after)
                .unwrap_or(options.frequency);
            ctx.sleep(delay).await?;
            self.poll(ctx).await?;
        }
        if self.final_pending {
            self.fetch_final(ctx).await?;
        }
        self.result()
    }

    /// The final outcome of a finished operation.
    pub fn result(&self) -> Result<T> {
        match self.state {
            PollState::Succeeded if self.final_pending => Err(RuntimeError::Config(
                "final resource has not been fetched; call poll".to_string(),
            )),
            PollState::Succeeded => {
                let body = self.last.as_ref().map(|r| r.body().as_ref()).unwrap_or_default();
                if body.iter().all(u8::is_ascii_whitespace) {
                    Ok(serde_json::from_value(Value::Null)?)
                } else {
                    Ok(serde_json::from_slice(body)?)
                }
            }
            PollState::Failed => Err(RuntimeError::OperationFailed(self.failure_message())),
            PollState::Canceled => Err(RuntimeError::OperationCanceled),
            PollState::InProgress => Err(RuntimeError::Config(
                "long-running operation has not finished".to_string(),
            )),
        }
    }

    fn get(&self, url: Url) -> Request {
        let request = Request::new(Method::GET, url);
        match &self.operation {
            Some(operation) => request.with_operation(operation.clone()),
            None => request,
        }
    }

    /// URL of the final resource after a status monitor reported success.
    /// `None` means the monitor body is the result.
    fn final_url(&self) -> Option<Url> {
        let updates_resource = self.method == Method::PUT || self.method == Method::PATCH;
        match self.final_state_via {
            _ if self.method == Method::DELETE => None,
            Some(FinalStateVia::OriginalUri) => Some(self.original_url.clone()),
            Some(FinalStateVia::Location) => self
                .location
                .clone()
                .or_else(|| updates_resource.then(|| self.original_url.clone())),
            Some(FinalStateVia::OperationLocation) => {
                let body: Value = serde_json::from_slice(self.last.as_ref()?.body()).ok()?;
                let link = body.get(RESOURCE_LOCATION_FIELD)?.as_str()?;
                self.poll_url.join(link).ok()
            }
            Some(FinalStateVia::AzureAsyncOperation) => {
                updates_resource.then(|| self.original_url.clone())
            }
            None if updates_resource => Some(self.original_url.clone()),
            None if self.method == Method::POST => self.location.clone(),
            None => None,
        }
    }

    async fn fetch_final(&mut self, ctx: &Context) -> Result<()> {
        let Some(url) = self.final_url() else {
            self.final_pending = false;
            return Ok(());
        };
        ctx.check()?;

        let response = self.pipeline.send(ctx, &self.get(url.clone())).await?;
        if !response.status().is_success() {
            return Err(RuntimeError::Service(response.into_service_error()));
        }
        tracing::debug!(
            url = %url,
            status = response.status().as_u16(),
            "Fetched final resource"
        );
        self.last = Some(response);
        self.final_pending = false;
        Ok(())
    }

    fn failure_message(&self) -> String {
        let Some(response) = &self.last else {
            return "operation failed".to_string();
        };
        let error = response.clone().into_service_error();
        match (error.code, error.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code,
            (None, Some(message)) => message,
            (None, None) => format!("status {}", error.status),
        }
    }
}
