//! Error types for the corvid runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors produced anywhere in the request pipeline.
///
/// Nothing in this crate swallows one of these. Use [`RuntimeError::kind`] to
/// tell configuration mistakes, transport failures, decoding failures and
/// cancellation apart.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The request carried no operation identity, so a fake transport cannot route it.
    #[error("unable to dispatch request: missing operation identity")]
    MissingDispatchKey,

    /// No fake server is registered for the client named in the operation identity.
    #[error("unhandled client {0}")]
    UnhandledClient(String),

    /// The fake server for the client has no method with this name.
    #[error("unhandled API {0}")]
    UnhandledOperation(String),

    /// The fake for this operation was never configured.
    #[error("fake for method {operation} not implemented")]
    NotImplemented { operation: String },

    /// A fake responder was configured inconsistently.
    #[error("invalid responder: {0}")]
    InvalidResponder(String),

    /// A fake responder returned a status the operation does not accept.
    #[error("unexpected status code {status}. acceptable values are {}", format_statuses(.expected))]
    UnexpectedStatus { status: u16, expected: Vec<u16> },

    /// An operation identity string was not of the form `Client.Method`.
    #[error("invalid operation identity '{0}': expected <Client>.<Method>")]
    InvalidOperationId(String),

    /// A poller resume token could not be decoded.
    #[error("invalid resume token: {0}")]
    InvalidResumeToken(String),

    /// `next_page` was called on a pager with no more pages.
    #[error("no more pages")]
    PagerExhausted,

    /// Invalid client or pipeline configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure before a response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("{}", .0)]
    Service(ServiceError),

    /// A payload could not be deserialized into the chosen type.
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    /// A fixed variant set saw a discriminator value it does not know.
    #[error("unknown discriminator value {value:?} for field '{field}'")]
    UnknownDiscriminator { field: String, value: Option<String> },

    /// The caller cancelled the call.
    #[error("context canceled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A long-running operation reached the `Failed` state.
    #[error("long-running operation failed: {0}")]
    OperationFailed(String),

    /// A long-running operation reached the `Canceled` state.
    #[error("long-running operation was canceled")]
    OperationCanceled,
}

/// Broad classification of a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer/test-author mistakes. Fatal to the call, never retried.
    Configuration,
    /// Network failures and non-success service responses.
    Transport,
    /// Structurally invalid payloads.
    Decoding,
    /// Caller-initiated cancellation or deadline expiry.
    Cancellation,
    /// A long-running operation ended unsuccessfully.
    Operation,
}

/// A non-success HTTP response mapped to an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    /// HTTP status code.
    pub status: u16,
    /// Service error code from the `x-ms-error-code` header or the body.
    pub code: Option<String>,
    /// Human-readable message from the body, if any.
    pub message: Option<String>,
    /// Raw response body, kept for diagnostics.
    pub body: String,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service returned status {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, " ({})", code)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl RuntimeError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::MissingDispatchKey
            | RuntimeError::UnhandledClient(_)
            | RuntimeError::UnhandledOperation(_)
            | RuntimeError::NotImplemented { .. }
            | RuntimeError::InvalidResponder(_)
            | RuntimeError::UnexpectedStatus { .. }
            | RuntimeError::InvalidOperationId(_)
            | RuntimeError::InvalidResumeToken(_)
            | RuntimeError::PagerExhausted
            | RuntimeError::Config(_) => ErrorKind::Configuration,
            RuntimeError::Network(_) | RuntimeError::Service(_) => ErrorKind::Transport,
            RuntimeError::Decode(_) | RuntimeError::UnknownDiscriminator { .. } => {
                ErrorKind::Decoding
            }
            RuntimeError::Cancelled | RuntimeError::DeadlineExceeded => ErrorKind::Cancellation,
            RuntimeError::OperationFailed(_) | RuntimeError::OperationCanceled => {
                ErrorKind::Operation
            }
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Only network failures and 408/429/5xx service responses qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            RuntimeError::Network(_) => true,
            RuntimeError::Service(e) => is_retryable_status(e.status),
            _ => false,
        }
    }

    /// Whether this is a cancellation or deadline error.
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// HTTP status carried by a service error.
    pub fn status(&self) -> Option<u16> {
        match self {
            RuntimeError::Service(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Status codes worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn format_statuses(statuses: &[u16]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<reqwest::Error> for RuntimeError {
    fn from(e: reqwest::Error) -> Self {
        RuntimeError::Network(e.to_string())
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::Network(e.to_string())
    }
}
