//! Fake servers for every client in this crate.
//!
//! Fill in the handlers a test needs on a [`ServerFactory`], then pass
//! [`ServerFactory::client_options`] to the client constructors. Handlers
//! left as `None` answer with a "not implemented" error.

mod birds;
mod fish;
mod jobs;
mod widgets;

use std::sync::Arc;

use corvid_runtime::fake::{ClientKey, ClientSet, PathParams, ServerFactoryTransport};
use corvid_runtime::{ClientOptions, Request, Result, RuntimeError, SharedTransport};
use regex::Regex;

pub use birds::{BirdsServer, BirdsServerTransport};
pub use fish::{FishServer, FishServerTransport};
pub use jobs::{JobsServer, JobsServerTransport};
pub use widgets::{WidgetsServer, WidgetsServerTransport};

use crate::{BirdsClient, FishClient, JobsClient, WidgetsClient};

/// One key per client in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientName {
    Birds,
    Fish,
    Jobs,
    Widgets,
}

impl ClientKey for ClientName {
    const ALL: &'static [Self] = &[
        ClientName::Birds,
        ClientName::Fish,
        ClientName::Jobs,
        ClientName::Widgets,
    ];

    fn from_client_name(name: &str) -> Option<Self> {
        match name {
            BirdsClient::NAME => Some(ClientName::Birds),
            FishClient::NAME => Some(ClientName::Fish),
            JobsClient::NAME => Some(ClientName::Jobs),
            WidgetsClient::NAME => Some(ClientName::Widgets),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            ClientName::Birds => BirdsClient::NAME,
            ClientName::Fish => FishClient::NAME,
            ClientName::Jobs => JobsClient::NAME,
            ClientName::Widgets => WidgetsClient::NAME,
        }
    }
}

/// Fake servers for all clients, routed by client name.
#[derive(Clone, Default)]
pub struct ServerFactory {
    pub birds: BirdsServer,
    pub fish: FishServer,
    pub jobs: JobsServer,
    pub widgets: WidgetsServer,
}

impl ServerFactory {
    /// A transport that serves every client from these fakes.
    pub fn into_transport(self) -> SharedTransport {
        Arc::new(ServerFactoryTransport::new(self))
    }

    /// Default client options with the fake transport installed.
    pub fn client_options(self) -> ClientOptions {
        ClientOptions::default().with_transport(self.into_transport())
    }
}

impl ClientSet for ServerFactory {
    type Client = ClientName;

    fn new_transport(&self, client: ClientName) -> SharedTransport {
        match client {
            ClientName::Birds => Arc::new(BirdsServerTransport::new(self.birds.clone())),
            ClientName::Fish => Arc::new(FishServerTransport::new(self.fish.clone())),
            ClientName::Jobs => Arc::new(JobsServerTransport::new(self.jobs.clone())),
            ClientName::Widgets => Arc::new(WidgetsServerTransport::new(self.widgets.clone())),
        }
    }
}

/// The request's operation method, or an error if it carries no identity.
fn operation_method(request: &Request) -> Result<&str> {
    request
        .operation()
        .map(|o| o.method())
        .ok_or(RuntimeError::MissingDispatchKey)
}

fn unhandled(request: &Request) -> RuntimeError {
    let name = request
        .operation()
        .map(|o| o.to_string())
        .unwrap_or_default();
    RuntimeError::UnhandledOperation(name)
}

fn path_params(pattern: &str, request: &Request) -> Result<PathParams> {
    let regex = Regex::new(pattern)
        .map_err(|e| RuntimeError::Config(format!("invalid route '{}': {}", pattern, e)))?;
    PathParams::parse(&regex, request)
}
