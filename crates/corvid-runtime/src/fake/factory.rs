//! Routing from operation identity to per-client fake transports.

use std::sync::OnceLock;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::http::{Request, Response};
use crate::transport::{SharedTransport, Transport};

/// The closed set of clients a server factory can route to.
///
/// Implemented by a plain enum, one variant per client type.
pub trait ClientKey: Copy + Send + Sync + 'static {
    /// Every key, in index order.
    const ALL: &'static [Self];

    /// Map a client type name (the part of the operation identity before
    /// the separator) to its key.
    fn from_client_name(name: &str) -> Option<Self>;

    /// Position of this key in [`ClientKey::ALL`].
    fn index(self) -> usize;

    /// The client type name.
    fn name(self) -> &'static str;
}

/// A bundle of fake servers, one per client key.
pub trait ClientSet: Send + Sync + 'static {
    type Client: ClientKey;

    /// Build the server transport for one client. Called at most once per
    /// key for the lifetime of a [`ServerFactoryTransport`].
    fn new_transport(&self, client: Self::Client) -> SharedTransport;
}

/// Transport that dispatches each request to the fake server of the client
/// that issued it.
///
/// Sub-transports are built on first use. Concurrent first dispatches to the
/// same client build it once; later dispatches take no lock.
pub struct ServerFactoryTransport<S: ClientSet> {
    servers: S,
    transports: Box<[OnceLock<SharedTransport>]>,
}

impl<S: ClientSet> ServerFactoryTransport<S> {
    /// Create a factory transport over `servers`.
    pub fn new(servers: S) -> Self {
        let transports = S::Client::ALL.iter().map(|_| OnceLock::new()).collect();
        Self {
            servers,
            transports,
        }
    }

    /// The fake servers.
    pub fn servers(&self) -> &S {
        &self.servers
    }

    fn transport_for(&self, client: S::Client) -> Result<&SharedTransport> {
        let cell = self
            .transports
            .get(client.index())
            .ok_or_else(|| RuntimeError::UnhandledClient(client.name().to_string()))?;
        Ok(cell.get_or_init(|| {
            tracing::debug!(client = client.name(), "Initializing fake server transport");
            self.servers.new_transport(client)
        }))
    }
}

#[async_trait]
impl<S: ClientSet> Transport for ServerFactoryTransport<S> {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        ctx.check()?;
        let operation = request
            .operation()
            .ok_or(RuntimeError::MissingDispatchKey)?;
        let client = S::Client::from_client_name(operation.client())
            .ok_or_else(|| RuntimeError::UnhandledClient(operation.client().to_string()))?;

        let transport = self.transport_for(client)?;
        transport.send(ctx, request).await
    }
}
