use async_trait::async_trait;
use corvid_runtime::fake::{FakeFn, handler, respond, unmarshal_json};
use corvid_runtime::{Context, Request, Response, Result, Transport};

use super::{operation_method, unhandled};
use crate::birds::Bird;

/// Handlers for [`BirdsClient`](crate::BirdsClient).
#[derive(Clone, Default)]
pub struct BirdsServer {
    pub get_model: Option<FakeFn<(), Bird>>,
    pub put_model: Option<FakeFn<Bird, ()>>,
    pub get_recursive_model: Option<FakeFn<(), Bird>>,
    pub put_recursive_model: Option<FakeFn<Bird, ()>>,
    pub get_missing_discriminator: Option<FakeFn<(), Bird>>,
    pub get_wrong_discriminator: Option<FakeFn<(), Bird>>,
}

/// Serves [`BirdsServer`] as a transport.
pub struct BirdsServerTransport {
    srv: BirdsServer,
}

impl BirdsServerTransport {
    pub fn new(srv: BirdsServer) -> Self {
        Self { srv }
    }

    fn get(slot: &Option<FakeFn<(), Bird>>, operation: &str, request: &Request) -> Result<Response> {
        let f = handler(slot, operation)?;
        respond(f(()), request, &[200])
    }

    fn put(slot: &Option<FakeFn<Bird, ()>>, operation: &str, request: &Request) -> Result<Response> {
        let f = handler(slot, operation)?;
        let body: Bird = unmarshal_json(request)?;
        respond(f(body), request, &[204])
    }
}

#[async_trait]
impl Transport for BirdsServerTransport {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        ctx.check()?;
        let srv = &self.srv;
        match operation_method(&request)? {
            "GetModel" => Self::get(&srv.get_model, "GetModel", &request),
            "PutModel" => Self::put(&srv.put_model, "PutModel", &request),
            "GetRecursiveModel" => Self::get(&srv.get_recursive_model, "GetRecursiveModel", &request),
            "PutRecursiveModel" => Self::put(&srv.put_recursive_model, "PutRecursiveModel", &request),
            "GetMissingDiscriminator" => Self::get(
                &srv.get_missing_discriminator,
                "GetMissingDiscriminator",
                &request,
            ),
            "GetWrongDiscriminator" => Self::get(
                &srv.get_wrong_discriminator,
                "GetWrongDiscriminator",
                &request,
            ),
            _ => Err(unhandled(&request)),
        }
    }
}
