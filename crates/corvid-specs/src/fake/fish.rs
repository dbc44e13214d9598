use async_trait::async_trait;
use corvid_runtime::fake::{FakeFn, handler, respond, unmarshal_json};
use corvid_runtime::{Context, Request, Response, Result, Transport};

use super::{operation_method, unhandled};
use crate::fish::Fish;

/// Handlers for [`FishClient`](crate::FishClient).
///
/// `get_model` answers with raw JSON so tests can serve payloads the fixed
/// `Fish` set cannot represent.
#[derive(Clone, Default)]
pub struct FishServer {
    pub get_model: Option<FakeFn<(), serde_json::Value>>,
    pub put_model: Option<FakeFn<Fish, ()>>,
}

pub struct FishServerTransport {
    srv: FishServer,
}

impl FishServerTransport {
    pub fn new(srv: FishServer) -> Self {
        Self { srv }
    }
}

#[async_trait]
impl Transport for FishServerTransport {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        ctx.check()?;
        match operation_method(&request)? {
            "GetModel" => {
                let f = handler(&self.srv.get_model, "GetModel")?;
                respond(f(()), &request, &[200])
            }
            "PutModel" => {
                let f = handler(&self.srv.put_model, "PutModel")?;
                let body: Fish = unmarshal_json(&request)?;
                respond(f(body), &request, &[204])
            }
            _ => Err(unhandled(&request)),
        }
    }
}
