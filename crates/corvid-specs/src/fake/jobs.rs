use async_trait::async_trait;
use corvid_runtime::fake::{
    FakeFn, FakePollerFn, PollerResponder, Tracker, check_status, handler, respond, unmarshal_json,
};
use corvid_runtime::{Context, Request, Response, Result, Transport};

use super::{operation_method, path_params, unhandled};
use crate::jobs::{Job, JobSpec};

const JOB_ROUTE: &str = r"/jobs/(?P<jobId>[^/]+)$";

/// Handlers for [`JobsClient`](crate::JobsClient).
#[derive(Clone, Default)]
pub struct JobsServer {
    /// Receives the job id and the request body.
    pub begin_create: Option<FakePollerFn<(String, JobSpec), Job>>,
    pub get: Option<FakeFn<String, Job>>,
}

pub struct JobsServerTransport {
    srv: JobsServer,
    begin_create: Tracker<PollerResponder<Job>>,
}

impl JobsServerTransport {
    pub fn new(srv: JobsServer) -> Self {
        Self {
            srv,
            begin_create: Tracker::new(),
        }
    }

    /// Serves the initial PUT and every later status poll for a job.
    fn dispatch_begin_create(&self, request: &Request) -> Result<Response> {
        let f = handler(&self.srv.begin_create, "BeginCreate")?;
        let mut poller = match self.begin_create.take(request) {
            Some(poller) => poller,
            None => {
                let params = path_params(JOB_ROUTE, request)?;
                let spec: JobSpec = unmarshal_json(request)?;
                match f((params.get("jobId")?.to_string(), spec)) {
                    Ok(poller) => poller,
                    Err(error) => return error.into_response(request),
                }
            }
        };

        let response = poller.next(request)?;
        if response.status().is_success() {
            check_status(response.status(), &[200, 201, 202])?;
        }
        if poller.more() {
            self.begin_create.put(request, poller);
        }
        Ok(response)
    }

    fn dispatch_get(&self, request: &Request) -> Result<Response> {
        let f = handler(&self.srv.get, "Get")?;
        let params = path_params(JOB_ROUTE, request)?;
        respond(f(params.get("jobId")?.to_string()), request, &[200])
    }
}

#[async_trait]
impl Transport for JobsServerTransport {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        ctx.check()?;
        match operation_method(&request)? {
            "BeginCreate" => self.dispatch_begin_create(&request),
            "Get" => self.dispatch_get(&request),
            _ => Err(unhandled(&request)),
        }
    }
}
