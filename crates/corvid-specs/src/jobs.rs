//! Jobs: a long-running create.

use corvid_runtime::{ClientOptions, Context, FinalStateVia, Method, Poller, Result, Url};
use serde::{Deserialize, Serialize};

use crate::client::ClientCore;

/// Request body for [`JobsClient::begin_create`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,

    pub command: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

pub struct JobsClient {
    core: ClientCore,
}

impl JobsClient {
    pub const NAME: &'static str = "JobsClient";
    pub const API_VERSION: &'static str = "2024-05-01";

    pub fn new(endpoint: &str, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            core: ClientCore::new(Self::NAME, endpoint, options, Some(Self::API_VERSION))?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        self.core.endpoint()
    }

    /// Start creating job `id`. The returned poller tracks the operation
    /// until the service reports a terminal state; the finished job is read
    /// from the status monitor.
    pub async fn begin_create(&self, ctx: &Context, id: &str, spec: &JobSpec) -> Result<Poller<Job>> {
        let request = self
            .core
            .request(Method::PUT, &["jobs", id], "BeginCreate")?
            .with_json(spec)?;
        let response = self.core.send(ctx, &request, &[200, 201, 202]).await?;
        Ok(Poller::from_response(self.core.pipeline().clone(), &request, response)?
            .with_final_state_via(FinalStateVia::OperationLocation))
    }

    /// Rebuild a poller from [`Poller::resume_token`].
    pub fn resume_create(&self, token: &str) -> Result<Poller<Job>> {
        Poller::resume(self.core.pipeline().clone(), token)
    }

    pub async fn get(&self, ctx: &Context, id: &str) -> Result<Job> {
        let request = self.core.request(Method::GET, &["jobs", id], "Get")?;
        self.core.send(ctx, &request, &[200]).await?.json()
    }
}
