//! Plumbing shared by every client: endpoint, pipeline and request building.

use corvid_runtime::{
    ClientOptions, Context, Method, OperationId, Pipeline, Request, Response, Result,
    RuntimeError, Url,
};

pub(crate) struct ClientCore {
    name: &'static str,
    endpoint: Url,
    pipeline: Pipeline,
}

impl ClientCore {
    pub(crate) fn new(
        name: &'static str,
        endpoint: &str,
        options: &ClientOptions,
        api_version: Option<&str>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| RuntimeError::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let pipeline = options.build_pipeline(api_version)?;
        Ok(Self {
            name,
            endpoint,
            pipeline,
        })
    }

    pub(crate) fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Build a request for `segments` under the endpoint, tagged with the
    /// operation identity `<client>.<method>`. Segments are percent-encoded.
    pub(crate) fn request(&self, method: Method, segments: &[&str], operation: &str) -> Result<Request> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RuntimeError::Config(format!("endpoint '{}' cannot be a base URL", self.endpoint))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(Request::new(method, url).with_operation(OperationId::new(self.name, operation)?))
    }

    /// Send through the pipeline and require one of `accepted`.
    pub(crate) async fn send(&self, ctx: &Context, request: &Request, accepted: &[u16]) -> Result<Response> {
        let response = self.pipeline.send(ctx, request).await?;
        if !accepted.contains(&response.status().as_u16()) {
            tracing::debug!(
                client = self.name,
                status = response.status().as_u16(),
                "Rejecting response outside the accepted statuses"
            );
        }
        response.ensure_status(accepted)
    }
}
