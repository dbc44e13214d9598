//! Lazily fetched paged results.
//!
//! A [`Pager`] walks a paged endpoint one round trip at a time. It holds the
//! last continuation link; an absent or empty link marks the last page.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::http::Request;
use crate::pipeline::Pipeline;

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_link: Option<String>,
}

/// The common wire shape: `{"value": [...], "nextLink": "..."}`.
#[derive(Debug, Deserialize)]
struct WirePage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

type FetchFn<T> = Box<dyn Fn(Context, Option<String>) -> BoxFuture<'static, Result<Page<T>>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Link(String),
    Done,
}

/// Forward-only sequence of pages.
pub struct Pager<T> {
    fetch: FetchFn<T>,
    cursor: Cursor,
}

impl<T> fmt::Debug for Pager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pager")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Pager<T> {
    /// Build a pager from a fetch function. The function receives `None` for
    /// the first page and the previous page's link afterwards.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(Context, Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<T>>> + Send + 'static,
    {
        Self {
            fetch: Box::new(move |ctx, link| Box::pin(fetch(ctx, link))),
            cursor: Cursor::Start,
        }
    }

    /// Whether another page can be fetched. Never performs I/O.
    pub fn more(&self) -> bool {
        !matches!(self.cursor, Cursor::Done)
    }

    /// Fetch the next page with exactly one round trip.
    pub async fn next_page(&mut self, ctx: &Context) -> Result<Page<T>> {
        let link = match &self.cursor {
            Cursor::Start => None,
            Cursor::Link(link) => Some(link.clone()),
            Cursor::Done => return Err(RuntimeError::PagerExhausted),
        };
        ctx.check()?;

        let page = (self.fetch)(ctx.clone(), link).await?;
        self.cursor = match page.next_link.as_deref() {
            Some(link) if !link.is_empty() => Cursor::Link(link.to_string()),
            _ => Cursor::Done,
        };
        tracing::debug!(
            items = page.items.len(),
            more = self.more(),
            "Fetched page"
        );
        Ok(page)
    }

    /// Fetch every remaining page and concatenate the items.
    pub async fn collect_all(&mut self, ctx: &Context) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while self.more() {
            items.extend(self.next_page(ctx).await?.items);
        }
        Ok(items)
    }
}

impl<T: DeserializeOwned + Send + 'static> Pager<T> {
    /// Pager over an endpoint returning `{"value": [...], "nextLink": ...}`.
    ///
    /// The first page sends `initial`; later pages GET the next link with
    /// the same headers and operation identity. `accepted` lists the success
    /// statuses; anything else is a service error.
    pub fn from_pipeline(pipeline: Pipeline, initial: Request, accepted: &'static [u16]) -> Self {
        Self::new(move |ctx, link| {
            let pipeline = pipeline.clone();
            let initial = initial.clone();
            async move {
                let request = match link {
                    None => initial,
                    Some(link) => next_link_request(&initial, &link)?,
                };
                let response = pipeline.send(&ctx, &request).await?;
                let response = response.ensure_status(accepted)?;
                let wire: WirePage<T> = response.json()?;
                Ok(Page {
                    items: wire.value,
                    next_link: wire.next_link,
                })
            }
        })
    }
}

fn next_link_request(initial: &Request, link: &str) -> Result<Request> {
    let mut request = Request::from_url(Method::GET, link)?;
    *request.headers_mut() = initial.headers().clone();
    request.headers_mut().remove(reqwest::header::CONTENT_TYPE);
    if let Some(operation) = initial.operation() {
        request = request.with_operation(operation.clone());
    }
    Ok(request)
}
