//! Widgets: plain CRUD plus a paged list.

use corvid_runtime::fake::SetNextLink;
use corvid_runtime::{ClientOptions, Context, Method, Pager, Result, Url};
use serde::{Deserialize, Serialize};

use crate::client::ClientCore;

/// Query parameter limiting the page size of [`WidgetsClient::list`].
pub const TOP_PARAM: &str = "top";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

impl Widget {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One page of a widget listing, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPage {
    pub value: Vec<Widget>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

impl SetNextLink for WidgetPage {
    fn set_next_link(&mut self, link: Option<String>) {
        self.next_link = link;
    }
}

pub struct WidgetsClient {
    core: ClientCore,
}

impl WidgetsClient {
    pub const NAME: &'static str = "WidgetsClient";
    pub const API_VERSION: &'static str = "2024-05-01";

    pub fn new(endpoint: &str, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            core: ClientCore::new(Self::NAME, endpoint, options, Some(Self::API_VERSION))?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        self.core.endpoint()
    }

    /// List widgets, `top` at a time. No request is sent until the first
    /// [`Pager::next_page`].
    pub fn list(&self, top: Option<u32>) -> Result<Pager<Widget>> {
        let mut request = self.core.request(Method::GET, &["widgets"], "List")?;
        if let Some(top) = top {
            request
                .url_mut()
                .query_pairs_mut()
                .append_pair(TOP_PARAM, &top.to_string());
        }
        Ok(Pager::from_pipeline(self.core.pipeline().clone(), request, &[200]))
    }

    pub async fn get(&self, ctx: &Context, name: &str) -> Result<Widget> {
        let request = self.core.request(Method::GET, &["widgets", name], "Get")?;
        self.core.send(ctx, &request, &[200]).await?.json()
    }

    /// Create or replace a widget. 201 on create, 200 on replace.
    pub async fn create_or_replace(&self, ctx: &Context, widget: &Widget) -> Result<Widget> {
        let request = self
            .core
            .request(Method::PUT, &["widgets", &widget.name], "CreateOrReplace")?
            .with_json(widget)?;
        self.core.send(ctx, &request, &[200, 201]).await?.json()
    }

    pub async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        let request = self.core.request(Method::DELETE, &["widgets", name], "Delete")?;
        self.core.send(ctx, &request, &[204]).await?;
        Ok(())
    }
}
