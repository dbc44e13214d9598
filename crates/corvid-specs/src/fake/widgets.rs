use async_trait::async_trait;
use corvid_runtime::fake::{
    FakeFn, FakePagerFn, PagerResponder, Tracker, check_status, handler, respond, unmarshal_json,
};
use corvid_runtime::{Context, Request, Response, Result, RuntimeError, Transport};

use super::{operation_method, path_params, unhandled};
use crate::widgets::{TOP_PARAM, Widget, WidgetPage};

const WIDGET_ROUTE: &str = r"/widgets/(?P<widgetName>[^/]+)$";

/// Handlers for [`WidgetsClient`](crate::WidgetsClient).
#[derive(Clone, Default)]
pub struct WidgetsServer {
    /// Receives the `top` query parameter.
    pub list: Option<FakePagerFn<Option<u32>, WidgetPage>>,
    pub get: Option<FakeFn<String, Widget>>,
    pub create_or_replace: Option<FakeFn<(String, Widget), Widget>>,
    pub delete: Option<FakeFn<String, ()>>,
}

pub struct WidgetsServerTransport {
    srv: WidgetsServer,
    list: Tracker<PagerResponder<WidgetPage>>,
}

impl WidgetsServerTransport {
    pub fn new(srv: WidgetsServer) -> Self {
        Self {
            srv,
            list: Tracker::new(),
        }
    }

    fn dispatch_list(&self, request: &Request) -> Result<Response> {
        let f = handler(&self.srv.list, "List")?;
        let mut pager = match self.list.take(request) {
            Some(pager) => pager,
            None => {
                let top = request
                    .url()
                    .query_pairs()
                    .find(|(k, _)| k == TOP_PARAM)
                    .map(|(_, v)| v.parse::<u32>())
                    .transpose()
                    .map_err(|e| RuntimeError::Config(format!("invalid '{}': {}", TOP_PARAM, e)))?;
                let mut pager = f(top);
                pager.inject_next_links(request);
                pager
            }
        };

        let response = pager.next(request)?;
        if response.status().is_success() {
            check_status(response.status(), &[200])?;
        }
        if pager.more() {
            self.list.put(request, pager);
        }
        Ok(response)
    }

    fn dispatch_get(&self, request: &Request) -> Result<Response> {
        let f = handler(&self.srv.get, "Get")?;
        let params = path_params(WIDGET_ROUTE, request)?;
        respond(f(params.get("widgetName")?.to_string()), request, &[200])
    }

    fn dispatch_create_or_replace(&self, request: &Request) -> Result<Response> {
        let f = handler(&self.srv.create_or_replace, "CreateOrReplace")?;
        let params = path_params(WIDGET_ROUTE, request)?;
        let body: Widget = unmarshal_json(request)?;
        respond(
            f((params.get("widgetName")?.to_string(), body)),
            request,
            &[200, 201],
        )
    }

    fn dispatch_delete(&self, request: &Request) -> Result<Response> {
        let f = handler(&self.srv.delete, "Delete")?;
        let params = path_params(WIDGET_ROUTE, request)?;
        respond(f(params.get("widgetName")?.to_string()), request, &[204])
    }
}

#[async_trait]
impl Transport for WidgetsServerTransport {
    async fn send(&self, ctx: &Context, request: Request) -> Result<Response> {
        ctx.check()?;
        match operation_method(&request)? {
            "List" => self.dispatch_list(&request),
            "Get" => self.dispatch_get(&request),
            "CreateOrReplace" => self.dispatch_create_or_replace(&request),
            "Delete" => self.dispatch_delete(&request),
            _ => Err(unhandled(&request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WidgetsClient;
    use crate::fake::ServerFactory;
    use corvid_runtime::fake::{ErrorResponder, Responder, fake_fn, pager_fn};
    use corvid_runtime::{RetryOptions, StatusCode};

    fn widgets(n: usize) -> Vec<Widget> {
        (0..n).map(|i| Widget::named(format!("w{}", i))).collect()
    }

    /// Serves `items` in pages of `top` (default 2).
    fn paging_factory(items: Vec<Widget>) -> ServerFactory {
        let mut factory = ServerFactory::default();
        factory.widgets.list = pager_fn(move |top: Option<u32>| {
            let size = top.unwrap_or(2).max(1) as usize;
            let mut pager = PagerResponder::new();
            for chunk in items.chunks(size) {
                pager.add_page(
                    StatusCode::OK,
                    WidgetPage {
                        value: chunk.to_vec(),
                        next_link: None,
                    },
                );
            }
            pager
        });
        factory
    }

    #[tokio::test]
    async fn test_list_pages_through_fake() {
        let transport = paging_factory(widgets(4)).into_transport();
        let options = corvid_runtime::ClientOptions::default().with_transport(transport);
        let client = WidgetsClient::new("https://widgets.fake", &options).unwrap();
        let ctx = Context::background();

        let mut pager = client.list(Some(3)).unwrap();
        let first = pager.next_page(&ctx).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert!(first.next_link.as_deref().unwrap().contains("%24fakePage=1"));
        assert!(pager.more());

        let second = pager.next_page(&ctx).await.unwrap();
        assert_eq!(second.items, vec![Widget::named("w3")]);
        assert_eq!(second.next_link, None);
        assert!(!pager.more());
    }

    #[tokio::test]
    async fn test_list_collect_all() {
        let factory = paging_factory(widgets(5));
        let client = WidgetsClient::new("https://widgets.fake", &factory.client_options()).unwrap();

        let all = client
            .list(None)
            .unwrap()
            .collect_all(&Context::background())
            .await
            .unwrap();
        assert_eq!(all, widgets(5));
    }

    #[tokio::test]
    async fn test_list_error_page_surfaces() {
        let mut factory = ServerFactory::default();
        factory.widgets.list = pager_fn(|_: Option<u32>| {
            PagerResponder::new()
                .with_page(StatusCode::OK, WidgetPage {
                    value: widgets(1),
                    next_link: None,
                })
                .with_error(ErrorResponder::status(StatusCode::BAD_REQUEST))
        });
        let options = factory.client_options().with_retry(RetryOptions::disabled());
        let client = WidgetsClient::new("https://widgets.fake", &options).unwrap();
        let ctx = Context::background();

        let mut pager = client.list(None).unwrap();
        pager.next_page(&ctx).await.unwrap();
        let err = pager.next_page(&ctx).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_get_decodes_path_parameter() {
        let mut factory = ServerFactory::default();
        factory.widgets.get = fake_fn(|name: String| Ok(Responder::new(StatusCode::OK, Widget::named(name))));
        let client = WidgetsClient::new("https://widgets.fake", &factory.client_options()).unwrap();

        let widget = client.get(&Context::background(), "blue gear").await.unwrap();
        assert_eq!(widget.name, "blue gear");
    }

    #[tokio::test]
    async fn test_create_or_replace_accepts_created() {
        let mut factory = ServerFactory::default();
        factory.widgets.create_or_replace = fake_fn(|(name, mut widget): (String, Widget)| {
            widget.color = Some(format!("{}-red", name));
            Ok(Responder::new(StatusCode::CREATED, widget))
        });
        let client = WidgetsClient::new("https://widgets.fake", &factory.client_options()).unwrap();

        let widget = client
            .create_or_replace(&Context::background(), &Widget::named("cog"))
            .await
            .unwrap();
        assert_eq!(widget.color.as_deref(), Some("cog-red"));
    }

    #[tokio::test]
    async fn test_delete_not_implemented() {
        let client =
            WidgetsClient::new("https://widgets.fake", &ServerFactory::default().client_options()).unwrap();
        let err = client.delete(&Context::background(), "cog").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotImplemented { .. }));
    }
}
