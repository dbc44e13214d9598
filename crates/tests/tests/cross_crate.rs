//! Cross-crate integration and E2E tests
//!
//! Generated-style clients from corvid-specs run against their fake servers
//! through full corvid-runtime pipelines, with traces from corvid-trace.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use corvid_runtime::fake::{PagerResponder, PollerResponder, Responder, fake_fn, pager_fn, poller_fn};
use corvid_runtime::{
    ClientOptions, Context, Method, Next, OperationId, PollOptions, Policy, Request, Response,
    Result, RuntimeError, StatusCode,
};
use corvid_specs::birds::{Eagle, Goose, SeaGull, UnknownBird};
use corvid_specs::fake::ServerFactory;
use corvid_specs::jobs::JobSpec;
use corvid_specs::widgets::WidgetPage;
use corvid_specs::{Bird, BirdsClient, Job, JobsClient, Widget, WidgetsClient};
use corvid_trace::{TraceCollector, TraceWriter, WriterConfig};

const ENDPOINT: &str = "https://service.fake";

/// Counts requests whose path ends with `suffix`.
struct CountRequests {
    suffix: &'static str,
    count: Arc<AtomicUsize>,
}

impl CountRequests {
    fn new(suffix: &'static str) -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                suffix,
                count: count.clone(),
            },
            count,
        )
    }
}

#[async_trait]
impl Policy for CountRequests {
    async fn send(&self, ctx: &Context, request: Request, next: Next<'_>) -> Result<Response> {
        if request.url().path().ends_with(self.suffix) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        next.run(ctx, request).await
    }
}

fn widget_pages(items: usize) -> ServerFactory {
    let mut factory = ServerFactory::default();
    factory.widgets.list = pager_fn(move |top: Option<u32>| {
        let all: Vec<Widget> = (0..items).map(|i| Widget::named(format!("w{}", i))).collect();
        let mut pager = PagerResponder::new();
        for chunk in all.chunks(top.unwrap_or(10) as usize) {
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

fn job_factory() -> ServerFactory {
    let mut factory = ServerFactory::default();
    factory.jobs.begin_create = poller_fn(|(id, spec): (String, JobSpec)| {
        Ok(PollerResponder::new()
            .with_non_terminal(StatusCode::ACCEPTED)
            .with_non_terminal(StatusCode::OK)
            .with_terminal_response(
                StatusCode::OK,
                Job {
                    id,
                    command: spec.command,
                    exit_code: Some(0),
                },
            ))
    });
    factory
}

fn spec(command: &str) -> JobSpec {
    JobSpec {
        command: command.to_string(),
        args: vec!["--release".to_string()],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_untagged_request_never_reaches_a_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut factory = ServerFactory::default();
    let seen = calls.clone();
    factory.birds.get_model = fake_fn(move |()| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Responder::empty(StatusCode::OK))
    });
    let pipeline = factory.client_options().build_pipeline(None).unwrap();

    let request = Request::from_url(Method::GET, ENDPOINT).unwrap();
    let err = pipeline
        .send(&Context::background(), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::MissingDispatchKey));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_client_is_named() {
    let pipeline = ServerFactory::default()
        .client_options()
        .build_pipeline(None)
        .unwrap();

    let request = Request::from_url(Method::GET, ENDPOINT)
        .unwrap()
        .with_operation(OperationId::new("GizmosClient", "List").unwrap());
    let err = pipeline
        .send(&Context::background(), &request)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unhandled client GizmosClient");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clients_share_one_factory_transport() {
    let mut factory = ServerFactory::default();
    factory.widgets.get = fake_fn(|name: String| Ok(Responder::new(StatusCode::OK, Widget::named(name))));
    factory.birds.get_model =
        fake_fn(|()| Ok(Responder::new(StatusCode::OK, Bird::Goose(Goose { wingspan: Some(4) }))));
    let options = factory.client_options();

    let widgets = Arc::new(WidgetsClient::new(ENDPOINT, &options).unwrap());
    let birds = Arc::new(BirdsClient::new(ENDPOINT, &options).unwrap());

    let mut handles = Vec::new();
    for i in 0..16 {
        let widgets = widgets.clone();
        let birds = birds.clone();
        handles.push(tokio::spawn(async move {
            let ctx = Context::background();
            let widget = widgets.get(&ctx, &format!("w{}", i)).await.unwrap();
            assert_eq!(widget.name, format!("w{}", i));
            let bird = birds.get_model(&ctx).await.unwrap().unwrap();
            assert_eq!(bird.wingspan(), Some(4));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Polymorphic models
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bird_variants_through_client() {
    let mut factory = ServerFactory::default();
    factory.birds.get_recursive_model = fake_fn(|()| {
        Ok(Responder::new(
            StatusCode::OK,
            Bird::Eagle(Eagle {
                wingspan: Some(5),
                friends: Some(vec![Some(Bird::SeaGull(SeaGull { wingspan: Some(2) })), None]),
                ..Eagle::default()
            }),
        ))
    });
    factory.birds.get_wrong_discriminator = fake_fn(|()| {
        Ok(Responder::new(
            StatusCode::OK,
            Bird::Unknown(UnknownBird {
                kind: Some("condor".into()),
                wingspan: Some(3),
            }),
        ))
    });
    factory.birds.get_missing_discriminator = fake_fn(|()| Ok(Responder::empty(StatusCode::OK)));
    let client = BirdsClient::new(ENDPOINT, &factory.client_options()).unwrap();
    let ctx = Context::background();

    let eagle = client.get_recursive_model(&ctx).await.unwrap().unwrap();
    assert_eq!(eagle.kind(), Some("eagle"));
    let Bird::Eagle(eagle) = eagle else {
        panic!("expected eagle");
    };
    let friends = eagle.friends.unwrap();
    assert_eq!(friends[0].as_ref().and_then(Bird::kind), Some("seagull"));
    assert!(friends[1].is_none());

    let condor = client.get_wrong_discriminator(&ctx).await.unwrap().unwrap();
    assert!(matches!(condor, Bird::Unknown(_)));
    assert_eq!(condor.kind(), Some("condor"));

    assert_eq!(client.get_missing_discriminator(&ctx).await.unwrap(), None);
}

#[test]
fn test_every_bird_variant_survives_encoding() {
    let birds = vec![
        Bird::SeaGull(SeaGull { wingspan: Some(1) }),
        Bird::Sparrow(corvid_specs::birds::Sparrow { wingspan: Some(2) }),
        Bird::Goose(Goose { wingspan: Some(3) }),
        Bird::Eagle(Eagle {
            wingspan: Some(4),
            hate: Some([("rival".to_string(), Some(Bird::Goose(Goose::default())))].into()),
            partner: Some(Box::new(Bird::SeaGull(SeaGull::default()))),
            ..Eagle::default()
        }),
        Bird::Unknown(UnknownBird {
            kind: Some("condor".into()),
            wingspan: Some(9),
        }),
    ];
    for bird in birds {
        let encoded = serde_json::to_vec(&bird).unwrap();
        let decoded: Option<Bird> = corvid_runtime::polymorphic::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), Some(&bird));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paging
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_four_items_page_size_three() {
    let collector = TraceCollector::shared();
    let options = widget_pages(4).client_options().with_trace(collector.clone());
    let client = WidgetsClient::new(ENDPOINT, &options).unwrap();
    let ctx = Context::background();

    let mut pager = client.list(Some(3)).unwrap();
    let first = pager.next_page(&ctx).await.unwrap();
    assert_eq!(first.items.len(), 3);
    assert!(first.next_link.is_some());

    let second = pager.next_page(&ctx).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_link.is_none());
    assert!(!pager.more());
    assert!(matches!(
        pager.next_page(&ctx).await.unwrap_err(),
        RuntimeError::PagerExhausted
    ));

    let trace = collector.snapshot();
    let spans: Vec<_> = trace.spans_named("WidgetsClient.List").collect();
    assert_eq!(spans.len(), 2);
    assert!(spans.iter().all(|s| s.is_ok()));
}

#[tokio::test]
async fn test_cancelled_pager_sends_nothing() {
    let (counter, count) = CountRequests::new("/widgets");
    let options = widget_pages(4).client_options().with_per_retry_policy(counter);
    let client = WidgetsClient::new(ENDPOINT, &options).unwrap();
    let (ctx, handle) = Context::background().with_cancel();
    handle.cancel();

    let err = client.list(None).unwrap().next_page(&ctx).await.unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Long-running operations
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_in_progress_then_succeeded_polls_twice() {
    let (counter, status_requests) = CountRequests::new("/get/fake/status");
    let options = job_factory().client_options().with_per_retry_policy(counter);
    let client = JobsClient::new(ENDPOINT, &options).unwrap();
    let ctx = Context::background();

    let mut poller = client.begin_create(&ctx, "42", &spec("make")).await.unwrap();
    let job = poller
        .poll_until_done(&ctx, PollOptions::with_frequency(Duration::from_millis(5)))
        .await
        .unwrap();

    assert_eq!(job.id, "42");
    assert_eq!(job.command, "make");
    assert_eq!(status_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_mid_poll_stops_status_requests() {
    let (counter, status_requests) = CountRequests::new("/get/fake/status");
    let options = job_factory().client_options().with_per_retry_policy(counter);
    let client = JobsClient::new(ENDPOINT, &options).unwrap();
    let (ctx, handle) = Context::background().with_cancel();

    let mut poller = client.begin_create(&ctx, "43", &spec("sleep")).await.unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });
    let err = poller
        .poll_until_done(&ctx, PollOptions::with_frequency(Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(status_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resume_token_across_clients() {
    let options = job_factory().client_options();
    let first = JobsClient::new(ENDPOINT, &options).unwrap();
    let second = JobsClient::new(ENDPOINT, &options).unwrap();
    let ctx = Context::background();

    let token = first
        .begin_create(&ctx, "44", &spec("lint"))
        .await
        .unwrap()
        .resume_token()
        .unwrap();

    let mut resumed = second.resume_create(&token).unwrap();
    let job = resumed
        .poll_until_done(&ctx, PollOptions::with_frequency(Duration::from_millis(5)))
        .await
        .unwrap();
    assert_eq!(job.id, "44");
    assert!(resumed.resume_token().is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline and traces
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_client_pipeline_policy_order() {
    let options: ClientOptions = ServerFactory::default()
        .client_options()
        .with_trace(TraceCollector::shared())
        .with_logging(true);
    let pipeline = options.build_pipeline(Some("2024-05-01")).unwrap();

    let names = pipeline.policy_names();
    let position = |needle: &str| names.iter().position(|n| n.ends_with(needle)).unwrap();
    assert!(position("ClientRequestIdPolicy") < position("ApiVersionPolicy"));
    assert!(position("ApiVersionPolicy") < position("RetryPolicy"));
    assert!(position("RetryPolicy") < position("LoggingPolicy"));
    assert!(position("LoggingPolicy") < position("TracePolicy"));
}

#[tokio::test]
async fn test_trace_persists_failed_and_ok_spans() {
    let collector = TraceCollector::shared();
    let mut factory = ServerFactory::default();
    factory.widgets.get = fake_fn(|name: String| Ok(Responder::new(StatusCode::OK, Widget::named(name))));
    let options = factory.client_options().with_trace(collector.clone());
    let client = WidgetsClient::new(ENDPOINT, &options).unwrap();
    let ctx = Context::background();

    client.get(&ctx, "cog").await.unwrap();
    client.delete(&ctx, "cog").await.unwrap_err();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    let writer = TraceWriter::new(WriterConfig::single_file(&path)).unwrap();
    writer.write(&collector.finalize()).unwrap();

    let traces = TraceWriter::read_traces(&path).unwrap();
    assert_eq!(traces.len(), 1);
    let trace = &traces[0];
    assert!(trace.spans_named("WidgetsClient.Get").all(|s| s.is_ok()));
    let delete: Vec<_> = trace.spans_named("WidgetsClient.Delete").collect();
    assert_eq!(delete.len(), 1);
    assert!(!delete[0].is_ok());
}
