use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use courier_core::{
    AnyMessage, BoxError, BoxStream, CallContext, CancellationToken, DispatchError,
    HandlerRegistry, ItemStream, Reply, StreamHandler, StreamMiddleware, StreamNext,
    StreamRequest,
};
use courier_framework::{
    Exclusion, LoggingMiddleware, Mediator, StreamEnd, StreamMiddlewareDescriptor, Validate,
    guarded,
};
use futures::{StreamExt, stream};
use parking_lot::Mutex;

#[derive(Debug)]
struct CountTo {
    limit: Option<u32>,
}

impl StreamRequest for CountTo {
    type Item = u32;
}

/// Sets its flag when the producer state is dropped.
struct Cleanup(Arc<AtomicBool>);

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct Counter {
    opened: Arc<AtomicUsize>,
    cleaned: Arc<AtomicBool>,
    contexts: Arc<Mutex<Vec<CallContext>>>,
    fail_at: Option<u32>,
}

impl StreamHandler<CountTo> for Counter {
    fn handle(&self, request: Arc<CountTo>, ctx: CallContext) -> BoxStream<'static, Result<u32, BoxError>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(ctx);

        let limit = request.limit;
        let fail_at = self.fail_at;
        let cleanup = Cleanup(Arc::clone(&self.cleaned));
        stream::unfold((0u32, cleanup), move |(n, cleanup)| async move {
            if limit.is_some_and(|limit| n >= limit) {
                return None;
            }
            tokio::task::yield_now().await;
            let item = if fail_at == Some(n) {
                Err(BoxError::from("producer failed"))
            } else {
                Ok(n)
            };
            Some((item, (n + 1, cleanup)))
        })
        .boxed()
    }
}

fn mediator_with(counter: &Counter) -> Mediator {
    Mediator::builder()
        .handlers(HandlerRegistry::new().stream::<CountTo, _>(counter.clone()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_drained_stream_yields_every_item() {
    let counter = Counter::default();
    let mediator = mediator_with(&counter);

    let items: Vec<u32> = mediator
        .send_stream(CountTo { limit: Some(5) })
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(items, vec![0, 1, 2, 3, 4]);
    assert!(counter.cleaned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let counter = Counter::default();
    let mediator = mediator_with(&counter);

    let mut items = mediator.send_stream(CountTo { limit: Some(1) }).unwrap();
    assert_eq!(counter.opened.load(Ordering::SeqCst), 0);

    assert_eq!(items.next().await.unwrap().unwrap(), 0);
    assert_eq!(counter.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resolution_errors_are_immediate() {
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .build()
        .unwrap();
    assert!(matches!(
        mediator.send_stream(CountTo { limit: None }),
        Err(DispatchError::HandlerNotFound { .. })
    ));

    let twice = Counter::default();
    let mediator = Mediator::builder()
        .handlers(
            HandlerRegistry::new()
                .stream::<CountTo, _>(twice.clone())
                .stream::<CountTo, _>(twice),
        )
        .build()
        .unwrap();
    assert!(matches!(
        mediator.send_stream(CountTo { limit: None }),
        Err(DispatchError::AmbiguousHandler { count: 2, .. })
    ));
}

#[tokio::test]
async fn test_no_items_after_cancellation() {
    let counter = Counter::default();
    let mediator = mediator_with(&counter);
    let token = CancellationToken::new();

    let mut items = mediator
        .send_stream_with(CountTo { limit: None }, token.clone())
        .unwrap();
    for expected in 0..3 {
        assert_eq!(items.next().await.unwrap().unwrap(), expected);
    }

    token.cancel();
    assert!(matches!(items.next().await, Some(Err(DispatchError::Cancelled))));
    assert!(items.next().await.is_none());
}

#[tokio::test]
async fn test_abandoned_stream_runs_cleanup() {
    let counter = Counter::default();
    let mediator = mediator_with(&counter);
    let caller = CancellationToken::new();

    let mut items = mediator
        .send_stream_with(CountTo { limit: None }, caller.clone())
        .unwrap();
    items.next().await.unwrap().unwrap();
    items.next().await.unwrap().unwrap();
    drop(items);

    assert!(counter.cleaned.load(Ordering::SeqCst));
    let contexts = counter.contexts.lock();
    assert!(contexts[0].is_cancelled());
    // Abandonment cancels only the stream's own token.
    assert!(!caller.is_cancelled());
}

#[tokio::test]
async fn test_handler_errors_surface_as_items() {
    let counter = Counter {
        fail_at: Some(1),
        ..Counter::default()
    };
    let mediator = mediator_with(&counter);

    let items: Vec<_> = mediator
        .send_stream(CountTo { limit: Some(3) })
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert!(matches!(items[1], Err(DispatchError::Handler(_))));
    assert!(matches!(items[2], Ok(2)));
}

/// Doubles every item of `CountTo`.
struct Doubler;

impl StreamMiddleware<CountTo> for Doubler {
    fn handle(&self, _request: &CountTo, _ctx: &CallContext, next: StreamNext) -> ItemStream {
        next.run()
            .map(|item| {
                item.map(|reply| match reply.downcast::<u32>() {
                    Ok(n) => Reply::new(n * 2),
                    Err(other) => other,
                })
            })
            .boxed()
    }
}

/// Records how each stream ended.
struct EndProbe {
    ends: Arc<Mutex<Vec<StreamEnd>>>,
}

impl StreamMiddleware<AnyMessage> for EndProbe {
    fn handle(&self, _request: &AnyMessage, _ctx: &CallContext, next: StreamNext) -> ItemStream {
        let ends = Arc::clone(&self.ends);
        guarded(next.run(), move |end| ends.lock().push(end))
    }
}

#[tokio::test]
async fn test_stream_middleware_transform_and_teardown() {
    let counter = Counter::default();
    let ends = Arc::new(Mutex::new(Vec::new()));
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new().stream::<CountTo, _>(counter.clone()))
        .stream_middleware(StreamMiddlewareDescriptor::<AnyMessage>::new(EndProbe {
            ends: Arc::clone(&ends),
        }))
        .stream_middleware(StreamMiddlewareDescriptor::<CountTo>::new(Doubler).order(10))
        .stream_middleware(StreamMiddlewareDescriptor::<AnyMessage>::new(
            LoggingMiddleware::default(),
        ))
        .stream_middleware(StreamMiddlewareDescriptor::<dyn Validate>::new(Unreachable))
        .build()
        .unwrap();

    let items: Vec<u32> = mediator
        .send_stream(CountTo { limit: Some(3) })
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(items, vec![0, 2, 4]);

    let mut partial = mediator.send_stream(CountTo { limit: None }).unwrap();
    partial.next().await.unwrap().unwrap();
    drop(partial);

    assert_eq!(
        *ends.lock(),
        vec![
            StreamEnd::Completed { items: 3 },
            StreamEnd::Abandoned { items: 1 }
        ]
    );

    let report = mediator.describe_stream::<CountTo>();
    assert_eq!(
        report.stage_names(),
        vec!["EndProbe", "LoggingMiddleware", "Doubler"]
    );
    assert!(matches!(
        report.exclusion("Unreachable"),
        Some(Exclusion::ConstraintMismatch { .. })
    ));
}

struct Unreachable;

impl StreamMiddleware<dyn Validate> for Unreachable {
    fn handle(&self, _request: &dyn Validate, _ctx: &CallContext, _next: StreamNext) -> ItemStream {
        stream::empty().boxed()
    }
}
