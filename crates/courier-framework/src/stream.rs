//! Lazy, cancellable streaming dispatch.
//!
//! Nothing runs until the returned stream is first polled. Every stream owns
//! a child of the call's cancellation token: cancelling the caller's token
//! stops item delivery, and dropping the stream early cancels the child so
//! producers observing [`CallContext::cancelled`] can release resources.

use std::any::type_name;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use courier_core::{
    CallContext, DispatchError, DispatchResult, ItemStream, Reply, StreamChain, StreamHandler,
    StreamNext, StreamRequest, StreamStage,
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{Span, trace};

use crate::pipeline::PipelineReport;
use crate::pipeline::builder::{FrozenMiddleware, resolve_chain};

/// Typed items of a streaming call.
pub type ResponseStream<T> = BoxStream<'static, DispatchResult<T>>;

/// The ordered, filtered stages for stream request type `R`.
pub(crate) struct StreamPipeline<R: StreamRequest> {
    stages: Vec<Arc<dyn StreamStage<R>>>,
    report: PipelineReport,
}

impl<R: StreamRequest> StreamPipeline<R> {
    pub(crate) fn build(frozen: &[FrozenMiddleware]) -> Self {
        let resolved = resolve_chain(
            frozen,
            &R::capabilities(),
            type_name::<R::Item>(),
            |binder, slot| binder.bind_stream(slot),
        );
        Self {
            stages: resolved.stages,
            report: resolved.report,
        }
    }

    pub(crate) fn report(&self) -> &PipelineReport {
        &self.report
    }
}

struct StreamInvocation<R: StreamRequest> {
    pipeline: Arc<StreamPipeline<R>>,
    handler: Arc<dyn StreamHandler<R>>,
    request: Arc<R>,
    ctx: CallContext,
}

impl<R: StreamRequest> StreamChain for StreamInvocation<R> {
    fn run_from(self: Arc<Self>, index: usize) -> ItemStream {
        if let Err(error) = self.ctx.check_cancelled() {
            return stream::iter([Err(error)]).boxed();
        }

        let Some(stage) = self.pipeline.stages.get(index).cloned() else {
            trace!(handler = self.handler.name(), "Opening handler stream");
            return self
                .handler
                .handle(Arc::clone(&self.request), self.ctx.clone())
                .map(|item| item.map(Reply::new).map_err(DispatchError::from_boxed))
                .boxed();
        };

        if !stage.applies(&self.request) {
            return self.run_from(index + 1);
        }

        let next = StreamNext::new(Arc::clone(&self) as Arc<dyn StreamChain>, index + 1);
        stage.invoke(&self.request, &self.ctx, next)
    }
}

/// Builds the lazy, cancellable stream for one call.
pub(crate) fn open<R: StreamRequest>(
    pipeline: Arc<StreamPipeline<R>>,
    handler: Arc<dyn StreamHandler<R>>,
    request: R,
    ctx: CallContext,
    span: Span,
) -> ResponseStream<R::Item> {
    let token = ctx.cancellation_token().clone();
    let invocation = Arc::new(StreamInvocation {
        pipeline,
        handler,
        request: Arc::new(request),
        ctx,
    });
    let items = stream::once(async move { invocation.run_from(0) })
        .flatten()
        .boxed();

    InSpan {
        inner: cancellable(items, token),
        span,
    }
    .map(|item| item.and_then(downcast_item::<R::Item>))
    .boxed()
}

/// Enters `span` for every poll of `inner`.
struct InSpan {
    inner: ItemStream,
    span: Span,
}

impl Stream for InSpan {
    type Item = DispatchResult<Reply>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let _entered = this.span.enter();
        this.inner.poll_next_unpin(cx)
    }
}

fn downcast_item<T: Send + 'static>(reply: Reply) -> DispatchResult<T> {
    reply
        .downcast::<T>()
        .map_err(|reply| DispatchError::ResponseTypeMismatch {
            expected: type_name::<T>(),
            actual: reply.type_name(),
        })
}

/// Stops delivery once `token` fires, yielding a single
/// [`DispatchError::Cancelled`]. Dropping the stream cancels `token`.
fn cancellable(items: ItemStream, token: CancellationToken) -> ItemStream {
    let guard = token.clone().drop_guard();
    stream::unfold(Some((guard, items, token)), |state| async move {
        let (guard, mut items, token) = state?;
        let next = tokio::select! {
            biased;
            () = token.cancelled() => None,
            item = items.next() => Some(item),
        };
        match next {
            None => Some((Err(DispatchError::Cancelled), None)),
            Some(Some(item)) => Some((item, Some((guard, items, token)))),
            Some(None) => {
                // Completed normally; release without cancelling.
                drop(guard.disarm());
                None
            }
        }
    })
    .boxed()
}

// =============================================================================
// Teardown observation
// =============================================================================

/// How a guarded stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The inner stream ran to completion.
    Completed {
        /// Successful items delivered.
        items: usize,
    },
    /// The stream was dropped before completing.
    Abandoned {
        /// Successful items delivered before it was dropped.
        items: usize,
    },
}

/// Wraps `inner` so `on_finish` runs exactly once, on completion or when
/// the stream is dropped early.
///
/// Stream middleware use this to observe teardown, e.g. to log how many
/// items a consumer took before walking away.
pub fn guarded<F>(inner: ItemStream, on_finish: F) -> ItemStream
where
    F: FnOnce(StreamEnd) + Send + 'static,
{
    Guarded {
        inner,
        items: 0,
        on_finish: Some(Box::new(on_finish)),
    }
    .boxed()
}

struct Guarded {
    inner: ItemStream,
    items: usize,
    on_finish: Option<Box<dyn FnOnce(StreamEnd) + Send>>,
}

impl Guarded {
    fn finish(&mut self, end: StreamEnd) {
        if let Some(on_finish) = self.on_finish.take() {
            on_finish(end);
        }
    }
}

impl Stream for Guarded {
    type Item = DispatchResult<Reply>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(_))) => self.items += 1,
            Poll::Ready(None) => {
                let items = self.items;
                self.finish(StreamEnd::Completed { items });
            }
            _ => {}
        }
        polled
    }
}

impl Drop for Guarded {
    fn drop(&mut self) {
        let items = self.items;
        self.finish(StreamEnd::Abandoned { items });
    }
}
