//! Request dispatch through a resolved middleware chain.

use std::any::type_name;
use std::sync::Arc;

use courier_core::{
    BoxFuture, CallContext, Chain, DispatchError, DispatchResult, Next, Reply, Request,
    RequestHandler, RequestStage,
};
use tracing::trace;

use crate::pipeline::PipelineReport;
use crate::pipeline::builder::{FrozenMiddleware, resolve_chain};

/// The ordered, filtered stages for request type `R`.
pub(crate) struct RequestPipeline<R: Request> {
    stages: Vec<Arc<dyn RequestStage<R>>>,
    report: PipelineReport,
}

impl<R: Request> RequestPipeline<R> {
    pub(crate) fn build(frozen: &[FrozenMiddleware]) -> Self {
        let resolved = resolve_chain(
            frozen,
            &R::capabilities(),
            type_name::<R::Response>(),
            |binder, slot| binder.bind_request(slot),
        );
        Self {
            stages: resolved.stages,
            report: resolved.report,
        }
    }

    pub(crate) fn report(&self) -> &PipelineReport {
        &self.report
    }

    fn stage_name(&self, index: usize) -> &str {
        self.report
            .stages
            .get(index)
            .map_or("<unknown>", |stage| stage.name.as_str())
    }
}

/// One call walking a [`RequestPipeline`].
struct RequestInvocation<'a, R: Request> {
    pipeline: &'a RequestPipeline<R>,
    handler: &'a dyn RequestHandler<R>,
    request: &'a R,
    ctx: &'a CallContext,
}

impl<R: Request> Chain for RequestInvocation<'_, R> {
    fn run_from(&self, index: usize) -> BoxFuture<'_, DispatchResult<Reply>> {
        Box::pin(async move {
            self.ctx.check_cancelled()?;

            let Some(stage) = self.pipeline.stages.get(index) else {
                trace!(handler = self.handler.name(), "Invoking request handler");
                let response = self
                    .handler
                    .handle(self.request, self.ctx)
                    .await
                    .map_err(DispatchError::from_boxed)?;
                return Ok(Reply::new(response));
            };

            if !stage.applies(self.request) {
                trace!(
                    middleware = self.pipeline.stage_name(index),
                    "Predicate declined, skipping middleware"
                );
                return self.run_from(index + 1).await;
            }

            trace!(
                middleware = self.pipeline.stage_name(index),
                stage = index,
                "Entering middleware"
            );
            stage
                .invoke(self.request, self.ctx, Next::new(self, index + 1))
                .await
        })
    }
}

/// Runs `request` through `pipeline` to `handler` and recovers the typed
/// response.
pub(crate) async fn dispatch<R: Request>(
    pipeline: &RequestPipeline<R>,
    handler: &dyn RequestHandler<R>,
    request: &R,
    ctx: &CallContext,
) -> DispatchResult<R::Response> {
    let invocation = RequestInvocation {
        pipeline,
        handler,
        request,
        ctx,
    };
    let reply = invocation.run_from(0).await?;
    reply
        .downcast::<R::Response>()
        .map_err(|reply| DispatchError::ResponseTypeMismatch {
            expected: type_name::<R::Response>(),
            actual: reply.type_name(),
        })
}
