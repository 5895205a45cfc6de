//! Fan-out of one notification to its consumers.
//!
//! Delivery order is fixed: resolved handlers, then typed subscribers, then
//! broadcast subscribers, each group in registration order. Cancellation is
//! checked before every consumer and always surfaces as
//! [`DispatchError::Cancelled`], never as a consumer failure.

use std::sync::Arc;

use courier_core::{
    BoxError, BroadcastHandler, CallContext, ConsumerFailure, ConsumerOrigin, DispatchError,
    DispatchResult, Notification, NotificationHandler,
};
use futures::future;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::registry::Snapshot;

/// What happens when a consumer fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failure; later consumers are not invoked.
    #[default]
    FailFast,
    /// Invoke every consumer and report all failures together.
    Aggregate,
}

/// How consumers are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishStrategy {
    /// One consumer at a time, in delivery order.
    #[default]
    Sequential,
    /// All consumers polled together on the calling task.
    Concurrent,
}

/// Publish behaviour fixed at build time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishOptions {
    /// Failure handling.
    pub failure_policy: FailurePolicy,
    /// Scheduling.
    pub strategy: PublishStrategy,
}

enum Consumer<'a, N: Notification> {
    Handler(&'a dyn NotificationHandler<N>),
    Subscriber(Arc<dyn NotificationHandler<N>>),
    Broadcast(&'a dyn BroadcastHandler),
}

impl<N: Notification> Consumer<'_, N> {
    fn name(&self) -> &'static str {
        match self {
            Self::Handler(handler) => handler.name(),
            Self::Subscriber(subscriber) => subscriber.name(),
            Self::Broadcast(subscriber) => subscriber.name(),
        }
    }

    fn origin(&self) -> ConsumerOrigin {
        match self {
            Self::Handler(_) => ConsumerOrigin::Handler,
            Self::Subscriber(_) => ConsumerOrigin::Subscriber,
            Self::Broadcast(_) => ConsumerOrigin::Broadcast,
        }
    }

    async fn deliver(&self, notification: &N, ctx: &CallContext) -> Result<(), BoxError> {
        match self {
            Self::Handler(handler) => handler.handle(notification, ctx).await,
            Self::Subscriber(subscriber) => subscriber.handle(notification, ctx).await,
            Self::Broadcast(subscriber) => subscriber.handle(notification, ctx).await,
        }
    }
}

/// The consumers of one publish, captured when it started.
pub(crate) struct FanOut<N: Notification> {
    handlers: Vec<Arc<dyn NotificationHandler<N>>>,
    subscribers: Snapshot,
    options: PublishOptions,
}

impl<N: Notification> FanOut<N> {
    pub(crate) fn new(
        handlers: Vec<Arc<dyn NotificationHandler<N>>>,
        subscribers: Snapshot,
        options: PublishOptions,
    ) -> Self {
        Self {
            handlers,
            subscribers,
            options,
        }
    }

    fn consumers(&self) -> Vec<Consumer<'_, N>> {
        self.handlers
            .iter()
            .map(|handler| Consumer::Handler(handler.as_ref()))
            .chain(self.subscribers.typed::<N>().map(Consumer::Subscriber))
            .chain(
                self.subscribers
                    .broadcast()
                    .map(|subscriber| Consumer::Broadcast(subscriber.as_ref())),
            )
            .collect()
    }

    pub(crate) async fn deliver(&self, notification: &N, ctx: &CallContext) -> DispatchResult<()> {
        let consumers = self.consumers();
        debug!(
            consumers = consumers.len(),
            strategy = ?self.options.strategy,
            "Delivering notification"
        );

        match self.options.strategy {
            PublishStrategy::Sequential => self.sequential(&consumers, notification, ctx).await,
            PublishStrategy::Concurrent => self.concurrent(&consumers, notification, ctx).await,
        }
    }

    async fn sequential(
        &self,
        consumers: &[Consumer<'_, N>],
        notification: &N,
        ctx: &CallContext,
    ) -> DispatchResult<()> {
        let mut failures = Vec::new();

        for (position, consumer) in consumers.iter().enumerate() {
            ctx.check_cancelled()?;
            if let Err(error) = consumer.deliver(notification, ctx).await {
                let failure = classify(consumer, position, error)?;
                if self.options.failure_policy == FailurePolicy::FailFast {
                    return Err(DispatchError::ConsumerFailed {
                        notification: ctx.message_name(),
                        failure,
                    });
                }
                failures.push(failure);
            }
        }

        finish(ctx, failures)
    }

    async fn concurrent(
        &self,
        consumers: &[Consumer<'_, N>],
        notification: &N,
        ctx: &CallContext,
    ) -> DispatchResult<()> {
        ctx.check_cancelled()?;
        let outcomes = future::join_all(
            consumers
                .iter()
                .map(|consumer| consumer.deliver(notification, ctx)),
        )
        .await;

        let mut failures = Vec::new();
        for (position, (consumer, outcome)) in consumers.iter().zip(outcomes).enumerate() {
            if let Err(error) = outcome {
                failures.push(classify(consumer, position, error)?);
            }
        }

        if self.options.failure_policy == FailurePolicy::FailFast && !failures.is_empty() {
            let failure = failures.swap_remove(0);
            return Err(DispatchError::ConsumerFailed {
                notification: ctx.message_name(),
                failure,
            });
        }
        finish(ctx, failures)
    }
}

/// Turns a consumer error into a failure record, letting cancellation
/// through untouched.
fn classify<N: Notification>(
    consumer: &Consumer<'_, N>,
    position: usize,
    error: BoxError,
) -> DispatchResult<ConsumerFailure> {
    if error
        .downcast_ref::<DispatchError>()
        .is_some_and(DispatchError::is_cancelled)
    {
        return Err(DispatchError::Cancelled);
    }

    let failure = ConsumerFailure {
        consumer: consumer.name(),
        origin: consumer.origin(),
        position,
        error,
    };
    warn!(
        consumer = failure.consumer,
        origin = %failure.origin,
        position,
        error = %failure.error,
        "Notification consumer failed"
    );
    Ok(failure)
}

fn finish(ctx: &CallContext, failures: Vec<ConsumerFailure>) -> DispatchResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::ConsumersFailed {
            notification: ctx.message_name(),
            failures,
        })
    }
}
