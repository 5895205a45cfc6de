//! The mediator: configuration-frozen dispatch of requests, notifications
//! and streams.

use std::any::type_name;
use std::collections::BTreeSet;
use std::sync::Arc;

use courier_core::{
    BroadcastHandler, CallContext, DispatchError, DispatchResult, HandlerResolver, Notification,
    NotificationHandler, Request, StreamRequest, resolve_notification, resolve_request,
    resolve_stream,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::error::{BuildError, BuildResult};
use crate::notification::pipeline::NotificationPipeline;
use crate::notification::publisher::FanOut;
use crate::notification::{
    FailurePolicy, PublishOptions, PublishStrategy, SubscriptionId, SubscriptionInfo,
    SubscriptionRegistry,
};
use crate::pipeline::builder::{FrozenMiddleware, freeze};
use crate::pipeline::cache::{PipelineCache, PipelineKey};
use crate::pipeline::descriptor::Registration;
use crate::pipeline::{
    MiddlewareDescriptor, MiddlewareInfo, MiddlewareOverride, MiddlewareOverrides,
    NotificationMiddlewareDescriptor, PipelineReport, StreamMiddlewareDescriptor,
};
use crate::request::{self, RequestPipeline};
use crate::service::{PublishService, RequestService};
use crate::stream::{self, ResponseStream, StreamPipeline};

// =============================================================================
// Builder
// =============================================================================

/// Collects handlers, middleware and options, then freezes them into a
/// [`Mediator`].
///
/// # Example
///
/// ```ignore
/// let mediator = Mediator::builder()
///     .handlers(HandlerRegistry::new().request::<CreateOrder, _>(CreateOrderHandler))
///     .middleware(MiddlewareDescriptor::<AnyMessage>::new(LoggingMiddleware::default()))
///     .middleware(MiddlewareDescriptor::<dyn Validate>::new(ValidationMiddleware).order(100))
///     .build()?;
/// ```
#[derive(Clone, Default)]
pub struct MediatorBuilder {
    resolver: Option<Arc<dyn HandlerResolver>>,
    requests: Vec<Registration>,
    notifications: Vec<Registration>,
    streams: Vec<Registration>,
    overrides: MiddlewareOverrides,
    options: PublishOptions,
    shutdown: Option<CancellationToken>,
}

impl MediatorBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler resolver.
    pub fn resolver(self, resolver: impl HandlerResolver) -> Self {
        self.shared_resolver(Arc::new(resolver))
    }

    /// Sets a resolver that is shared with other owners.
    pub fn shared_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Alias of [`resolver`](Self::resolver) for the in-memory registry.
    pub fn handlers(self, registry: courier_core::HandlerRegistry) -> Self {
        self.resolver(registry)
    }

    /// Registers a request middleware.
    pub fn middleware<C: ?Sized + Sync + 'static>(
        mut self,
        descriptor: MiddlewareDescriptor<C>,
    ) -> Self {
        self.requests.push(descriptor.into_registration());
        self
    }

    /// Registers a notification middleware.
    pub fn notification_middleware<C: ?Sized + Sync + 'static>(
        mut self,
        descriptor: NotificationMiddlewareDescriptor<C>,
    ) -> Self {
        self.notifications.push(descriptor.into_registration());
        self
    }

    /// Registers a stream middleware.
    pub fn stream_middleware<C: ?Sized + Sync + 'static>(
        mut self,
        descriptor: StreamMiddlewareDescriptor<C>,
    ) -> Self {
        self.streams.push(descriptor.into_registration());
        self
    }

    /// Adjusts the middleware registered under `name`.
    ///
    /// The override applies to every pipeline kind that has a middleware
    /// with that name.
    pub fn override_middleware(
        mut self,
        name: impl Into<String>,
        adjustment: MiddlewareOverride,
    ) -> Self {
        self.overrides.insert(name.into(), adjustment);
        self
    }

    /// Adds several overrides at once, e.g. from configuration.
    pub fn overrides(
        mut self,
        overrides: impl IntoIterator<Item = (String, MiddlewareOverride)>,
    ) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Sets the notification failure policy.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.options.failure_policy = policy;
        self
    }

    /// Sets how notification consumers are scheduled.
    pub fn publish_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// Sets both publish options.
    pub fn publish_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Token whose children are used by calls made without their own token.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Freezes the configuration.
    pub fn build(self) -> BuildResult<Mediator> {
        let resolver = self.resolver.ok_or(BuildError::MissingResolver)?;

        let known: BTreeSet<&str> = self
            .requests
            .iter()
            .chain(&self.notifications)
            .chain(&self.streams)
            .map(|registration| registration.name.as_str())
            .collect();
        for name in self.overrides.keys() {
            if !known.contains(name.as_str()) {
                warn!(middleware = %name, "Override names no registered middleware");
            }
        }

        let requests = freeze(self.requests, &self.overrides)?;
        let notifications = freeze(self.notifications, &self.overrides)?;
        let streams = freeze(self.streams, &self.overrides)?;

        info!(
            request_middleware = requests.len(),
            notification_middleware = notifications.len(),
            stream_middleware = streams.len(),
            failure_policy = ?self.options.failure_policy,
            strategy = ?self.options.strategy,
            "Mediator built"
        );

        Ok(Mediator {
            inner: Arc::new(MediatorInner {
                resolver,
                requests,
                streams,
                notifications: NotificationPipeline::new(notifications),
                request_pipelines: PipelineCache::default(),
                stream_pipelines: PipelineCache::default(),
                subscriptions: SubscriptionRegistry::new(),
                options: self.options,
                shutdown: self.shutdown.unwrap_or_default(),
            }),
        })
    }
}

// =============================================================================
// Mediator
// =============================================================================

struct MediatorInner {
    resolver: Arc<dyn HandlerResolver>,
    requests: Vec<FrozenMiddleware>,
    streams: Vec<FrozenMiddleware>,
    notifications: NotificationPipeline,
    request_pipelines: PipelineCache,
    stream_pipelines: PipelineCache,
    subscriptions: SubscriptionRegistry,
    options: PublishOptions,
    shutdown: CancellationToken,
}

/// Dispatches messages to handlers through middleware pipelines.
///
/// Cheap to clone; clones share pipelines, caches and subscriptions. All
/// work runs on the caller's task.
#[derive(Clone)]
pub struct Mediator {
    inner: Arc<MediatorInner>,
}

impl Mediator {
    /// Starts building a mediator.
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    // ─── Requests ────────────────────────────────────────────────────────────

    /// Sends a request to its single handler.
    pub async fn send<R: Request>(&self, request: R) -> DispatchResult<R::Response> {
        self.send_with(request, self.inner.shutdown.child_token()).await
    }

    /// Sends a request under the given cancellation token.
    ///
    /// The handler is resolved before any middleware runs, so resolution
    /// errors are reported even if the chain would have short-circuited.
    pub async fn send_with<R: Request>(
        &self,
        request: R,
        token: CancellationToken,
    ) -> DispatchResult<R::Response> {
        let message = type_name::<R>();
        let span = span!(Level::DEBUG, "courier.send", message_type = message);

        async move {
            let handler = single(message, resolve_request::<R>(self.inner.resolver.as_ref())?)?;
            let ctx = CallContext::new(message, token);
            ctx.check_cancelled()?;

            let pipeline = self.request_pipeline::<R>();
            debug!(handler = handler.name(), "Dispatching request");
            request::dispatch(&pipeline, handler.as_ref(), &request, &ctx).await
        }
        .instrument(span)
        .await
    }

    fn request_pipeline<R: Request>(&self) -> Arc<RequestPipeline<R>> {
        self.inner
            .request_pipelines
            .get_or_build(PipelineKey::of::<R, R::Response>(), || {
                RequestPipeline::<R>::build(&self.inner.requests)
            })
    }

    // ─── Streams ─────────────────────────────────────────────────────────────

    /// Opens a stream from the single handler of `R`.
    ///
    /// Resolution errors are returned immediately. Nothing else runs until
    /// the stream is first polled.
    pub fn send_stream<R: StreamRequest>(
        &self,
        request: R,
    ) -> DispatchResult<ResponseStream<R::Item>> {
        self.send_stream_with(request, self.inner.shutdown.child_token())
    }

    /// Opens a stream under the given cancellation token.
    pub fn send_stream_with<R: StreamRequest>(
        &self,
        request: R,
        token: CancellationToken,
    ) -> DispatchResult<ResponseStream<R::Item>> {
        let message = type_name::<R>();
        let span = span!(Level::DEBUG, "courier.stream", message_type = message);
        let _entered = span.enter();

        let handler = single(message, resolve_stream::<R>(self.inner.resolver.as_ref())?)?;
        if token.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let pipeline = self.stream_pipeline::<R>();
        debug!(handler = handler.name(), "Opening stream");

        let ctx = CallContext::new(message, token.child_token());
        Ok(stream::open(pipeline, handler, request, ctx, span.clone()))
    }

    fn stream_pipeline<R: StreamRequest>(&self) -> Arc<StreamPipeline<R>> {
        self.inner
            .stream_pipelines
            .get_or_build(PipelineKey::of::<R, R::Item>(), || {
                StreamPipeline::<R>::build(&self.inner.streams)
            })
    }

    // ─── Notifications ───────────────────────────────────────────────────────

    /// Publishes a notification to every handler and subscriber.
    ///
    /// Having no consumers at all is not an error.
    pub async fn publish<N: Notification>(&self, notification: N) -> DispatchResult<()> {
        self.publish_with(notification, self.inner.shutdown.child_token())
            .await
    }

    /// Publishes under the given cancellation token.
    pub async fn publish_with<N: Notification>(
        &self,
        notification: N,
        token: CancellationToken,
    ) -> DispatchResult<()> {
        let message = type_name::<N>();
        let span = span!(Level::DEBUG, "courier.publish", message_type = message);

        async move {
            let handlers = resolve_notification::<N>(self.inner.resolver.as_ref())?;
            let fan_out = FanOut::new(
                handlers,
                self.inner.subscriptions.snapshot(),
                self.inner.options,
            );
            let ctx = CallContext::new(message, token);
            self.inner
                .notifications
                .run(&notification, &ctx, &fan_out)
                .await
        }
        .instrument(span)
        .await
    }

    /// Subscribes `subscriber` to notifications of type `N`.
    pub fn subscribe<N, S>(&self, subscriber: Arc<S>) -> SubscriptionId
    where
        N: Notification,
        S: NotificationHandler<N>,
    {
        self.inner.subscriptions.subscribe::<N, S>(subscriber)
    }

    /// Subscribes `subscriber` to every notification.
    pub fn subscribe_broadcast<S: BroadcastHandler>(&self, subscriber: Arc<S>) -> SubscriptionId {
        self.inner.subscriptions.subscribe_broadcast(subscriber)
    }

    /// Removes one typed subscription of this instance. Returns `false` if
    /// there was none.
    pub fn unsubscribe<N, S>(&self, subscriber: &Arc<S>) -> bool
    where
        N: Notification,
        S: NotificationHandler<N>,
    {
        self.inner.subscriptions.unsubscribe::<N, S>(subscriber)
    }

    /// Removes one broadcast subscription of this instance.
    pub fn unsubscribe_broadcast<S: BroadcastHandler>(&self, subscriber: &Arc<S>) -> bool {
        self.inner.subscriptions.unsubscribe_broadcast(subscriber)
    }

    /// Removes a subscription by handle.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.remove(id)
    }

    /// Live subscriptions in registration order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.subscriptions.list()
    }

    // ─── Diagnostics ─────────────────────────────────────────────────────────

    /// The resolved request chain for `R`.
    pub fn describe_request<R: Request>(&self) -> PipelineReport {
        self.request_pipeline::<R>().report().clone()
    }

    /// The resolved stream chain for `R`.
    pub fn describe_stream<R: StreamRequest>(&self) -> PipelineReport {
        self.stream_pipeline::<R>().report().clone()
    }

    /// Every enabled notification middleware in execution order.
    pub fn describe_notifications(&self) -> PipelineReport {
        self.inner.notifications.report()
    }

    /// The notification middleware that act on `N`.
    pub fn describe_notification<N: Notification>(&self) -> PipelineReport {
        self.inner.notifications.report_for::<N>()
    }

    /// Every registered middleware with overrides applied: request, then
    /// notification, then stream, each in registration order.
    ///
    /// Unlike the `describe_*` reports this ignores capabilities and order.
    pub fn registrations(&self) -> Vec<MiddlewareInfo> {
        let requests = self.inner.requests.iter().map(|entry| entry.info.clone());
        let streams = self.inner.streams.iter().map(|entry| entry.info.clone());
        requests
            .chain(self.inner.notifications.registrations())
            .chain(streams)
            .collect()
    }

    /// Publish options fixed at build time.
    pub fn publish_options(&self) -> PublishOptions {
        self.inner.options
    }

    /// Token whose children are handed to calls without their own token.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    // ─── tower ───────────────────────────────────────────────────────────────

    /// A [`tower::Service`] sending requests of type `R`.
    pub fn request_service<R: Request>(&self) -> RequestService<R> {
        RequestService::new(self.clone())
    }

    /// A [`tower::Service`] publishing notifications of type `N`.
    pub fn publish_service<N: Notification>(&self) -> PublishService<N> {
        PublishService::new(self.clone())
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("request_middleware", &self.inner.requests.len())
            .field("stream_middleware", &self.inner.streams.len())
            .field(
                "cached_pipelines",
                &(self.inner.request_pipelines.len() + self.inner.stream_pipelines.len()),
            )
            .field("subscriptions", &self.inner.subscriptions.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Requires exactly one handler.
fn single<T: ?Sized>(message: &'static str, mut handlers: Vec<Arc<T>>) -> DispatchResult<Arc<T>> {
    match (handlers.pop(), handlers.len()) {
        (Some(handler), 0) => Ok(handler),
        (None, _) => Err(DispatchError::HandlerNotFound { message }),
        (Some(_), rest) => Err(DispatchError::AmbiguousHandler {
            message,
            count: rest + 1,
        }),
    }
}
