//! Shared fixtures for the dispatch scenarios.

#![allow(dead_code)]

use std::sync::Arc;

use courier_core::{
    AnyMessage, BoxError, CallContext, Capabilities, DispatchResult, Middleware, Next,
    NotificationMiddleware, NotificationNext, Reply, Request, RequestHandler, async_trait,
};
use courier_framework::{Validate, ValidationError};
use parking_lot::Mutex;

/// Ordered log of what ran.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|recorded| *recorded == entry).count()
    }
}

/// Forwards unchanged.
pub struct Passthrough;

#[async_trait]
impl Middleware<AnyMessage> for Passthrough {
    async fn handle(
        &self,
        _request: &AnyMessage,
        _ctx: &CallContext,
        next: Next<'_>,
    ) -> DispatchResult<Reply> {
        next.run().await
    }
}

/// Records `label:pre` before and `label:post` or `label:error` after the
/// wrapped middleware.
pub struct Traced<M> {
    label: &'static str,
    inner: M,
    journal: Journal,
}

impl<M> Traced<M> {
    pub fn new(label: &'static str, inner: M, journal: &Journal) -> Self {
        Self {
            label,
            inner,
            journal: journal.clone(),
        }
    }
}

impl Traced<Passthrough> {
    pub fn recorder(label: &'static str, journal: &Journal) -> Self {
        Self::new(label, Passthrough, journal)
    }
}

#[async_trait]
impl<C, M> Middleware<C> for Traced<M>
where
    C: ?Sized + Sync + 'static,
    M: Middleware<C>,
{
    async fn handle(&self, request: &C, ctx: &CallContext, next: Next<'_>) -> DispatchResult<Reply> {
        self.journal.record(format!("{}:pre", self.label));
        let result = self.inner.handle(request, ctx, next).await;
        let outcome = if result.is_ok() { "post" } else { "error" };
        self.journal.record(format!("{}:{outcome}", self.label));
        result
    }
}

/// Notification middleware recording `label` each time it acts.
pub struct NotificationRecorder {
    pub label: &'static str,
    pub journal: Journal,
}

#[async_trait]
impl NotificationMiddleware<AnyMessage> for NotificationRecorder {
    async fn handle(
        &self,
        _notification: &AnyMessage,
        _ctx: &CallContext,
        next: NotificationNext<'_>,
    ) -> DispatchResult<()> {
        self.journal.record(self.label);
        next.run().await
    }
}

// ─── CreateOrder ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub customer: String,
    pub quantity: u32,
}

impl CreateOrder {
    pub fn valid() -> Self {
        Self {
            customer: "ada".into(),
            quantity: 2,
        }
    }

    pub fn invalid() -> Self {
        Self {
            customer: String::new(),
            quantity: 0,
        }
    }
}

impl Request for CreateOrder {
    type Response = u64;

    fn capabilities() -> Capabilities<Self> {
        Capabilities::new().with::<dyn Validate>(|order| order)
    }
}

impl Validate for CreateOrder {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        if self.customer.is_empty() {
            violations.push("customer is required".to_string());
        }
        if self.quantity == 0 {
            violations.push("quantity must be positive".to_string());
        }
        ValidationError::check(violations)
    }
}

pub struct CreateOrderHandler {
    pub journal: Journal,
}

#[async_trait]
impl RequestHandler<CreateOrder> for CreateOrderHandler {
    async fn handle(&self, order: &CreateOrder, _ctx: &CallContext) -> Result<u64, BoxError> {
        self.journal.record("handler");
        Ok(1000 + u64::from(order.quantity))
    }
}

// ─── Ping ────────────────────────────────────────────────────────────────────

/// A request with no declared capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping(pub u32);

impl Request for Ping {
    type Response = u32;
}

pub struct PingHandler {
    pub journal: Journal,
}

#[async_trait]
impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, ping: &Ping, _ctx: &CallContext) -> Result<u32, BoxError> {
        self.journal.record("handler");
        Ok(ping.0 + 1)
    }
}
