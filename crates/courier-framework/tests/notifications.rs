mod common;

use std::sync::Arc;

use common::{Journal, NotificationRecorder};
use courier_core::{
    AnyMessage, BoxError, BroadcastHandler, CallContext, CancellationToken, Capabilities,
    ConsumerOrigin, DispatchError, HandlerRegistry, Notification, NotificationHandler,
    async_trait,
};
use courier_framework::{
    Exclusion, FailurePolicy, LoggingMiddleware, Mediator, MediatorBuilder,
    NotificationMiddlewareDescriptor, PublishStrategy, Validate, ValidationError,
    ValidationMiddleware,
};
use tower::ServiceExt;

#[derive(Debug, Clone)]
struct OrderShipped {
    order: u64,
}

impl Notification for OrderShipped {
    fn capabilities() -> Capabilities<Self> {
        Capabilities::new().with::<dyn Validate>(|event| event)
    }
}

impl Validate for OrderShipped {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.order == 0 {
            Err(ValidationError::new("order id must be set"))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
struct InventoryLow;

impl Notification for InventoryLow {}

/// Records `label` for every notification it sees.
struct Probe {
    label: &'static str,
    journal: Journal,
    outcome: Outcome,
}

#[derive(Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Cancel,
}

impl Probe {
    fn new(label: &'static str, journal: &Journal) -> Self {
        Self::with_outcome(label, journal, Outcome::Succeed)
    }

    fn with_outcome(label: &'static str, journal: &Journal, outcome: Outcome) -> Self {
        Self {
            label,
            journal: journal.clone(),
            outcome,
        }
    }

    fn consume(&self) -> Result<(), BoxError> {
        self.journal.record(self.label);
        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(format!("{} exploded", self.label).into()),
            Outcome::Cancel => Err(DispatchError::Cancelled.into()),
        }
    }
}

#[async_trait]
impl NotificationHandler<OrderShipped> for Probe {
    async fn handle(&self, _: &OrderShipped, _: &CallContext) -> Result<(), BoxError> {
        self.consume()
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

#[async_trait]
impl NotificationHandler<InventoryLow> for Probe {
    async fn handle(&self, _: &InventoryLow, _: &CallContext) -> Result<(), BoxError> {
        self.consume()
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

#[async_trait]
impl BroadcastHandler for Probe {
    async fn handle(&self, _: &AnyMessage, _: &CallContext) -> Result<(), BoxError> {
        self.consume()
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

fn two_handlers(journal: &Journal) -> MediatorBuilder {
    Mediator::builder().handlers(
        HandlerRegistry::new()
            .notification::<OrderShipped, _>(Probe::new("handler-1", journal))
            .notification::<OrderShipped, _>(Probe::new("handler-2", journal)),
    )
}

fn shipped() -> OrderShipped {
    OrderShipped { order: 7 }
}

#[tokio::test]
async fn test_publish_reaches_handlers_then_typed_then_broadcast() {
    let journal = Journal::new();
    let mediator = two_handlers(&journal).build().unwrap();

    mediator.subscribe_broadcast(Arc::new(Probe::new("broadcast", &journal)));
    mediator.subscribe::<OrderShipped, _>(Arc::new(Probe::new("typed-1", &journal)));
    mediator.subscribe::<OrderShipped, _>(Arc::new(Probe::new("typed-2", &journal)));
    mediator.subscribe::<InventoryLow, _>(Arc::new(Probe::new("other-type", &journal)));

    mediator.publish(shipped()).await.unwrap();

    assert_eq!(
        journal.entries(),
        vec!["handler-1", "handler-2", "typed-1", "typed-2", "broadcast"]
    );
}

#[tokio::test]
async fn test_publish_without_consumers_succeeds() {
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .build()
        .unwrap();
    mediator.publish(InventoryLow).await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_removes_only_that_subscription() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .build()
        .unwrap();

    let probe = Arc::new(Probe::new("probe", &journal));
    let twin = Arc::new(Probe::new("twin", &journal));
    mediator.subscribe::<OrderShipped, _>(Arc::clone(&probe));
    mediator.subscribe::<InventoryLow, _>(Arc::clone(&probe));
    mediator.subscribe_broadcast(Arc::clone(&probe));
    mediator.subscribe::<OrderShipped, _>(Arc::clone(&twin));

    assert!(mediator.unsubscribe::<OrderShipped, _>(&probe));
    assert!(!mediator.unsubscribe::<OrderShipped, _>(&probe));

    mediator.publish(shipped()).await.unwrap();
    assert_eq!(journal.entries(), vec!["twin", "probe"]);

    mediator.publish(InventoryLow).await.unwrap();
    assert_eq!(journal.count("probe"), 3);
    assert_eq!(mediator.subscriptions().len(), 3);
}

#[tokio::test]
async fn test_unsubscribe_by_id() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .build()
        .unwrap();

    let id = mediator.subscribe_broadcast(Arc::new(Probe::new("gone", &journal)));
    assert!(mediator.unsubscribe_id(id));
    assert!(!mediator.unsubscribe_id(id));

    mediator.publish(InventoryLow).await.unwrap();
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_unsubscribe_broadcast_removes_one_delivery_per_call() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .build()
        .unwrap();

    let probe = Arc::new(Probe::new("probe", &journal));
    mediator.subscribe_broadcast(Arc::clone(&probe));
    mediator.subscribe_broadcast(Arc::clone(&probe));
    mediator.subscribe::<InventoryLow, _>(Arc::clone(&probe));

    assert!(mediator.unsubscribe_broadcast(&probe));
    mediator.publish(OrderShipped { order: 1 }).await.unwrap();
    assert_eq!(journal.count("probe"), 1);

    assert!(mediator.unsubscribe_broadcast(&probe));
    assert!(!mediator.unsubscribe_broadcast(&probe));

    // The typed subscription of the same instance survives.
    mediator.publish(InventoryLow).await.unwrap();
    assert_eq!(journal.count("probe"), 2);
    assert_eq!(mediator.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(
            HandlerRegistry::new()
                .notification::<OrderShipped, _>(Probe::new("ok", &journal))
                .notification::<OrderShipped, _>(Probe::with_outcome(
                    "broken",
                    &journal,
                    Outcome::Fail,
                )),
        )
        .build()
        .unwrap();
    mediator.subscribe::<OrderShipped, _>(Arc::new(Probe::new("late", &journal)));

    let error = mediator.publish(shipped()).await.unwrap_err();
    let DispatchError::ConsumerFailed { failure, .. } = error else {
        panic!("expected a single consumer failure, got {error:?}");
    };
    assert_eq!(failure.consumer, "broken");
    assert_eq!(failure.origin, ConsumerOrigin::Handler);
    assert_eq!(failure.position, 1);
    assert_eq!(journal.entries(), vec!["ok", "broken"]);
}

#[tokio::test]
async fn test_aggregate_invokes_everyone() {
    let journal = Journal::new();
    let mediator = two_handlers(&journal)
        .failure_policy(FailurePolicy::Aggregate)
        .build()
        .unwrap();
    mediator.subscribe::<OrderShipped, _>(Arc::new(Probe::with_outcome(
        "typed",
        &journal,
        Outcome::Fail,
    )));
    mediator.subscribe_broadcast(Arc::new(Probe::with_outcome(
        "broadcast",
        &journal,
        Outcome::Fail,
    )));

    let error = mediator.publish(shipped()).await.unwrap_err();
    let DispatchError::ConsumersFailed { failures, .. } = error else {
        panic!("expected aggregated failures, got {error:?}");
    };
    let failed: Vec<_> = failures
        .iter()
        .map(|failure| (failure.consumer, failure.origin, failure.position))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("typed", ConsumerOrigin::Subscriber, 2),
            ("broadcast", ConsumerOrigin::Broadcast, 3)
        ]
    );
    assert_eq!(journal.entries().len(), 4);
}

#[tokio::test]
async fn test_concurrent_strategy_delivers_to_all() {
    let journal = Journal::new();
    let mediator = two_handlers(&journal)
        .publish_strategy(PublishStrategy::Concurrent)
        .failure_policy(FailurePolicy::Aggregate)
        .build()
        .unwrap();
    mediator.subscribe::<OrderShipped, _>(Arc::new(Probe::with_outcome(
        "typed",
        &journal,
        Outcome::Fail,
    )));

    let error = mediator.publish(shipped()).await.unwrap_err();
    assert!(matches!(
        error,
        DispatchError::ConsumersFailed { ref failures, .. } if failures.len() == 1
    ));
    assert_eq!(journal.entries().len(), 3);
}

#[tokio::test]
async fn test_cancelled_consumer_is_not_a_failure() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new().notification::<OrderShipped, _>(Probe::with_outcome(
            "stopping",
            &journal,
            Outcome::Cancel,
        )))
        .failure_policy(FailurePolicy::Aggregate)
        .build()
        .unwrap();

    let error = mediator.publish(shipped()).await.unwrap_err();
    assert!(error.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_publish_invokes_nobody() {
    let journal = Journal::new();
    let mediator = two_handlers(&journal).build().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let error = mediator.publish_with(shipped(), token).await.unwrap_err();
    assert!(error.is_cancelled());
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_notification_middleware_checks_capability_per_publish() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(
            HandlerRegistry::new()
                .notification::<OrderShipped, _>(Probe::new("shipped", &journal))
                .notification::<InventoryLow, _>(Probe::new("inventory", &journal)),
        )
        .notification_middleware(
            NotificationMiddlewareDescriptor::<AnyMessage>::new(NotificationRecorder {
                label: "recorder",
                journal: journal.clone(),
            })
            .named("recorder"),
        )
        .notification_middleware(
            NotificationMiddlewareDescriptor::<dyn Validate>::new(ValidationMiddleware).order(10),
        )
        .notification_middleware(
            NotificationMiddlewareDescriptor::<AnyMessage>::new(LoggingMiddleware::default())
                .order(20),
        )
        .build()
        .unwrap();

    // No capability: forwarded past validation untouched.
    mediator.publish(InventoryLow).await.unwrap();
    assert_eq!(journal.entries(), vec!["recorder", "inventory"]);

    let error = mediator
        .publish(OrderShipped { order: 0 })
        .await
        .unwrap_err();
    assert!(error.as_handler_error().is_some());
    assert_eq!(journal.count("shipped"), 0);

    mediator.publish(shipped()).await.unwrap();
    assert_eq!(journal.count("shipped"), 1);

    let all = mediator.describe_notifications();
    assert_eq!(
        all.stage_names(),
        vec!["recorder", "ValidationMiddleware", "LoggingMiddleware"]
    );

    let inventory = mediator.describe_notification::<InventoryLow>();
    assert_eq!(inventory.stage_names(), vec!["recorder", "LoggingMiddleware"]);
    assert!(matches!(
        inventory.exclusion("ValidationMiddleware"),
        Some(Exclusion::ConstraintMismatch { .. })
    ));
}

#[tokio::test]
async fn test_conditional_notification_middleware() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .notification_middleware(
            NotificationMiddlewareDescriptor::<OrderShipped>::new(ShippedAudit {
                journal: journal.clone(),
            })
            .when(|event: &OrderShipped| event.order > 100),
        )
        .build()
        .unwrap();

    mediator.publish(shipped()).await.unwrap();
    mediator.publish(OrderShipped { order: 500 }).await.unwrap();
    assert_eq!(journal.entries(), vec!["audit 500"]);
}

struct ShippedAudit {
    journal: Journal,
}

#[async_trait]
impl courier_core::NotificationMiddleware<OrderShipped> for ShippedAudit {
    async fn handle(
        &self,
        event: &OrderShipped,
        _ctx: &CallContext,
        next: courier_core::NotificationNext<'_>,
    ) -> courier_core::DispatchResult<()> {
        self.journal.record(format!("audit {}", event.order));
        next.run().await
    }
}

/// Subscribes another probe while being notified.
struct Recruiter {
    mediator: Mediator,
    journal: Journal,
}

#[async_trait]
impl NotificationHandler<InventoryLow> for Recruiter {
    async fn handle(&self, _: &InventoryLow, _: &CallContext) -> Result<(), BoxError> {
        self.journal.record("recruiter");
        self.mediator
            .subscribe::<InventoryLow, _>(Arc::new(Probe::new("recruit", &self.journal)));
        Ok(())
    }
}

#[tokio::test]
async fn test_subscribing_during_publish_affects_next_publish() {
    let journal = Journal::new();
    let mediator = Mediator::builder()
        .handlers(HandlerRegistry::new())
        .build()
        .unwrap();
    let recruiter = Arc::new(Recruiter {
        mediator: mediator.clone(),
        journal: journal.clone(),
    });
    mediator.subscribe::<InventoryLow, _>(Arc::clone(&recruiter));

    mediator.publish(InventoryLow).await.unwrap();
    assert_eq!(journal.entries(), vec!["recruiter"]);

    assert!(mediator.unsubscribe::<InventoryLow, _>(&recruiter));
    mediator.publish(InventoryLow).await.unwrap();
    assert_eq!(journal.entries(), vec!["recruiter", "recruit"]);
}

#[tokio::test]
async fn test_publish_service() {
    let journal = Journal::new();
    let mediator = two_handlers(&journal).build().unwrap();

    mediator
        .publish_service::<OrderShipped>()
        .oneshot(shipped())
        .await
        .unwrap();
    assert_eq!(journal.entries().len(), 2);
}
