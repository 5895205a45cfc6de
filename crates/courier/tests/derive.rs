use std::sync::Arc;

use courier::prelude::*;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

#[derive(Debug, Request)]
#[request(response = u64, capabilities(dyn Validate, dyn Idempotent))]
struct Reserve {
    quantity: u32,
}

impl Validate for Reserve {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity == 0 {
            return Err(ValidationError::new("quantity must be positive"));
        }
        Ok(())
    }
}

impl Idempotent for Reserve {}

#[derive(Debug, Request)]
struct Forget;

#[derive(Debug, Clone, Notification)]
#[notification(capabilities(dyn Validate))]
struct Restocked {
    sku: String,
}

impl Validate for Restocked {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.sku.is_empty() {
            return Err(ValidationError::new("sku is required"));
        }
        Ok(())
    }
}

#[derive(Debug, StreamRequest)]
#[stream_request(item = String)]
struct ListSkus;

struct Warehouse {
    restocked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RequestHandler<Reserve> for Warehouse {
    async fn handle(&self, request: &Reserve, _ctx: &CallContext) -> Result<u64, BoxError> {
        Ok(u64::from(request.quantity) * 10)
    }
}

#[async_trait]
impl RequestHandler<Forget> for Warehouse {
    async fn handle(&self, _request: &Forget, _ctx: &CallContext) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler<Restocked> for Warehouse {
    async fn handle(&self, notification: &Restocked, _ctx: &CallContext) -> Result<(), BoxError> {
        self.restocked.lock().push(notification.sku.clone());
        Ok(())
    }
}

impl StreamHandler<ListSkus> for Warehouse {
    fn handle(
        &self,
        _request: Arc<ListSkus>,
        _ctx: CallContext,
    ) -> BoxStream<'static, Result<String, BoxError>> {
        stream::iter(["A-1", "B-2"].map(|sku| Ok(sku.to_string()))).boxed()
    }
}

/// Only matches stream requests that declare `dyn Validate`.
struct ValidatedOnly;

impl StreamMiddleware<dyn Validate> for ValidatedOnly {
    fn handle(&self, _request: &dyn Validate, _ctx: &CallContext, next: StreamNext) -> ItemStream {
        next.run()
    }
}

fn mediator(restocked: &Arc<Mutex<Vec<String>>>) -> Mediator {
    let warehouse = || Warehouse {
        restocked: Arc::clone(restocked),
    };
    Mediator::builder()
        .handlers(
            HandlerRegistry::new()
                .request::<Reserve, _>(warehouse())
                .request::<Forget, _>(warehouse())
                .notification::<Restocked, _>(warehouse())
                .stream::<ListSkus, _>(warehouse()),
        )
        .middleware(MiddlewareDescriptor::<dyn Validate>::new(ValidationMiddleware))
        .notification_middleware(NotificationMiddlewareDescriptor::<dyn Validate>::new(
            ValidationMiddleware,
        ))
        .stream_middleware(StreamMiddlewareDescriptor::<dyn Validate>::new(ValidatedOnly))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_derived_request_capabilities() {
    let restocked = Arc::default();
    let mediator = mediator(&restocked);

    assert_eq!(mediator.send(Reserve { quantity: 3 }).await.unwrap(), 30);
    assert!(mediator.send(Reserve { quantity: 0 }).await.is_err());
    assert_eq!(
        mediator.describe_request::<Reserve>().stage_names(),
        vec!["ValidationMiddleware"]
    );
}

#[tokio::test]
async fn test_derived_request_defaults_to_unit_response() {
    let restocked = Arc::default();
    let mediator = mediator(&restocked);

    mediator.send(Forget).await.unwrap();
    assert!(
        mediator
            .describe_request::<Forget>()
            .stage_names()
            .is_empty()
    );
}

#[tokio::test]
async fn test_derived_notification() {
    let restocked = Arc::default();
    let mediator = mediator(&restocked);

    mediator
        .publish(Restocked {
            sku: "A-1".to_string(),
        })
        .await
        .unwrap();
    assert!(
        mediator
            .publish(Restocked { sku: String::new() })
            .await
            .is_err()
    );
    assert_eq!(*restocked.lock(), vec!["A-1".to_string()]);
}

#[tokio::test]
async fn test_derived_stream_request() {
    let restocked = Arc::default();
    let mediator = mediator(&restocked);

    let skus: Vec<String> = mediator
        .send_stream(ListSkus)
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(skus, vec!["A-1", "B-2"]);
    assert!(
        mediator
            .describe_stream::<ListSkus>()
            .exclusion("ValidatedOnly")
            .is_some()
    );
}
