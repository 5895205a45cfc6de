//! Orders Demo
//!
//! Walks through the main Courier features with a small order book:
//!
//! - `CreateOrder` goes through logging, validation, timeout and retry
//!   middleware before reaching its single handler
//! - `OrderPlaced` fans out to two handlers, a typed subscriber and a
//!   broadcast audit trail
//! - `ListOrders` streams the book lazily
//!
//! # Usage
//!
//! ```bash
//! cargo run --package orders-demo -- --quantity 3
//! cargo run --package orders-demo -- --config demos/orders/courier.toml --describe
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::Result;
use clap::Parser;
use courier::prelude::*;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Order placement walkthrough for the Courier mediator")]
struct Args {
    /// Configuration file; the default search locations are used otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(long, default_value = "development")]
    profile: String,

    /// Quantity of the first order.
    #[arg(long, default_value_t = 2)]
    quantity: u32,

    /// Print the resolved request pipeline as JSON.
    #[arg(long)]
    describe: bool,

    /// Keep running until Ctrl+C.
    #[arg(long)]
    serve: bool,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Request)]
#[request(response = u64, capabilities(dyn Validate, dyn Idempotent))]
struct CreateOrder {
    sku: String,
    quantity: u32,
}

impl Validate for CreateOrder {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        if self.sku.trim().is_empty() {
            violations.push("sku is required".to_string());
        }
        if self.quantity == 0 {
            violations.push("quantity must be positive".to_string());
        }
        ValidationError::check(violations)
    }
}

impl Idempotent for CreateOrder {}

#[derive(Debug, Clone, Notification)]
struct OrderPlaced {
    id: u64,
    sku: String,
    quantity: u32,
}

#[derive(Debug, StreamRequest)]
#[stream_request(item = Order)]
struct ListOrders;

#[derive(Debug, Clone)]
struct Order {
    id: u64,
    sku: String,
    quantity: u32,
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Clone, Default)]
struct OrderBook {
    next_id: Arc<AtomicU64>,
    orders: Arc<Mutex<Vec<Order>>>,
}

impl OrderBook {
    fn place(&self, request: &CreateOrder) -> Order {
        let id = 1001 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let order = Order {
            id,
            sku: request.sku.clone(),
            quantity: request.quantity,
        };
        self.orders.lock().push(order.clone());
        order
    }
}

#[async_trait]
impl RequestHandler<CreateOrder> for OrderBook {
    async fn handle(&self, request: &CreateOrder, _ctx: &CallContext) -> Result<u64, BoxError> {
        Ok(self.place(request).id)
    }
}

impl StreamHandler<ListOrders> for OrderBook {
    fn handle(
        &self,
        _request: Arc<ListOrders>,
        _ctx: CallContext,
    ) -> futures::stream::BoxStream<'static, Result<Order, BoxError>> {
        let orders = Arc::clone(&self.orders);
        stream::unfold(0usize, move |index| {
            let orders = Arc::clone(&orders);
            async move {
                let order = orders.lock().get(index).cloned()?;
                Some((Ok(order), index + 1))
            }
        })
        .boxed()
    }
}

struct SendConfirmation;

#[async_trait]
impl NotificationHandler<OrderPlaced> for SendConfirmation {
    async fn handle(&self, placed: &OrderPlaced, _ctx: &CallContext) -> Result<(), BoxError> {
        info!(order = placed.id, "Confirmation sent");
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Inventory {
    reserved: Arc<Mutex<Vec<(String, u32)>>>,
}

#[async_trait]
impl NotificationHandler<OrderPlaced> for Inventory {
    async fn handle(&self, placed: &OrderPlaced, _ctx: &CallContext) -> Result<(), BoxError> {
        self.reserved.lock().push((placed.sku.clone(), placed.quantity));
        Ok(())
    }
}

/// Typed subscriber added and removed at runtime.
struct Dashboard;

#[async_trait]
impl NotificationHandler<OrderPlaced> for Dashboard {
    async fn handle(&self, placed: &OrderPlaced, _ctx: &CallContext) -> Result<(), BoxError> {
        info!(order = placed.id, sku = %placed.sku, "Dashboard updated");
        Ok(())
    }
}

/// Sees every notification.
#[derive(Default)]
struct AuditTrail {
    seen: AtomicUsize,
}

#[async_trait]
impl BroadcastHandler for AuditTrail {
    async fn handle(&self, notification: &AnyMessage, _ctx: &CallContext) -> Result<(), BoxError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        info!(notification = notification.message_name(), "Audited");
        Ok(())
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let book = OrderBook::default();
    let inventory = Inventory::default();
    let handlers = HandlerRegistry::new()
        .request::<CreateOrder, _>(book.clone())
        .stream::<ListOrders, _>(book.clone())
        .notification::<OrderPlaced, _>(SendConfirmation)
        .notification::<OrderPlaced, _>(inventory.clone());

    let mut builder = CourierRuntime::builder().profile(&args.profile);
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder
        .handlers(handlers)
        .configure(|mediator| {
            mediator
                .middleware(
                    MiddlewareDescriptor::<AnyMessage>::new(LoggingMiddleware::default())
                        .order(-100),
                )
                .middleware(MiddlewareDescriptor::<dyn Validate>::new(ValidationMiddleware))
                .middleware(MiddlewareDescriptor::<AnyMessage>::configured::<TimeoutMiddleware>())
                .middleware(
                    MiddlewareDescriptor::<dyn Idempotent>::configured::<RetryMiddleware>()
                        .order(10),
                )
                .notification_middleware(NotificationMiddlewareDescriptor::<AnyMessage>::new(
                    LoggingMiddleware::default(),
                ))
                .stream_middleware(StreamMiddlewareDescriptor::<AnyMessage>::new(
                    LoggingMiddleware::default(),
                ))
        })
        .build()?;
    let mediator = runtime.mediator().clone();

    if args.describe {
        let report = mediator.describe_request::<CreateOrder>();
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    // Requests
    let order = CreateOrder {
        sku: "TEA-01".to_string(),
        quantity: args.quantity,
    };
    let id = mediator.send(order.clone()).await?;
    info!(id, "Order created");

    match mediator
        .send(CreateOrder {
            sku: String::new(),
            quantity: 0,
        })
        .await
    {
        Ok(id) => warn!(id, "Invalid order was accepted"),
        Err(error) => info!(%error, "Invalid order rejected"),
    }

    // Notifications
    let dashboard = Arc::new(Dashboard);
    let audit = Arc::new(AuditTrail::default());
    mediator.subscribe::<OrderPlaced, _>(Arc::clone(&dashboard));
    mediator.subscribe_broadcast(Arc::clone(&audit));

    mediator
        .publish(OrderPlaced {
            id,
            sku: order.sku.clone(),
            quantity: order.quantity,
        })
        .await?;

    mediator.unsubscribe::<OrderPlaced, _>(&dashboard);
    let second = mediator
        .send(CreateOrder {
            sku: "MUG-02".to_string(),
            quantity: 1,
        })
        .await?;
    mediator
        .publish(OrderPlaced {
            id: second,
            sku: "MUG-02".to_string(),
            quantity: 1,
        })
        .await?;

    info!(
        reserved = inventory.reserved.lock().len(),
        audited = audit.seen.load(Ordering::SeqCst),
        subscriptions = mediator.subscriptions().len(),
        "Notifications delivered"
    );

    // Streams
    let mut orders = mediator.send_stream(ListOrders)?;
    while let Some(order) = orders.next().await {
        let order = order?;
        info!(id = order.id, sku = %order.sku, quantity = order.quantity, "Listed");
    }

    if args.serve {
        runtime.run_until_shutdown().await?;
    } else {
        runtime.shutdown();
    }

    Ok(())
}
