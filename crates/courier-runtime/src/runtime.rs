//! Host wiring: configuration, logging and the mediator in one place.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .config_file("config/courier.toml")
//!     .handlers(handlers)
//!     .configure(|mediator| {
//!         mediator.middleware(MiddlewareDescriptor::<AnyMessage>::new(TimeoutMiddleware::default()))
//!     })
//!     .build()?;
//!
//! let id = runtime.mediator().send(CreateOrder { quantity: 2 }).await?;
//! runtime.run_until_shutdown().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use courier_core::{HandlerRegistry, HandlerResolver};
use courier_framework::{Mediator, MediatorBuilder};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ConfigLoader, CourierConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LoggingError, LoggingGuard};

type Configure = Box<dyn FnOnce(MediatorBuilder) -> MediatorBuilder + Send>;

/// A frozen mediator together with the configuration it was built from.
///
/// The runtime owns the shutdown token handed to the mediator: after
/// [`shutdown`](Self::shutdown) every new and in-flight call observes
/// cancellation.
pub struct CourierRuntime {
    config: CourierConfig,
    mediator: Mediator,
    shutdown: CancellationToken,
    _logging: Option<LoggingGuard>,
}

impl CourierRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The mediator.
    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    /// The effective configuration.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Token cancelled on shutdown.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancels every in-flight and future call.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Courier runtime shutting down");
            self.shutdown.cancel();
        }
    }

    /// Waits for Ctrl+C, SIGTERM or [`shutdown`](Self::shutdown), then shuts down.
    pub async fn run_until_shutdown(&self) -> RuntimeResult<()> {
        info!("Courier runtime is running. Press Ctrl+C to stop.");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                }
                _ = self.shutdown.cancelled() => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C");
                }
                _ = self.shutdown.cancelled() => {}
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Runs until `shutdown` resolves, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {}
            _ = self.shutdown.cancelled() => {}
        }
        self.shutdown();
    }
}

impl std::fmt::Debug for CourierRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierRuntime")
            .field("mediator", &self.mediator)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`CourierRuntime`].
///
/// Pipeline overrides and notification options from the configuration are
/// applied after every [`configure`](Self::configure) callback, so files and
/// environment variables win over code defaults.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<CourierConfig>,
    resolver: Option<Arc<dyn HandlerResolver>>,
    configure: Vec<Configure>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the default locations.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            resolver: None,
            configure: Vec::new(),
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Replaces the loader entirely.
    pub fn loader(mut self, loader: ConfigLoader) -> Self {
        self.config_loader = loader;
        self
    }

    /// Uses `config` as-is instead of loading one.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses the in-memory handler registry.
    pub fn handlers(self, registry: HandlerRegistry) -> Self {
        self.resolver(registry)
    }

    /// Sets the handler resolver.
    pub fn resolver(mut self, resolver: impl HandlerResolver) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Registers middleware or other mediator settings.
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(MediatorBuilder) -> MediatorBuilder + Send + 'static,
    {
        self.configure.push(Box::new(configure));
        self
    }

    /// Leaves the global subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads and validates configuration, installs logging and freezes the mediator.
    pub fn build(self) -> RuntimeResult<CourierRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        let logging = if self.init_logging {
            match logging::init_from_config(&config.logging) {
                Ok(guard) => Some(guard),
                Err(LoggingError::AlreadyInitialized(_)) => {
                    debug!("Global subscriber already installed, keeping it");
                    None
                }
                Err(e) => return Err(RuntimeError::Logging(e)),
            }
        } else {
            None
        };

        let shutdown = CancellationToken::new();
        let mut builder = Mediator::builder().shutdown_token(shutdown.clone());
        if let Some(resolver) = self.resolver {
            builder = builder.shared_resolver(resolver);
        }
        for configure in self.configure {
            builder = configure(builder);
        }
        let mediator = builder
            .publish_options(config.notifications.options())
            .overrides(config.pipeline.middleware.clone())
            .build()?;

        info!(
            middleware = mediator.registrations().len(),
            overrides = config.pipeline.middleware.len(),
            "Courier runtime ready"
        );

        Ok(CourierRuntime {
            config,
            mediator,
            shutdown,
            _logging: logging,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::{
        AnyMessage, BoxError, CallContext, DispatchError, Request, RequestHandler, async_trait,
    };
    use courier_framework::{
        FailurePolicy, MiddlewareDescriptor, MiddlewareOverride, PublishStrategy,
        TimeoutMiddleware,
    };

    use super::*;
    use crate::config::NotificationConfig;

    struct Ping(u32);

    impl Request for Ping {
        type Response = u32;
    }

    struct PingHandler;

    #[async_trait]
    impl RequestHandler<Ping> for PingHandler {
        async fn handle(&self, request: &Ping, _ctx: &CallContext) -> Result<u32, BoxError> {
            Ok(request.0 + 1)
        }
    }

    fn handlers() -> HandlerRegistry {
        HandlerRegistry::new().request(PingHandler)
    }

    #[tokio::test]
    async fn test_build_and_send() {
        let runtime = CourierRuntime::builder()
            .config(CourierConfig::default())
            .handlers(handlers())
            .without_logging()
            .build()
            .unwrap();

        assert_eq!(runtime.mediator().send(Ping(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_resolver() {
        let result = CourierRuntime::builder()
            .config(CourierConfig::default())
            .without_logging()
            .build();

        assert!(matches!(result, Err(RuntimeError::Build(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = CourierConfig::default();
        config.logging.max_files = 0;

        let result = CourierRuntime::builder()
            .config(config)
            .handlers(handlers())
            .without_logging()
            .build();

        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_config_applies_options_and_overrides() {
        let mut config = CourierConfig::default();
        config.notifications = NotificationConfig {
            failure_policy: FailurePolicy::Aggregate,
            strategy: PublishStrategy::Concurrent,
        };
        config
            .pipeline
            .middleware
            .insert("timeout".to_string(), MiddlewareOverride::disabled());

        let runtime = CourierRuntime::builder()
            .config(config)
            .handlers(handlers())
            .configure(|mediator| {
                mediator.middleware(
                    MiddlewareDescriptor::<AnyMessage>::new(TimeoutMiddleware::new(
                        Duration::from_secs(1),
                    ))
                        .named("timeout"),
                )
            })
            .without_logging()
            .build()
            .unwrap();

        let options = runtime.mediator().publish_options();
        assert_eq!(options.failure_policy, FailurePolicy::Aggregate);
        assert_eq!(options.strategy, PublishStrategy::Concurrent);

        let report = runtime.mediator().describe_request::<Ping>();
        assert!(report.stage_names().is_empty());
        assert!(report.exclusion("timeout").is_some());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_calls() {
        let runtime = CourierRuntime::builder()
            .config(CourierConfig::default())
            .handlers(handlers())
            .without_logging()
            .build()
            .unwrap();

        runtime.run_until(async {}).await;

        assert!(runtime.shutdown_token().is_cancelled());
        let err = runtime.mediator().send(Ping(1)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_until_shutdown_returns_after_shutdown() {
        let runtime = CourierRuntime::builder()
            .config(CourierConfig::default())
            .handlers(handlers())
            .without_logging()
            .build()
            .unwrap();

        runtime.shutdown();
        tokio::time::timeout(Duration::from_secs(1), runtime.run_until_shutdown())
            .await
            .unwrap()
            .unwrap();
    }
}
