//! API server setup and configuration.

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::middleware::{IpRateLimiter, RateLimitConfig, security_headers};
use crate::api::routes;
use crate::contact::{ContactService, SubscriptionService};
use crate::database::DbPool;
use crate::error::{Error, Result};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Request body size limit in bytes
    pub body_limit: usize,
    /// Directory served for paths no route matches
    pub static_dir: Option<PathBuf>,
    /// Per-IP limit on `/api`; `None` disables it
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            body_limit: 64 * 1024, // 64KB
            static_dir: None,
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from a variable lookup, falling back to defaults.
    ///
    /// Supported variables:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `PORT` or `API_PORT` (e.g. "8080"; `PORT` wins)
    /// - `STATIC_DIR`
    /// - `RATE_LIMIT_MAX`, `RATE_LIMIT_WINDOW_SECS`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind_address) = lookup("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address.trim().to_string();
        }

        if let Some(port) = lookup("PORT")
            .or_else(|| lookup("API_PORT"))
            .filter(|p| !p.trim().is_empty())
        {
            config.port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::config(format!("PORT must be a port number, got '{}'", port)))?;
        }

        if let Some(dir) = lookup("STATIC_DIR")
            && !dir.trim().is_empty()
        {
            config.static_dir = Some(PathBuf::from(dir.trim()));
        }

        config.rate_limit = Some(RateLimitConfig::from_lookup(&lookup)?);

        Ok(config)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Database pool, pinged by the health checks
    pub pool: Option<DbPool>,
    /// Contact submission handling
    pub contact_service: Option<Arc<ContactService>>,
    /// Push subscription registration
    pub subscription_service: Option<Arc<SubscriptionService>>,
    /// VAPID public key; `None` when push is not configured
    pub vapid_public_key: Option<Arc<str>>,
}

impl AppState {
    /// Create a new application state without services (for testing).
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            pool: None,
            contact_service: None,
            subscription_service: None,
            vapid_public_key: None,
        }
    }

    /// Set the database pool.
    pub fn with_pool(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the contact service.
    pub fn with_contact_service(mut self, service: Arc<ContactService>) -> Self {
        self.contact_service = Some(service);
        self
    }

    /// Set the subscription service.
    pub fn with_subscription_service(mut self, service: Arc<SubscriptionService>) -> Self {
        self.subscription_service = Some(service);
        self
    }

    /// Set the VAPID public key served to browsers.
    pub fn with_vapid_public_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.vapid_public_key = Some(key.into());
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests to these paths are not traced.
fn is_quiet_path(path: &str) -> bool {
    path.starts_with("/health")
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    pub fn new(config: ApiServerConfig) -> Self {
        Self::with_state(config, AppState::new())
    }

    /// Create with custom state.
    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let rate_limiter = self.config.rate_limit.clone().map(IpRateLimiter::new);
        let mut router = routes::create_router(self.state.clone(), rate_limiter);

        if let Some(static_dir) = &self.config.static_dir {
            router = router.fallback_service(ServeDir::new(static_dir));
        }

        router = router.layer(DefaultBodyLimit::max(self.config.body_limit));

        // Add CORS if enabled
        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router = security_headers(router);

        // Add tracing
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if is_quiet_path(req.uri().path()) {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_request(|req: &Request, span: &Span| {
                    if span.is_disabled() || is_quiet_path(req.uri().path()) {
                        return;
                    }
                    let mut on_request =
                        tower_http::trace::DefaultOnRequest::new().level(tracing::Level::INFO);
                    use tower_http::trace::OnRequest;
                    on_request.on_request(req, span);
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                )
                .on_failure(
                    |class: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let mut on_failure =
                            tower_http::trace::DefaultOnFailure::new().level(tracing::Level::ERROR);
                        use tower_http::trace::OnFailure;
                        on_failure.on_failure(class, latency, span);
                    },
                ),
        )
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid address: {}", e)))?;

        Ok(TcpListener::bind(addr).await?)
    }

    /// Start the server on the configured address.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the cancel token fires.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let router = self.build_router();

        tracing::info!("API server listening on http://{}", listener.local_addr()?);

        let cancel_token = self.cancel_token.clone();

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            tracing::info!("API server shutting down...");
        })
        .await
        .map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
