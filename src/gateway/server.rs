//! Gateway HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with call, API and admin handlers
//! - Wire up middleware (tracing, request timeout, body limit)
//! - Serve until shutdown, then drain within a bounded window
//!
//! # Design Decisions
//! - Every request gets a call context bounded by the request timeout;
//!   a client that goes away drops the handler future and with it the call
//! - Calls still running when the drain window closes are cancelled through
//!   their contexts, since connection tasks can outlive the serve future
//! - The timeout layer is a backstop for handlers that ignore the context

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::clients::{feed, profile, topic, FeedClient, ProfileClient, TopicClient};
use crate::config::schema::ListenerConfig;
use crate::context::CallContext;
use crate::gateway::{admin, handlers, handlers::ApiError};
use crate::lifecycle::Shutdown;
use crate::pipeline::ServiceDirectory;

/// Typed clients for whichever of the known services are configured.
#[derive(Debug, Default)]
pub struct ApiClients {
    feed: Option<FeedClient>,
    profile: Option<ProfileClient>,
    topic: Option<TopicClient>,
}

impl ApiClients {
    pub fn from_directory(directory: &ServiceDirectory) -> Self {
        Self {
            feed: directory.get(feed::SERVICE).map(FeedClient::new),
            profile: directory.get(profile::SERVICE).map(ProfileClient::new),
            topic: directory.get(topic::SERVICE).map(TopicClient::new),
        }
    }

    pub fn feed(&self) -> Result<&FeedClient, ApiError> {
        self.feed
            .as_ref()
            .ok_or_else(|| ApiError::unknown_service(feed::SERVICE))
    }

    pub fn profile(&self) -> Result<&ProfileClient, ApiError> {
        self.profile
            .as_ref()
            .ok_or_else(|| ApiError::unknown_service(profile::SERVICE))
    }

    pub fn topic(&self) -> Result<&TopicClient, ApiError> {
        self.topic
            .as_ref()
            .ok_or_else(|| ApiError::unknown_service(topic::SERVICE))
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub directory: Arc<ServiceDirectory>,
    pub api: Arc<ApiClients>,
    pub request_timeout: Duration,
    abort: CancellationToken,
}

impl GatewayState {
    pub fn new(directory: Arc<ServiceDirectory>, request_timeout: Duration) -> Self {
        let api = Arc::new(ApiClients::from_directory(&directory));
        Self {
            directory,
            api,
            request_timeout,
            abort: CancellationToken::new(),
        }
    }

    /// Context for one downstream call made on behalf of a request.
    /// Each context gets its own child of the gateway's abort token.
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
            .with_cancellation(self.abort.child_token())
    }
}

/// HTTP front for a [`ServiceDirectory`].
pub struct GatewayServer {
    router: Router,
    directory: Arc<ServiceDirectory>,
    drain_timeout: Duration,
    abort: CancellationToken,
}

impl GatewayServer {
    pub fn new(config: &ListenerConfig, directory: Arc<ServiceDirectory>) -> Self {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let state = GatewayState::new(directory.clone(), request_timeout);
        let abort = state.abort.clone();
        let router = Self::build_router(state, config.max_body_bytes, request_timeout);
        Self {
            router,
            directory,
            drain_timeout: request_timeout,
            abort,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        state: GatewayState,
        max_body_bytes: usize,
        request_timeout: Duration,
    ) -> Router {
        Router::new()
            .route("/call/{service}/{method}", post(handlers::call_method))
            .route("/api/feed/get_feeds", get(handlers::get_feeds))
            .route("/api/feed/create_feed", put(handlers::create_feed))
            .route("/api/profile/get_profile", get(handlers::get_profile))
            .route("/api/topic/view", get(handlers::get_topic))
            .route("/admin/status", get(admin::get_status))
            .route("/admin/services", get(admin::get_services))
            .route("/admin/services/{name}", get(admin::get_service))
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body_bytes))
            // One second past the call deadline so the handler reports the
            // call's own error first.
            .layer(TimeoutLayer::new(request_timeout + Duration::from_secs(1)))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` is triggered, then close every connection.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = ?self.directory.names(),
            "Gateway server starting"
        );

        let token = shutdown.token();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .into_future();

        let drain_timeout = self.drain_timeout;
        let drain_deadline = async {
            shutdown.wait().await;
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = serve => result?,
            _ = drain_deadline => {
                tracing::warn!(
                    timeout = ?drain_timeout,
                    "Drain deadline reached, cancelling in-flight calls"
                );
            }
        }

        self.abort.cancel();
        self.directory.close();
        tracing::info!("Gateway server stopped");
        Ok(())
    }
}
