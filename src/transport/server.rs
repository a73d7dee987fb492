//! Instance-side RPC endpoint.
//!
//! Serves `POST /rpc/{service}/{method}` with JSON bodies. Handlers are
//! registered per (service, method) pair; anything else answers 404.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::transport::Payload;

/// Error a handler returns to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
    pub status: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for RpcStatus {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

type Handler = Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload, RpcStatus>> + Send + Sync>;

/// Registry of RPC handlers exposed by one instance.
#[derive(Clone, Default)]
pub struct RpcServer {
    handlers: HashMap<(String, String), Handler>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `service.method`.
    pub fn method<F, Fut>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, RpcStatus>> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |request| -> BoxFuture<'static, Result<Payload, RpcStatus>> {
                Box::pin(handler(request))
            },
        );
        self.handlers
            .insert((service.to_string(), method.to_string()), handler);
        self
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/rpc/{service}/{method}", post(dispatch))
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, methods = self.handlers.len(), "RPC server starting");

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!(address = %addr, "RPC server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<String> = self
            .handlers
            .keys()
            .map(|(service, method)| format!("{}/{}", service, method))
            .collect();
        methods.sort();
        f.debug_struct("RpcServer").field("methods", &methods).finish()
    }
}

async fn dispatch(
    State(server): State<Arc<RpcServer>>,
    Path((service, method)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Payload>, RpcStatus> {
    let handler = server
        .handlers
        .get(&(service.clone(), method.clone()))
        .cloned()
        .ok_or_else(|| RpcStatus::not_found(format!("unknown method {}/{}", service, method)))?;

    let request: Payload = serde_json::from_slice(&body)
        .map_err(|e| RpcStatus::invalid_argument(format!("invalid JSON body: {}", e)))?;

    handler(request).await.map(Json)
}
