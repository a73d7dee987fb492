//! JSON-over-HTTP/2 transport.
//!
//! # Responsibilities
//! - Open one HTTP/2 connection per instance (prior knowledge, no TLS)
//! - Multiplex concurrent invocations over that connection
//! - Map non-success statuses to `TransportError::Status`
//!
//! # Design Decisions
//! - A dedicated connection per instance lets the connector own its
//!   lifecycle; closing it aborts the driver task
//! - Connect is bounded by its own timeout, separate from the call deadline

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use futures_util::future::BoxFuture;
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;

use crate::load_balancer::Instance;
use crate::transport::{Connection, Dialer, Payload, TransportError};

/// Largest response body accepted from an instance.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Dials instances of one service over HTTP/2.
#[derive(Debug, Clone)]
pub struct HttpDialer {
    service: String,
    connect_timeout: Duration,
    max_response_bytes: usize,
}

impl HttpDialer {
    pub fn new(service: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            service: service.into(),
            connect_timeout,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }

    async fn connect(&self, instance: &Instance) -> Result<Arc<dyn Connection>, TransportError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(instance.address()))
            .await
            .map_err(|_| TransportError::ConnectTimeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;

        let (sender, connection) =
            http2::handshake(TokioExecutor::new(), TokioIo::new(stream)).await?;

        let address = instance.address().to_string();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(address = %address, error = %e, "Connection terminated");
            }
        });

        tracing::debug!(
            service = %self.service,
            address = %instance.address(),
            "HTTP/2 connection established"
        );

        Ok(Arc::new(HttpConnection {
            service: self.service.clone(),
            base_url: instance.base_url().clone(),
            sender,
            driver,
            max_response_bytes: self.max_response_bytes,
        }))
    }
}

impl Dialer for HttpDialer {
    fn dial<'a>(
        &'a self,
        instance: &'a Instance,
    ) -> BoxFuture<'a, Result<Arc<dyn Connection>, TransportError>> {
        Box::pin(self.connect(instance))
    }
}

struct HttpConnection {
    service: String,
    base_url: Url,
    sender: http2::SendRequest<Body>,
    driver: JoinHandle<()>,
    max_response_bytes: usize,
}

impl HttpConnection {
    async fn post(&self, method: &str, request: Payload) -> Result<Payload, TransportError> {
        let url = self
            .base_url
            .join(&format!("rpc/{}/{}", self.service, method))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let body = serde_json::to_vec(&request)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut sender = self.sender.clone();
        sender.ready().await?;
        let response = sender.send_request(request).await?;

        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), self.max_response_bytes)
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Body(e.to_string()))
    }
}

impl Connection for HttpConnection {
    fn invoke<'a>(
        &'a self,
        method: &'a str,
        request: Payload,
    ) -> BoxFuture<'a, Result<Payload, TransportError>> {
        Box::pin(self.post(method, request))
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed() || self.driver.is_finished()
    }

    fn close(&self) {
        self.driver.abort();
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
