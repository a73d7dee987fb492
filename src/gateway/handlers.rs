//! Call handlers.
//!
//! # Responsibilities
//! - Forward untyped calls to the named logical service
//! - Expose the typed feed, profile and topic operations as a small REST API
//! - Map call errors to HTTP status codes by error kind

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::clients::feed::{FeedRecord, GetFeedsRequest};
use crate::clients::profile::GetProfileRequest;
use crate::clients::topic::GetTopicRequest;
use crate::error::{CallError, ErrorKind};
use crate::gateway::server::GatewayState;
use crate::transport::Payload;

/// Error body returned by every gateway endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unknown_service(service: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "unknown_service",
            format!("service '{}' is not configured", service),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// HTTP status for a call error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AdmissionRejected => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::CircuitOpen | ErrorKind::NoInstance => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConnectionFailed | ErrorKind::RemoteCallFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        let kind = err.kind();
        Self::new(status_for(kind), kind.as_str(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// `POST /call/{service}/{method}` with a JSON body (empty means `null`).
pub async fn call_method(
    State(state): State<GatewayState>,
    Path((service, method)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Payload>, ApiError> {
    let target = state
        .directory
        .get(&service)
        .ok_or_else(|| ApiError::unknown_service(&service))?;

    let request: Payload = if body.is_empty() {
        Payload::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    let ctx = state.call_context();
    let response = target.call(&ctx, &method, request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct FeedsQuery {
    pub user_id: i64,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopicQuery {
    pub topic_id: i64,
}

/// `GET /api/feed/get_feeds?user_id=..&size=..`
pub async fn get_feeds(
    State(state): State<GatewayState>,
    Query(query): Query<FeedsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.api.feed()?;
    let request = GetFeedsRequest {
        user_id: query.user_id,
        size: query.size,
    };
    Ok(Json(client.get_feeds(&state.call_context(), &request).await?))
}

/// `PUT /api/feed/create_feed`
pub async fn create_feed(
    State(state): State<GatewayState>,
    Json(record): Json<FeedRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.api.feed()?;
    Ok(Json(client.create_feed(&state.call_context(), &record).await?))
}

/// `GET /api/profile/get_profile?user_id=..`
pub async fn get_profile(
    State(state): State<GatewayState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.api.profile()?;
    let request = GetProfileRequest {
        user_id: query.user_id,
    };
    Ok(Json(client.get_profile(&state.call_context(), &request).await?))
}

/// `GET /api/topic/view?topic_id=..`
pub async fn get_topic(
    State(state): State<GatewayState>,
    Query(query): Query<TopicQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.api.topic()?;
    let request = GetTopicRequest {
        topic_id: query.topic_id,
    };
    Ok(Json(client.get_topic(&state.call_context(), &request).await?))
}
