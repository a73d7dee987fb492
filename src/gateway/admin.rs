//! Admin endpoints: service membership, breaker state and degraded flags.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::gateway::handlers::ApiError;
use crate::gateway::server::GatewayState;
use crate::pipeline::ServiceStatus;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub services: usize,
    pub degraded: Vec<String>,
}

pub async fn get_status(State(state): State<GatewayState>) -> Json<SystemStatus> {
    let degraded: Vec<String> = state
        .directory
        .statuses()
        .into_iter()
        .filter(|s| s.degraded.is_some())
        .map(|s| s.name)
        .collect();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if degraded.is_empty() { "operational" } else { "degraded" },
        services: state.directory.len(),
        degraded,
    })
}

pub async fn get_services(State(state): State<GatewayState>) -> Json<Vec<ServiceStatus>> {
    Json(state.directory.statuses())
}

pub async fn get_service(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceStatus>, ApiError> {
    state
        .directory
        .get(&name)
        .map(|service| Json(service.status()))
        .ok_or_else(|| ApiError::unknown_service(&name))
}
