//! HTTP front of the gateway.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (axum router, trace + timeout layers, body limit)
//!     → handlers.rs
//!         POST /call/{service}/{method}  → LogicalService::call
//!         GET  /api/...                  → typed clients
//!     → admin.rs
//!         GET  /admin/status, /admin/services[/{name}]
//!     → JSON response, or ApiError mapped from the call error kind
//! ```

pub mod admin;
pub mod handlers;
pub mod server;

pub use handlers::ApiError;
pub use server::{GatewayServer, GatewayState};
