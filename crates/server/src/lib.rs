//! HTTP API server for the FRKB fingerprint sync service.
//!
//! This crate provides the HTTP control plane:
//! - The eight sync endpoints under `/frkbapi/v1/fingerprint-sync`
//! - API-key and admin-token authentication
//! - The wire error taxonomy
//! - Prometheus metrics and the health probe
//! - Admin user-key management

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedUser, ADMIN_TOKEN_HEADER, API_KEY_HEADER};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
