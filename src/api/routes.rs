//! API route definitions
//!
//! - /api/v1/availability/sites - per-site daily or monthly results
//! - /api/v1/availability/groups - group rollups
//! - /api/v1/availability/supergroups - supergroup rollups
//! - /health - liveness and cache counters

use axum::middleware as axum_mw;
use axum::{routing::get, Router};

use super::handlers::{self, ApiState};
use super::middleware;

/// Report routes, behind API-key authentication.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/availability/sites", get(handlers::get_sites))
        .route("/availability/groups", get(handlers::get_groups))
        .route("/availability/supergroups", get(handlers::get_supergroups))
        .route_layer(axum_mw::from_fn_with_state(state.clone(), middleware::require_api_key))
        .with_state(state)
}

/// Unauthenticated health endpoint at root level
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
