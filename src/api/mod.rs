//! REST API module using Axum
//!
//! Serves availability/reliability reports as XML (default) or JSON. Every
//! report route requires an `x-api-key` header mapping to a tenant.

pub mod envelope;
pub mod handlers;
pub mod middleware;
mod routes;

pub use handlers::ApiState;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_app(state: ApiState, gzip: bool) -> Router {
    let app = Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::health_routes(state))
        .layer(TraceLayer::new_for_http());

    if gzip {
        app.layer(CompressionLayer::new())
    } else {
        app
    }
}
