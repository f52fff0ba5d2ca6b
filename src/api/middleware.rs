//! API middleware layers.
//!
//! Resolves the `x-api-key` header to a tenant and stores it in the request
//! extensions for the report handlers.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::handlers::{accepts_json, error_response, ApiState};
use crate::types::OutputFormat;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn require_api_key(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let tenant = key.and_then(|k| state.tenants.resolve(k)).cloned();
    match tenant {
        Some(tenant) => {
            request.extensions_mut().insert(tenant);
            next.run(request).await
        }
        None => {
            debug!(present = key.is_some(), "Rejected request without a valid API key");
            let wants_json = accepts_json(request.headers())
                || request.uri().query().is_some_and(|q| q.contains("format=json"));
            let format = if wants_json { OutputFormat::Json } else { OutputFormat::Xml };
            error_response(StatusCode::UNAUTHORIZED, "missing or unknown API key", format)
        }
    }
}
