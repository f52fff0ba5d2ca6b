//! API route handlers
//!
//! - Availability reports for sites, groups and supergroups
//! - Liveness with cache counters

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Serialize;
use tracing::error;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::cache::CacheStats;
use crate::query::ReportRequest;
use crate::render;
use crate::service::{Report, ReportService};
use crate::tenant::{Tenant, TenantDirectory};
use crate::types::{Level, OutputFormat};

/// Response header telling whether a report came from the cache.
pub const CACHE_HEADER: &str = "x-cache";

/// Decoded query string in arrival order; list parameters may repeat.
type QueryPairs = Vec<(String, String)>;

// ============================================================================
// API State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub service: ReportService,
    pub tenants: Arc<TenantDirectory>,
    pub started: Instant,
}

impl ApiState {
    pub fn new(service: ReportService, tenants: TenantDirectory) -> Self {
        Self {
            service,
            tenants: Arc::new(tenants),
            started: Instant::now(),
        }
    }
}

// ============================================================================
// Format Negotiation
// ============================================================================

/// True when the caller asked for JSON through the Accept header.
pub fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// Error response in the caller's format.
pub fn error_response(status: StatusCode, message: &str, format: OutputFormat) -> Response {
    match format {
        OutputFormat::Json => ApiErrorResponse::with_status(status, message),
        OutputFormat::Xml => match render::render_error(message, format) {
            Ok(body) => (status, [(header::CONTENT_TYPE, format.content_type())], body).into_response(),
            Err(e) => {
                error!("Failed to render error body: {}", e);
                (status, message.to_string()).into_response()
            }
        },
    }
}

fn report_response(report: Report) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, report.format.content_type())],
        report.payload.to_vec(),
    )
        .into_response();
    response.headers_mut().insert(
        CACHE_HEADER,
        HeaderValue::from_static(if report.cached { "HIT" } else { "MISS" }),
    );
    response
}

// ============================================================================
// Availability Reports
// ============================================================================

async fn availability(
    level: Level,
    state: ApiState,
    tenant: Tenant,
    headers: HeaderMap,
    mut request: ReportRequest,
) -> Response {
    if request.format.as_deref().map_or(true, str::is_empty) && accepts_json(&headers) {
        request.format = Some("json".to_string());
    }

    match state.service.report(level, &tenant.database, &request).await {
        Ok(report) => report_response(report),
        Err(e) => {
            error!(endpoint = level.endpoint_name(), tenant = %tenant.name, "Report failed: {}", e);
            let format = OutputFormat::parse(request.format.as_deref());
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), format)
        }
    }
}

/// GET /api/v1/availability/sites
pub async fn get_sites(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    headers: HeaderMap,
    Query(params): Query<QueryPairs>,
) -> Response {
    availability(Level::Site, state, tenant, headers, ReportRequest::from_pairs(params)).await
}

/// GET /api/v1/availability/groups
pub async fn get_groups(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    headers: HeaderMap,
    Query(params): Query<QueryPairs>,
) -> Response {
    availability(Level::Group, state, tenant, headers, ReportRequest::from_pairs(params)).await
}

/// GET /api/v1/availability/supergroups
pub async fn get_supergroups(
    State(state): State<ApiState>,
    Extension(tenant): Extension<Tenant>,
    headers: HeaderMap,
    Query(params): Query<QueryPairs>,
) -> Response {
    availability(Level::Supergroup, state, tenant, headers, ReportRequest::from_pairs(params)).await
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub backend: &'static str,
    pub cache: Option<CacheStats>,
}

/// GET /health
pub async fn health_check(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
        backend: state.service.backend_name(),
        cache: state.service.cache().map(|c| c.stats()),
    })
}
