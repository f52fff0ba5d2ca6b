//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the availability and health endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

use std::sync::Arc;

use ar_metrics::api::{create_app, ApiState};
use ar_metrics::cache::ResultCache;
use ar_metrics::config::TenantConfig;
use ar_metrics::service::ReportService;
use ar_metrics::storage::InMemoryStore;
use ar_metrics::tenant::TenantDirectory;
use ar_metrics::types::{Identity, MetricSample};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

const KEY: &str = "test-key";
const QUERY: &str = "start_time=2015-06-20T12:00:00Z&end_time=2015-06-26T23:00:00Z&profile=ap1";

fn sample(site: &str, group: &str, supergroup: &str, date: u32, a: f64, weight: f64) -> MetricSample {
    MetricSample {
        identity: Identity {
            site: site.to_string(),
            group: group.to_string(),
            supergroup: supergroup.to_string(),
            profile: "ap1".to_string(),
            infrastructure: "Production".to_string(),
            certification: "Certified".to_string(),
            ..Identity::default()
        },
        date,
        uptime: a / 100.0,
        downtime: 0.0,
        unknown: 0.0,
        weight,
        availability: Some(a),
        reliability: Some(a),
    }
}

fn create_test_app() -> Router {
    let store = InMemoryStore::new();
    store
        .insert_samples(
            "egi_ar",
            "sites",
            vec![
                sample("ST01", "NGI_1", "GROUP_A", 20_150_622, 66.7, 5634.0),
                sample("ST02", "NGI_1", "GROUP_A", 20_150_622, 70.0, 4356.0),
                sample("ST05", "NGI_2", "GROUP_B", 20_150_623, 90.0, 5634.0),
            ],
        )
        .unwrap();
    // A second tenant with no data
    store
        .insert_samples("other_ar", "sites", Vec::new())
        .unwrap();

    let service = ReportService::new(Arc::new(store), "sites")
        .with_cache(Arc::new(ResultCache::new(1 << 20, 4)));
    let tenants = TenantDirectory::from_config(&[
        TenantConfig {
            name: "egi".to_string(),
            database: "egi_ar".to_string(),
            api_keys: vec![KEY.to_string()],
        },
        TenantConfig {
            name: "other".to_string(),
            database: "other_ar".to_string(),
            api_keys: vec!["other-key".to_string()],
        },
    ]);
    create_app(ApiState::new(service, tenants), false)
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_all_levels_return_200_xml() {
    for level in ["sites", "groups", "supergroups"] {
        let app = create_test_app();
        let resp = app
            .oneshot(get(&format!("/api/v1/availability/{level}?{QUERY}"), Some(KEY)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{level}");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/xml");
        let text = body_text(resp).await;
        assert!(text.contains("<root>"), "{level}: {text}");
    }
}

#[tokio::test]
async fn test_supergroup_xml_values() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(&format!("/api/v1/availability/supergroups?{QUERY}"), Some(KEY)))
        .await
        .unwrap();
    let text = body_text(resp).await;
    assert!(text.contains(r#"<group name="GROUP_A" type="GROUP">"#), "{text}");
    assert!(text.contains(r#"<group name="GROUP_B" type="GROUP">"#), "{text}");
    assert!(text.contains(r#"timestamp="2015-06-22""#));
    assert!(text.contains(r#"availability="90""#));
}

#[tokio::test]
async fn test_site_nodes_name_their_group() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(&format!("/api/v1/availability/sites?{QUERY}"), Some(KEY)))
        .await
        .unwrap();
    let text = body_text(resp).await;
    assert!(text.contains(r#"<group name="ST01" type="SITE" group="NGI_1">"#), "{text}");
}

#[tokio::test]
async fn test_json_via_accept_header() {
    let app = create_test_app();
    let req = Request::builder()
        .uri(format!("/api/v1/availability/groups?{QUERY}"))
        .header("x-api-key", KEY)
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");

    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["root"][0]["name"], "NGI_1");
    assert_eq!(v["root"][0]["type"], "NGI");
}

#[tokio::test]
async fn test_json_via_format_param_monthly() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(
            &format!("/api/v1/availability/supergroups?{QUERY}&format=json&granularity=monthly"),
            Some(KEY),
        ))
        .await
        .unwrap();
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["root"][0]["results"][0]["timestamp"], "2015-06");
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let app = create_test_app();
    let uri = format!("/api/v1/availability/groups?{QUERY}");

    let first = app.clone().oneshot(get(&uri, Some(KEY))).await.unwrap();
    assert_eq!(first.headers()["x-cache"], "MISS");
    let first_body = body_text(first).await;

    // default-equivalent: explicit production=true and reordered params
    let uri2 = format!("/api/v1/availability/groups?production=true&{QUERY}");
    let second = app.oneshot(get(&uri2, Some(KEY))).await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(body_text(second).await, first_body);
}

#[tokio::test]
async fn test_missing_api_key_is_401() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(&format!("/api/v1/availability/sites?{QUERY}"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(resp).await.contains("<error>"));
}

#[tokio::test]
async fn test_unknown_api_key_is_401_json() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(&format!("/api/v1/availability/sites?{QUERY}&format=json"), Some("nope")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_tenant_key_selects_database() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(
            &format!("/api/v1/availability/sites?{QUERY}&format=json"),
            Some("other-key"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(v["root"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_input_returns_empty_root() {
    let app = create_test_app();
    let resp = app
        .oneshot(get(
            "/api/v1/availability/sites?start_time=bogus&end_time=2015-06-26T23:00:00Z&profile=ap1&format=json",
            Some(KEY),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(v["root"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reports_cache_stats() {
    let app = create_test_app();
    let resp = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["data"]["status"], "ok");
    assert_eq!(v["data"]["backend"], "in-memory");
    assert_eq!(v["data"]["cache"]["entries"], 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = create_test_app();
    let resp = app
        .oneshot(get("/api/v1/availability/regions", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repeated_group_name_params() {
    for groups in [
        "group_name=GROUP_A&group_name=GROUP_B",
        "group_name=GROUP_B,GROUP_A",
        "group_name=GROUP_B&group_name=GROUP_A,GROUP_A",
    ] {
        let app = create_test_app();
        let resp = app
            .oneshot(get(
                &format!("/api/v1/availability/supergroups?{QUERY}&{groups}&format=json"),
                Some(KEY),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{groups}");
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        let names: Vec<_> = v["root"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["GROUP_A", "GROUP_B"], "{groups}");
    }

    let app = create_test_app();
    let resp = app
        .oneshot(get(
            &format!("/api/v1/availability/supergroups?{QUERY}&group_name=GROUP_B&format=json"),
            Some(KEY),
        ))
        .await
        .unwrap();
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["root"].as_array().unwrap().len(), 1);
    assert_eq!(v["root"][0]["name"], "GROUP_B");
}
