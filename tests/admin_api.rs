//! Admin API, driven in-process through the router service.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use load_router::admin::handlers::{BackendStatus, SystemStatus};
use load_router::HttpServer;
use tower::ServiceExt;

mod common;

const KEY: &str = "test-admin-key";

fn admin_app() -> Router {
    let mut config = common::config_with(&[("a", common::dead_address())]);
    config.admin.api_key = KEY.to_string();
    HttpServer::new(config).admin_router()
}

fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {KEY}"));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = admin_app();

    let missing = Request::builder().uri("/admin/status").body(Body::empty()).unwrap();
    let res = app.clone().oneshot(missing).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/status")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(wrong).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_reports_pool_size() {
    let res = admin_app().oneshot(request("GET", "/admin/status", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let status: SystemStatus = json(res).await;
    assert_eq!(status.backends, 1);
    assert_eq!(status.selectable, 1);
}

#[tokio::test]
async fn test_add_list_and_remove_backends() {
    let app = admin_app();

    let res = app
        .clone()
        .oneshot(request("POST", "/admin/backends", Some(r#"{"id":"b","address":"127.0.0.1:9002"}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: BackendStatus = json(res).await;
    assert_eq!(created.id, "b");
    assert_eq!(created.state, "healthy");

    let res = app
        .clone()
        .oneshot(request("POST", "/admin/backends", Some(r#"{"id":"b","address":"127.0.0.1:9003"}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .clone()
        .oneshot(request("POST", "/admin/backends", Some(r#"{"id":"c","address":"ftp://nowhere"}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.clone().oneshot(request("GET", "/admin/backends", None)).await.unwrap();
    let backends: Vec<BackendStatus> = json(res).await;
    let ids: Vec<_> = backends.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(backends[1].address.ends_with(":9002/"));
    assert_eq!(backends[1].unavailable_for_ms, None);

    for _ in 0..2 {
        let res = app.clone().oneshot(request("DELETE", "/admin/backends/b", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    let res = app.oneshot(request("GET", "/admin/backends", None)).await.unwrap();
    let backends: Vec<BackendStatus> = json(res).await;
    assert_eq!(backends.len(), 1);
}
