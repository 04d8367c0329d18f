//! End-to-end routing behavior against in-process mock backends.

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::routing::any;
use axum::Router;
use load_router::http::ErrorBody;
use load_router::load_balancer::HealthState;

mod common;

use common::{client, config_with, dead_address, start_mock_backend, start_programmable_backend, start_router};

#[tokio::test]
async fn test_response_passes_through_unchanged() {
    let app = Router::new().route(
        "/{*path}",
        any(|method: Method, uri: Uri, headers: HeaderMap, body: String| async move {
            let custom = headers
                .get("x-custom")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            (
                StatusCode::CREATED,
                [("x-backend", "echo".to_string()), ("x-seen-custom", custom)],
                format!("{} {} {}", method, uri, body),
            )
        }),
    );
    let addr = common::spawn_backend(app).await;
    let router = start_router(config_with(&[("echo", addr)])).await;

    let res = client()
        .post(router.url("/orders/42?expand=items"))
        .header("x-custom", "kept")
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-backend"], "echo");
    assert_eq!(res.headers()["x-seen-custom"], "kept");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "POST /orders/42?expand=items payload");
}

#[tokio::test]
async fn test_client_request_id_is_forwarded() {
    let app = Router::new().route(
        "/",
        any(|headers: HeaderMap| async move {
            headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("missing")
                .to_string()
        }),
    );
    let addr = common::spawn_backend(app).await;
    let router = start_router(config_with(&[("a", addr)])).await;

    let res = client()
        .get(router.url("/"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "req-123");
    assert_eq!(res.text().await.unwrap(), "req-123");
}

#[tokio::test]
async fn test_least_loaded_backend_receives_traffic() {
    let a = start_mock_backend(200, "a").await;
    let b = start_mock_backend(200, "b").await;
    let c = start_mock_backend(200, "c").await;
    let router = start_router(config_with(&[("a", a.addr), ("b", b.addr), ("c", c.addr)])).await;

    router.state.tracker.set_load("a", 0.9);
    router.state.tracker.set_load("b", 0.2);
    router.state.tracker.set_load("c", 0.5);

    let client = client();
    for _ in 0..5 {
        let res = client.get(router.url("/")).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "b");
    }
    assert_eq!((a.hits(), b.hits(), c.hits()), (0, 5, 0));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let backends = vec![
        start_mock_backend(503, "down").await,
        start_mock_backend(503, "down").await,
        start_mock_backend(503, "down").await,
        start_mock_backend(503, "down").await,
    ];
    let ids = ["a", "b", "c", "d"];
    let pairs: Vec<_> = ids.iter().zip(&backends).map(|(id, b)| (*id, b.addr)).collect();
    let mut config = config_with(&pairs);
    config.retries.max_retries = 2;
    config.circuit.failure_threshold = 10;
    let router = start_router(config).await;

    let res = client().get(router.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorBody = res.json().await.unwrap();
    assert_eq!(body.error, "backend_forwarding_failed");
    let total: u32 = backends.iter().map(|b| b.hits()).sum();
    assert_eq!(total, 3);
    assert!(backends.iter().all(|b| b.hits() <= 1));
}

#[tokio::test]
async fn test_empty_pool_fails_fast() {
    let router = start_router(config_with(&[])).await;

    let res = client().get(router.url("/anything")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ErrorBody = res.json().await.unwrap();
    assert_eq!(body.error, "all_backends_unavailable");
}

#[tokio::test]
async fn test_tripped_backend_is_not_contacted() {
    let backend = start_mock_backend(503, "down").await;
    let mut config = config_with(&[("a", backend.addr)]);
    config.circuit.failure_threshold = 1;
    config.circuit.cool_down_ms = 60_000;
    let router = start_router(config).await;
    let client = client();

    let first = client.get(router.url("/")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(router.state.registry.get("a").unwrap().state, HealthState::Unavailable);

    let second = client.get(router.url("/")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_failover_on_connection_refused() {
    let live = start_mock_backend(200, "live").await;
    let router = start_router(config_with(&[("dead", dead_address()), ("live", live.addr)])).await;
    router.state.tracker.set_load("dead", 0.0);
    router.state.tracker.set_load("live", 0.5);

    let res = client().get(router.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "live");
    let dead = router.state.registry.get("dead").unwrap();
    assert_eq!(dead.consecutive_failures, 1);
    assert!(dead.load > 0.0);
}

#[tokio::test]
async fn test_slow_backend_times_out_and_fails_over() {
    let slow = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, "slow".to_string())
    })
    .await;
    let fast = start_mock_backend(200, "fast").await;
    let mut config = config_with(&[("slow", slow.addr), ("fast", fast.addr)]);
    config.timeouts.attempt_ms = 200;
    let router = start_router(config).await;
    router.state.tracker.set_load("slow", 0.0);
    router.state.tracker.set_load("fast", 0.5);

    let started = Instant::now();
    let res = client().get(router.url("/")).send().await.unwrap();

    assert_eq!(res.text().await.unwrap(), "fast");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(slow.hits(), 1);
}

#[tokio::test]
async fn test_application_errors_pass_through() {
    let backend = start_mock_backend(500, "boom").await;
    let router = start_router(config_with(&[("a", backend.addr)])).await;

    let res = client().get(router.url("/")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "boom");
    assert_eq!(backend.hits(), 1);
    assert_eq!(router.state.registry.get("a").unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn test_non_idempotent_requests_not_retried_when_configured() {
    let a = start_mock_backend(503, "down").await;
    let b = start_mock_backend(503, "down").await;
    let mut config = config_with(&[("a", a.addr), ("b", b.addr)]);
    config.retries.idempotent_only = true;
    let router = start_router(config).await;
    let client = client();

    let res = client.post(router.url("/")).body("x").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(a.hits() + b.hits(), 1);

    let res = client.get(router.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(a.hits() + b.hits(), 3);
}

#[tokio::test]
async fn test_circuit_recovers_after_cool_down() {
    let flaky = start_programmable_backend(|n| async move {
        if n < 2 {
            (503, "warming up".to_string())
        } else {
            (200, "ok".to_string())
        }
    })
    .await;
    let mut config = config_with(&[("a", flaky.addr)]);
    config.retries.max_retries = 0;
    config.circuit.failure_threshold = 2;
    config.circuit.cool_down_ms = 300;
    let router = start_router(config).await;
    let client = client();

    for _ in 0..2 {
        let res = client.get(router.url("/")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
    assert_eq!(router.state.registry.get("a").unwrap().state, HealthState::Unavailable);

    let res = client.get(router.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(flaky.hits(), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;

    let res = client.get(router.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let a = router.state.registry.get("a").unwrap();
    assert_eq!(a.state, HealthState::Healthy);
    assert_eq!(a.consecutive_failures, 0);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let backend = start_mock_backend(200, "ok").await;
    let mut config = config_with(&[("a", backend.addr)]);
    config.limits.max_body_bytes = 16;
    let router = start_router(config).await;

    let res = client()
        .post(router.url("/"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(backend.hits(), 0);
}

#[tokio::test]
async fn test_backend_set_reload() {
    let a = start_mock_backend(200, "a").await;
    let b = start_mock_backend(200, "b").await;
    let router = start_router(config_with(&[("a", a.addr)])).await;

    router.config_tx.send(config_with(&[("b", b.addr)])).unwrap();
    for _ in 0..50 {
        if router.state.registry.get("b").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let res = client().get(router.url("/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "b");
    assert!(router.state.registry.get("a").is_none());
    assert_eq!(a.hits(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_all_served() {
    let a = start_mock_backend(200, "a").await;
    let b = start_mock_backend(200, "b").await;
    let router = start_router(config_with(&[("a", a.addr), ("b", b.addr)])).await;
    let url = router.url("/");
    let client = client();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let mut ok = 0;
                for _ in 0..10 {
                    let res = client.get(&url).send().await.unwrap();
                    if res.status().is_success() {
                        ok += 1;
                    }
                }
                ok
            })
        })
        .collect();

    let mut served = 0;
    for task in tasks {
        served += task.await.unwrap();
    }
    assert_eq!(served, 200);
    assert_eq!(a.hits() + b.hits(), 200);
    for backend in router.state.registry.snapshot().iter() {
        assert!((0.0..=1.0).contains(&backend.load));
        assert_eq!(backend.state, HealthState::Healthy);
    }
}

#[tokio::test]
async fn test_health_checks_trip_and_recover_backend() {
    let backend = start_programmable_backend(|n| async move {
        if n < 2 {
            (500, "starting".to_string())
        } else {
            (200, "ok".to_string())
        }
    })
    .await;
    let mut config = config_with(&[("a", backend.addr)]);
    config.circuit.failure_threshold = 2;
    config.circuit.cool_down_ms = 100;
    let server = load_router::HttpServer::new(config);
    let monitor = server.health_monitor();
    let registry = server.state().registry.clone();

    monitor.check_all().await;
    monitor.check_all().await;
    let a = registry.get("a").unwrap();
    assert_eq!(a.state, HealthState::Unavailable);
    assert_eq!(a.consecutive_failures, 2);
    assert!(a.load > 0.0);

    monitor.check_all().await;
    assert_eq!(backend.hits(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    monitor.check_all().await;

    let a = registry.get("a").unwrap();
    assert_eq!(backend.hits(), 3);
    assert_eq!(a.state, HealthState::Healthy);
    assert_eq!(a.consecutive_failures, 0);
    assert!(!a.trial_in_flight());
}
