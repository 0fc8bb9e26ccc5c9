//! Failure injection: broken, slow and streaming backends.

use axum::body::{self, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use futures_util::stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use waf_gateway::config::{FlowType, GatewayConfig, MappingConfig};

mod common;

fn open_mapping(backend: std::net::SocketAddr) -> MappingConfig {
    common::mapping("app", "/app", FlowType::Code401, backend)
}

#[tokio::test]
async fn breaker_opens_after_repeated_server_errors() {
    let backend = common::start_programmable_backend(|_, _| common::status(500)).await;

    let mut config = GatewayConfig::default();
    config.circuit_breaker.max_failures = 2;
    config.circuit_breaker.reset_timeout_secs = 600;
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;
    let client = common::client();

    for _ in 0..2 {
        let response = client
            .get(format!("http://{addr}/app/fail"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let response = client
        .get(format!("http://{addr}/app/fail"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.hits(), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_backend_is_a_server_error() {
    let mut config = GatewayConfig::default();
    config
        .mappings
        .push(open_mapping("127.0.0.1:1".parse().unwrap()));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let response = common::client()
        .get(format!("http://{addr}/app/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_backend_times_out() {
    let backend = common::start_programmable_backend(|_, _| {
        std::thread::sleep(Duration::from_millis(1500));
        common::status(200)
    })
    .await;

    let mut config = GatewayConfig::default();
    config.circuit_breaker.timeout_secs = 1;
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let response = common::client()
        .get(format!("http://{addr}/app/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    shutdown.trigger();
}

#[tokio::test]
async fn streamed_backend_body_is_relayed_whole() {
    let backend = common::start_programmable_backend(|_, _| {
        let chunks = (0..16).map(|i| Ok::<_, Infallible>(format!("chunk-{i};")));
        Response::new(Body::from_stream(stream::iter(chunks)))
    })
    .await;

    let mut config = GatewayConfig::default();
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let response = common::client()
        .get(format!("http://{addr}/app/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let expected: String = (0..16).map(|i| format!("chunk-{i};")).collect();
    assert_eq!(response.text().await.unwrap(), expected);

    shutdown.trigger();
}

#[tokio::test]
async fn stale_warning_is_dropped_on_relay() {
    let backend = common::start_programmable_backend(|_, _| {
        Response::builder()
            .header("date", "Wed, 01 Jan 2020 00:00:10 GMT")
            .header("warning", r#"110 cache "stale" "Wed, 01 Jan 2020 00:00:00 GMT""#)
            .header("warning", r#"199 cache "fresh" "Wed, 01 Jan 2020 00:00:10 GMT""#)
            .body(Body::from("ok"))
            .unwrap()
    })
    .await;

    let mut config = GatewayConfig::default();
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let response = common::client()
        .get(format!("http://{addr}/app/"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("date").unwrap(),
        "Wed, 01 Jan 2020 00:00:10 GMT"
    );
    let warnings: Vec<_> = response
        .headers()
        .get_all("warning")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("199"));

    shutdown.trigger();
}

#[tokio::test]
async fn breaker_recovers_through_a_successful_trial() {
    let backend = common::start_programmable_backend(|_, index| {
        if index < 2 {
            common::status(500)
        } else {
            Response::new(Body::from("recovered"))
        }
    })
    .await;

    let mut config = GatewayConfig::default();
    config.circuit_breaker.max_failures = 2;
    config.circuit_breaker.reset_timeout_secs = 1;
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;
    let client = common::client();
    let url = format!("http://{addr}/app/");

    for _ in 0..2 {
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let trial = client.get(&url).send().await.unwrap();
    assert_eq!(trial.status(), StatusCode::OK);
    assert_eq!(trial.text().await.unwrap(), "recovered");

    let closed = client.get(&url).send().await.unwrap();
    assert_eq!(closed.status(), StatusCode::OK);
    assert_eq!(backend.hits(), 4);

    shutdown.trigger();
}

#[tokio::test]
async fn chunked_backend_answer_to_http10_client_is_not_implemented() {
    let backend = common::start_programmable_backend(|_, _| {
        let chunks = (0..4).map(|i| Ok::<_, Infallible>(format!("part-{i}")));
        Response::new(Body::from_stream(stream::iter(chunks)))
    })
    .await;

    let mut config = GatewayConfig::default();
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let response =
        common::raw_exchange(addr, "GET /app/stream HTTP/1.0\r\nHost: gateway\r\n\r\n").await;
    assert_eq!(common::raw_status(&response), 501);
    assert!(!response.contains("part-0"));
    assert_eq!(backend.hits(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn unsupported_request_transfer_encoding_is_rejected() {
    let backend = common::start_mock_backend("never").await;

    let mut config = GatewayConfig::default();
    config.mappings.push(open_mapping(backend.addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let response = common::raw_exchange(
        addr,
        "POST /app/upload HTTP/1.1\r\nHost: gateway\r\nTransfer-Encoding: gzip, chunked\r\nConnection: close\r\n\r\n0\r\n\r\n",
    )
    .await;
    assert_eq!(common::raw_status(&response), 400);
    assert_eq!(backend.hits(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn frontend_abort_resets_the_backend_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = listener.local_addr().unwrap();
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<bool>(1);
    let app = Router::new().fallback(move |request: Request<Body>| {
        let outcome_tx = outcome_tx.clone();
        async move {
            let complete = body::to_bytes(request.into_body(), usize::MAX).await.is_ok();
            let _ = outcome_tx.send(complete).await;
            common::status(200)
        }
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let mut config = GatewayConfig::default();
    config.mappings.push(open_mapping(backend_addr));
    let (addr, shutdown) = common::start_gateway(config, None).await;

    let mut frontend = TcpStream::connect(addr).await.unwrap();
    frontend
        .write_all(
            b"POST /app/upload HTTP/1.1\r\nHost: gateway\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(frontend);

    let complete = tokio::time::timeout(Duration::from_secs(5), outcome_rx.recv())
        .await
        .expect("backend never saw the request end")
        .expect("backend channel closed");
    assert!(!complete, "backend body should fail once the frontend is gone");

    shutdown.trigger();
}
