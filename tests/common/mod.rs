//! Shared utilities for gateway integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{HeaderMap, Request, Response, StatusCode},
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use waf_gateway::config::{BackendConfig, FlowType, GatewayConfig, IdentityConfig, MappingConfig};
use waf_gateway::identity::{IdentityServices, TokenVerifier};
use waf_gateway::lifecycle::Shutdown;
use waf_gateway::GatewayServer;

pub const SESSION_COOKIE: &str = "gateway.session";

/// A request seen by a mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

/// A programmable backend or identity provider on an ephemeral port.
#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a mock answering every request with `respond(request, call_index)`.
pub async fn start_programmable_backend<F>(respond: F) -> MockServer
where
    F: Fn(&Recorded, usize) -> Response<Body> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();
    let respond = Arc::new(respond);

    let recorded = Arc::clone(&requests);
    let app = Router::new().fallback(move |request: Request<Body>| {
        let recorded = Arc::clone(&recorded);
        let respond = Arc::clone(&respond);
        async move {
            let (parts, body) = request.into_parts();
            let bytes = body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let request = Recorded {
                method: parts.method.to_string(),
                path: parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.to_string())
                    .unwrap_or_default(),
                headers: parts.headers,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            };
            let index = {
                let mut all = recorded.lock().unwrap();
                all.push(request.clone());
                all.len() - 1
            };
            respond(&request, index)
        }
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockServer { addr, requests }
}

/// Start a mock backend answering 200 with a fixed body.
pub async fn start_mock_backend(body: &'static str) -> MockServer {
    start_programmable_backend(move |_, _| Response::new(Body::from(body))).await
}

pub fn status(code: u16) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::from_u16(code).unwrap();
    response
}

pub fn json(body: &str) -> Response<Body> {
    Response::builder()
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn mapping(name: &str, root: &str, flow: FlowType, backend: SocketAddr) -> MappingConfig {
    MappingConfig {
        name: name.into(),
        context_root: root.into(),
        authentication_flow: flow,
        backend: BackendConfig {
            host: backend.ip().to_string(),
            port: backend.port(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Verifier answering a fixed verdict, counting calls.
pub struct StubVerifier {
    pub accept: bool,
}

#[async_trait]
impl TokenVerifier for StubVerifier {
    async fn verify(&self, _token: &str, _certificate_url: &str, _audience: Option<&str>) -> bool {
        self.accept
    }
}

pub fn identity_with_verifier(accept: bool) -> IdentityServices {
    IdentityServices::new(&IdentityConfig::default())
        .unwrap()
        .with_verifier(Arc::new(StubVerifier { accept }))
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig, identity: Option<IdentityServices>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = match identity {
        Some(identity) => GatewayServer::with_identity(config, identity),
        None => GatewayServer::new(config).unwrap(),
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    (addr, shutdown)
}

/// Client that neither follows redirects nor keeps cookies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// `name=value` of the session cookie set by a gateway response.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&format!("{SESSION_COOKIE}=")))
        .and_then(|c| c.split(';').next().map(str::to_string))
}

pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Write `request` verbatim and read until the gateway closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Status code of a raw HTTP/1.x response.
pub fn raw_status(response: &str) -> u16 {
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}
