//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared gateway state from configuration
//! - Create the axum router (catch-all dispatcher, SAML POST binding)
//! - Wire up middleware (request id, access log, request timeout)
//! - Serve until the shutdown broadcast fires
//! - Run the session sweeper alongside the server

use axum::{
    body::Body,
    extract::State,
    http::Request,
    routing::{any, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::http::dispatcher::{dispatch, GatewayState};
use crate::http::post_binding::saml_post_binding;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::identity::IdentityServices;
use crate::mapping::MappingTable;
use crate::proxy::BackendConnector;
use crate::resilience::{BreakerRegistry, BreakerSettings};
use crate::session::SessionStore;

/// The gateway's frontend server.
pub struct GatewayServer {
    config: GatewayConfig,
    identity: IdentityServices,
    mappings: Arc<MappingTable>,
    sessions: Arc<SessionStore>,
}

impl GatewayServer {
    /// Create a server with the production identity collaborators.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let identity = IdentityServices::new(&config.identity)?;
        Ok(Self::with_identity(config, identity))
    }

    /// Create a server with the given identity collaborators.
    pub fn with_identity(config: GatewayConfig, identity: IdentityServices) -> Self {
        let mappings = Arc::new(MappingTable::from_config(&config.mappings));
        let sessions = Arc::new(SessionStore::new(&config.session));
        tracing::info!(mappings = mappings.len(), "Mappings loaded");
        Self {
            config,
            identity,
            mappings,
            sessions,
        }
    }

    fn state(&self, local_port: u16) -> GatewayState {
        GatewayState {
            mappings: Arc::clone(&self.mappings),
            sessions: Arc::clone(&self.sessions),
            breakers: Arc::new(BreakerRegistry::new(BreakerSettings::from(
                &self.config.circuit_breaker,
            ))),
            connector: BackendConnector::new(self.config.proxy.clone()),
            identity: self.identity.clone(),
            session_cookie: Arc::from(self.config.session.cookie_name.as_str()),
            local_port,
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self, local_port: u16) -> Router {
        let state = self.state(local_port);
        let mut router = Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch));

        if let Some(prefix) = self.config.saml.post_binding_prefix.as_deref() {
            let prefix: Arc<str> = Arc::from(prefix.trim_end_matches('/'));
            let handler = {
                let prefix = Arc::clone(&prefix);
                move |State(state): State<GatewayState>, request: Request<Body>| {
                    let prefix = Arc::clone(&prefix);
                    async move { saml_post_binding(state, prefix, request).await }
                }
            };
            tracing::info!(prefix = %prefix, "SAML POST binding enabled");
            router = router.route(
                &format!("{prefix}/{{*target}}"),
                post(handler).fallback(dispatch),
            );
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %request_id(request.headers()),
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }))
                .layer(propagate_request_id_layer())
                .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs))),
        )
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let sweep_every = Duration::from_secs(self.config.session.sweep_interval_secs);
        tokio::spawn(
            Arc::clone(&self.sessions).run_sweeper(sweep_every, shutdown.resubscribe()),
        );

        let app = self
            .router(addr.port())
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
