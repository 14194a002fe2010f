//! Invocation server — Axum-based HTTP front for the request router
//!
//! Plays the part of the serverless platform: each `POST /invoke` is one
//! invocation with the request body as the event.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use relay_core::{RequestRouter, RouterError};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::auth;

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<RequestRouter>,
    pub auth_token: Arc<str>,
    pub start_time: Instant,
}

pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(
        bind: SocketAddr,
        router: Arc<RequestRouter>,
        auth_token: impl Into<String>,
    ) -> Self {
        let state = GatewayState {
            router,
            auth_token: Arc::from(auth_token.into()),
            start_time: Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        app(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route("/invoke", post(invoke_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn status_for(err: &RouterError) -> StatusCode {
    match err {
        RouterError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
        e if e.is_configuration() => {
            warn!("Child agent registry needs attention: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn invoke_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !auth::authorize(&state.auth_token, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("Rejected invocation with malformed body: {}", e);
            return error_body(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e));
        }
    };

    match state.router.handle_value(event).await {
        Ok(response) => axum::Json(response).into_response(),
        Err(e) => error_body(status_for(&e), e.to_string()),
    }
}

async fn status_handler(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if !auth::authorize(&state.auth_token, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let config = state.router.config();
    axum::Json(serde_json::json!({
        "status": "ok",
        "mode": config.mode,
        "agents": config.child_agents.len(),
        "invocations": state.router.invocations(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
    .into_response()
}
