//! HTTP front end
//!
//! Static routing table: `/join` goes to the membership coordinator, every
//! other path (any method) is a write. Bodies are collected in full, chunks
//! in arrival order, before a handler runs; a body that fails mid-stream
//! never reaches the engine.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::NodeConfig;
use crate::coordinator::dispatcher::WriteDispatcher;
use crate::coordinator::membership::{JoinOutcome, MembershipCoordinator};
use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Client-chosen key for at-most-once writes
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Log index of a committed write
pub const LOG_INDEX_HEADER: &str = "X-Log-Index";

pub const JOIN_PATH: &str = "/join";

/// Shared state for HTTP handlers. Nothing request-local lives here.
#[derive(Clone)]
pub struct NodeState {
    pub membership: Arc<MembershipCoordinator>,
    pub dispatcher: Arc<WriteDispatcher>,
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl From<&NodeConfig> for RouterSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&NodeConfig::default())
    }
}

/// Body that failed to buffer (over the limit or a broken stream)
fn body_rejected(rejection: BytesRejection) -> Response {
    let reason = rejection.body_text();
    tracing::warn!("Request body rejected: {}", reason);
    (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
}

/// Add the sender to the cluster. 202 with an empty body on success.
async fn join(
    State(state): State<NodeState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejected(rejection),
    };

    match state.membership.handle_join(&body).await {
        Ok(JoinOutcome::Added { configuration_id })
        | Ok(JoinOutcome::AlreadyMember { configuration_id }) => {
            tracing::debug!(
                "Server {} accepted join at configuration {}",
                state.membership.identity().server_id,
                configuration_id
            );
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            tracing::warn!("Join failed: {}", e);
            e.into_response()
        }
    }
}

/// Replicate the body as one log entry and echo it back.
async fn write(
    State(state): State<NodeState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejected(rejection),
    };
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.dispatcher.dispatch(body.clone(), key).await {
        Ok(replicated) => (
            StatusCode::ACCEPTED,
            [(LOG_INDEX_HEADER, replicated.index.to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Write failed: {}", e);
            e.into_response()
        }
    }
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Request timed out".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled internal error: {}", err),
        )
    }
}

pub fn create_router(state: NodeState, settings: &RouterSettings) -> Router {
    Router::new()
        .route(JOIN_PATH, any(join))
        .fallback(write)
        .with_state(state)
        .layer(DefaultBodyLimit::max(settings.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(settings.request_timeout),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_tracing_middleware))
}
