//! HTTP gateway (Axum): the thin transport adapter over the engine.
//!
//! The adapter only decodes requests, threads request ids and source
//! addresses into the [`OpContext`](crate::engine::OpContext), and maps
//! engine errors onto the wire error payload. All semantics live in the
//! engine.

pub mod error;
pub mod handler;
pub mod payload;
pub mod state;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{ErrorBody, GatewayError};
pub use handler::{FORWARDED_FOR_HEADER, REQUEST_ID_HEADER, op_context};
pub use state::AppState;

use crate::index::VectorIndex;

/// Response header carrying the serving tier (or an error code).
pub const MEMORAI_STATUS_HEADER: &str = "X-Memorai-Status";

/// Builds the full route tree over a handler state.
pub fn create_router_with_state<I: VectorIndex + 'static>(state: AppState<I>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler::<I>))
        .route("/ready", get(ready_handler::<I>))
        .route("/v1/memory/remember", post(handler::remember_handler::<I>))
        .route("/v1/memory/recall", post(handler::recall_handler::<I>))
        .route("/v1/memory/forget", post(handler::forget_handler::<I>))
        .route("/v1/memory/context", post(handler::context_handler::<I>))
        .route("/v1/memory/stats", get(handler::stats_handler::<I>))
        .route("/v1/memory/list", get(handler::list_handler::<I>))
        .route("/v1/tier", get(handler::tier_handler::<I>))
        .route("/v1/tier/reprobe", post(handler::reprobe_handler::<I>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Stamps the serving tier onto a successful response.
pub(crate) async fn with_tier_header<I: VectorIndex + 'static>(
    state: &AppState<I>,
    mut response: Response,
) -> Response {
    let health = state.engine.health().await;
    if let Ok(value) = HeaderValue::from_str(&health.state) {
        response.headers_mut().insert(MEMORAI_STATUS_HEADER, value);
    }
    response
}

#[derive(serde::Serialize)]
/// Body of `GET /healthz`.
pub struct HealthResponse {
    /// Always `ok` when the process answers.
    pub status: &'static str,
    /// Tier state-machine state.
    pub state: String,
    /// Active tier name, when serving.
    pub active_tier: Option<String>,
    /// Most recent backend failure.
    pub last_error: Option<String>,
    /// Milliseconds since engine construction.
    pub uptime_ms: u64,
}

#[tracing::instrument(skip(state))]
async fn health_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
) -> Response {
    let health = state.engine.health().await;
    Json(HealthResponse {
        status: "ok",
        active_tier: health.active_tier.map(|l| l.as_str().to_string()),
        state: health.state,
        last_error: health.last_error,
        uptime_ms: health.uptime_ms,
    })
    .into_response()
}

#[tracing::instrument(skip(state))]
async fn ready_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
) -> Response {
    let health = state.engine.health().await;
    let serving = health.active_tier.is_some();
    let status_code = if serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if serving { "ok" } else { "pending" },
            active_tier: health.active_tier.map(|l| l.as_str().to_string()),
            state: health.state,
            last_error: health.last_error,
            uptime_ms: health.uptime_ms,
        }),
    )
        .into_response()
}
