use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::instrument;

use super::error::GatewayError;
use super::payload::{ForgetBody, ListParams, RecallResponse, RememberResponse};
use super::state::AppState;
use super::with_tier_header;
use crate::engine::{ContextRequest, MemoryQuery, OpContext, RememberRequest};
use crate::index::VectorIndex;

/// Opaque request identifier echoed into traces, never interpreted.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Source address header consulted for source-scoped admission.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Builds the per-request context from transport headers.
pub fn op_context(headers: &HeaderMap) -> OpContext {
    let mut ctx = OpContext::new();
    if let Some(request_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        ctx = ctx.with_request_id(request_id);
    }
    if let Some(source) = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        ctx = ctx.with_source_addr(source);
    }
    ctx
}

#[instrument(skip(state, headers, req), fields(tenant = %req.tenant_id))]
pub async fn remember_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
    headers: HeaderMap,
    Json(req): Json<RememberRequest>,
) -> Result<Response, GatewayError> {
    let ctx = op_context(&headers);
    let id = state.engine.remember(req, &ctx).await?;
    Ok(with_tier_header(&state, Json(RememberResponse { id }).into_response()).await)
}

#[instrument(skip(state, headers, query), fields(tenant = %query.tenant_id, k = query.k))]
pub async fn recall_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
    headers: HeaderMap,
    Json(query): Json<MemoryQuery>,
) -> Result<Response, GatewayError> {
    let ctx = op_context(&headers);
    let memories = state.engine.recall(query, &ctx).await?;
    Ok(with_tier_header(&state, Json(RecallResponse { memories }).into_response()).await)
}

#[instrument(skip(state, headers, body))]
pub async fn forget_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
    headers: HeaderMap,
    Json(body): Json<ForgetBody>,
) -> Result<Response, GatewayError> {
    let ctx = op_context(&headers);
    let selector = body.into_selector()?;
    let outcome = state.engine.forget(selector, &ctx).await?;
    Ok(with_tier_header(&state, Json(outcome).into_response()).await)
}

#[instrument(skip(state, headers, req), fields(tenant = %req.tenant_id, agent = %req.agent_id))]
pub async fn context_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
    headers: HeaderMap,
    Json(req): Json<ContextRequest>,
) -> Result<Response, GatewayError> {
    let ctx = op_context(&headers);
    let bundle = state.engine.context(req, &ctx).await?;
    Ok(with_tier_header(&state, Json(bundle).into_response()).await)
}

#[instrument(skip(state, headers))]
pub async fn stats_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let ctx = op_context(&headers);
    let report = state.engine.stats(&ctx).await?;
    Ok(with_tier_header(&state, Json(report).into_response()).await)
}

#[instrument(skip(state, headers, params), fields(tenant = %params.tenant_id))]
pub async fn list_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, GatewayError> {
    let ctx = op_context(&headers);
    let page = state
        .engine
        .list(
            &params.tenant_id,
            params.agent_id.as_deref(),
            params.cursor.as_deref(),
            params.limit,
            &ctx,
        )
        .await?;
    Ok(with_tier_header(&state, Json(page).into_response()).await)
}

#[instrument(skip(state))]
pub async fn tier_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
) -> Result<Response, GatewayError> {
    let descriptor = state.engine.tier_info().await?;
    Ok(Json(descriptor).into_response())
}

#[instrument(skip(state))]
pub async fn reprobe_handler<I: VectorIndex + 'static>(
    State(state): State<AppState<I>>,
) -> Result<Response, GatewayError> {
    let descriptor = state.engine.re_probe().await?;
    Ok(Json(descriptor).into_response())
}
