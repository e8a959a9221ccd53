// ============================================================================
// Alias Routes
// ============================================================================
//
// Endpoints:
// - GET /aliases/:alias - Armored public key bound to the alias (public)
// - POST /aliases - Bind `alias` to the signer (signature + nonce)
// - DELETE /aliases/:alias - Release an alias (token)
//
// Remote pods resolve senders through GET /aliases/:alias, so its body is
// the bare armored key.
//
// ============================================================================

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use muttr_types::Alias;
use std::sync::Arc;

use super::extractors::{SignedRequest, TokenRequest};
use crate::context::PodContext;
use crate::error::PodResult;

/// GET /aliases/:alias
pub async fn lookup_alias(
    State(ctx): State<Arc<PodContext>>,
    Path(alias): Path<String>,
) -> PodResult<impl IntoResponse> {
    let identity = ctx.registry.resolve_alias(&alias).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        identity.pubkey,
    ))
}

/// POST /aliases
/// Signed payload carries `alias`
pub async fn create_alias(
    State(ctx): State<Arc<PodContext>>,
    SignedRequest(authorized): SignedRequest,
) -> PodResult<Json<Alias>> {
    let name = authorized.claim.param("alias")?;
    let alias = ctx.registry.add_alias(&authorized.identity, name).await?;
    Ok(Json(alias))
}

/// DELETE /aliases/:alias?token=...
pub async fn remove_alias(
    State(ctx): State<Arc<PodContext>>,
    Path(alias): Path<String>,
    TokenRequest(identity): TokenRequest,
) -> PodResult<StatusCode> {
    ctx.registry.remove_alias(&identity, &alias).await?;
    Ok(StatusCode::NO_CONTENT)
}
