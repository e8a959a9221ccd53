// ============================================================================
// Inbox Routes
// ============================================================================
//
// Endpoints:
// - POST /inboxes/:to - Send a content reference to local alias `to`
//   (signature + nonce; payload carries `from` and `key`)
// - GET /inboxes - Stored envelopes grouped by sender (token)
// - DELETE /inboxes - Purge stored envelopes, answer with the empty listing (token)
//
// ============================================================================

use axum::{
    extract::{Path, State},
    Json,
};
use muttr_types::{Contact, Envelope};
use std::sync::Arc;

use super::extractors::{SignedRequest, TokenRequest};
use crate::context::PodContext;
use crate::error::PodResult;

/// POST /inboxes/:to
pub async fn send_message(
    State(ctx): State<Arc<PodContext>>,
    Path(to): Path<String>,
    SignedRequest(authorized): SignedRequest,
) -> PodResult<Json<Envelope>> {
    let from = authorized.claim.param("from")?;
    let key = authorized.claim.param("key")?;

    let (envelope, delivery) = ctx.dispatcher.dispatch(&to, from, key).await?;

    tracing::info!(
        signer = %authorized.identity.pubkeyhash,
        recipient = %envelope.recipient.pubkeyhash,
        delivery = ?delivery,
        "Message dispatched"
    );
    Ok(Json(envelope))
}

/// GET /inboxes?token=...
pub async fn list_inbox(
    State(ctx): State<Arc<PodContext>>,
    TokenRequest(identity): TokenRequest,
) -> PodResult<Json<Vec<Contact>>> {
    Ok(Json(ctx.registry.inbox(&identity).await?))
}

/// DELETE /inboxes?token=...
pub async fn purge_inbox(
    State(ctx): State<Arc<PodContext>>,
    TokenRequest(identity): TokenRequest,
) -> PodResult<Json<Vec<Contact>>> {
    ctx.registry.purge_messages(&identity).await?;
    Ok(Json(ctx.registry.inbox(&identity).await?))
}
