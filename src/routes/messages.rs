// ============================================================================
// Content Routes
// ============================================================================
//
// Opaque ciphertext blobs addressed by content key.
//
// Endpoints:
// - POST /messages - Store raw content, answer with its key (public)
// - GET /messages/:hash - Fetch content by key (public)
//
// ============================================================================

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use muttr_types::validate_content_key;
use serde::Serialize;
use std::sync::Arc;

use crate::context::PodContext;
use crate::error::{PodError, PodResult};

#[derive(Debug, Serialize)]
pub struct StoredContent {
    pub key: String,
}

/// POST /messages
pub async fn store_content(
    State(ctx): State<Arc<PodContext>>,
    body: Bytes,
) -> PodResult<Json<StoredContent>> {
    if body.is_empty() {
        return Err(PodError::bad_request("Content is empty"));
    }

    let key = muttr_crypto::content_key(&body);
    ctx.dht.put(&key, body.to_vec()).await?;

    tracing::debug!(key = %key, size = body.len(), "Content stored");
    Ok(Json(StoredContent { key }))
}

/// GET /messages/:hash
pub async fn fetch_content(
    State(ctx): State<Arc<PodContext>>,
    Path(hash): Path<String>,
) -> PodResult<impl IntoResponse> {
    validate_content_key(&hash)?;

    let value = ctx
        .dht
        .get(&hash.to_ascii_lowercase())
        .await?
        .ok_or(PodError::NotFound(None))?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        value,
    ))
}
