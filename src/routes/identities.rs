// ============================================================================
// Identity Routes
// ============================================================================
//
// Endpoints:
// - POST / - Register an armored public key (public, idempotent)
//
// ============================================================================

use axum::{extract::State, Json};
use muttr_types::Identity;
use std::sync::Arc;

use crate::context::PodContext;
use crate::error::PodResult;

/// POST /
/// Body is the armored public-key block
pub async fn register(
    State(ctx): State<Arc<PodContext>>,
    body: String,
) -> PodResult<Json<Identity>> {
    let identity = ctx.registry.create(&body).await?;
    Ok(Json(identity))
}
