// ============================================================================
// Token Routes
// ============================================================================
//
// Endpoints:
// - POST /tokens - Mint a capability token (signature + nonce)
//
// The signed payload names `method` (GET or DELETE) and `resource`, the
// exact path the token will be presented on.
//
// ============================================================================

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use muttr_types::{Token, TokenMethod};
use serde::Serialize;
use std::sync::Arc;

use super::extractors::SignedRequest;
use crate::context::PodContext;
use crate::error::{PodError, PodResult};

/// Token as returned to its owner; the owning identity is left out
#[derive(Debug, Serialize)]
pub struct TokenGrant {
    pub value: String,
    pub resource: String,
    pub method: TokenMethod,
    pub issued: DateTime<Utc>,
}

impl From<Token> for TokenGrant {
    fn from(token: Token) -> Self {
        Self {
            value: token.value,
            resource: token.resource,
            method: token.method,
            issued: token.issued,
        }
    }
}

/// POST /tokens
pub async fn create_token(
    State(ctx): State<Arc<PodContext>>,
    SignedRequest(authorized): SignedRequest,
) -> PodResult<Json<TokenGrant>> {
    let method: TokenMethod = authorized.claim.param("method")?.parse()?;
    let resource = authorized.claim.param("resource")?;
    if !resource.starts_with('/') {
        return Err(PodError::bad_request("Resource must be an absolute path"));
    }

    let token = ctx
        .registry
        .create_token(&authorized.identity, method, resource)
        .await?;
    Ok(Json(token.into()))
}
