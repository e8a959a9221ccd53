// ============================================================================
// Axum Extractors
// ============================================================================
//
// - SignedRequest: verified signer with a freshly committed nonce
// - TokenRequest: identity bound to a redeemed `?token=` capability
//
// ============================================================================

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use muttr_types::{Identity, TokenMethod};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{self, Authentication, Authorized};
use crate::context::PodContext;
use crate::error::PodError;
use crate::tokens::INVALID_TOKEN_MESSAGE;

/// Authorization stage for signed routes
///
/// Usage:
/// ```rust,ignore
/// async fn handler(SignedRequest(authorized): SignedRequest, ...) -> PodResult<...> {
///     let alias = authorized.claim.param("alias")?;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SignedRequest(pub Authorized);

#[async_trait]
impl FromRequestParts<Arc<PodContext>> for SignedRequest {
    type Rejection = PodError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<PodContext>,
    ) -> Result<Self, Self::Rejection> {
        let authentication = parts.extensions.get::<Authentication>();
        let authorized = auth::authorize(&state.registry, authentication).await?;

        tracing::debug!(
            pubkeyhash = %authorized.identity.pubkeyhash,
            path = %parts.uri.path(),
            "Signed request authorized"
        );
        Ok(SignedRequest(authorized))
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Identity that redeemed a capability token for this exact method and path
#[derive(Debug, Clone)]
pub struct TokenRequest(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<PodContext>> for TokenRequest {
    type Rejection = PodError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<PodContext>,
    ) -> Result<Self, Self::Rejection> {
        let invalid = || PodError::not_found(INVALID_TOKEN_MESSAGE);

        let value = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .ok_or_else(invalid)?;
        let method: TokenMethod = parts.method.as_str().parse().map_err(|_| invalid())?;

        let token = state
            .tokens
            .require(&value, parts.uri.path(), method)
            .await?;

        let identity = state
            .registry
            .find_identity(&token.pubkeyhash)
            .await?
            .ok_or_else(invalid)?;

        Ok(TokenRequest(identity))
    }
}
