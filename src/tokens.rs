// ============================================================================
// Capability Tokens
// ============================================================================
//
// Lightweight authorization for read and delete operations. A signed,
// nonce-checked request mints a token for one (method, path); the token is
// then presented as `?token=` exactly once within 30 seconds.
//
// ============================================================================

use chrono::Utc;
use muttr_types::{Identity, Token, TokenMethod};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PodError, PodResult};
use crate::metrics;
use crate::storage::TokenStore;

/// Entropy of a token value in bytes (256 bits)
const TOKEN_BYTES: usize = 32;

pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token supplied";

#[derive(Clone)]
pub struct CapabilityTokens {
    store: Arc<dyn TokenStore>,
}

impl CapabilityTokens {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Mint a token authorizing `method` on exactly `resource` for `identity`
    pub async fn issue(
        &self,
        identity: &Identity,
        method: TokenMethod,
        resource: &str,
    ) -> PodResult<Token> {
        let token = Token {
            value: generate_token_value(),
            resource: resource.to_string(),
            method,
            pubkeyhash: identity.pubkeyhash.clone(),
            issued: Utc::now(),
        };

        self.store.insert_token(&token).await?;

        tracing::debug!(
            pubkeyhash = %identity.pubkeyhash,
            method = %method,
            resource = %resource,
            "Issued capability token"
        );
        Ok(token)
    }

    /// Consume the token for this exact request
    ///
    /// Unknown value, wrong path, wrong method, expired and already-used all
    /// produce the same NotFound.
    pub async fn require(
        &self,
        value: &str,
        resource: &str,
        method: TokenMethod,
    ) -> PodResult<Token> {
        match self.store.redeem_token(value, resource, method).await? {
            Some(token) => Ok(token),
            None => {
                metrics::AUTH_FAILURES_TOTAL
                    .with_label_values(&["token"])
                    .inc();
                Err(PodError::not_found(INVALID_TOKEN_MESSAGE))
            }
        }
    }

    pub async fn ping(&self) -> PodResult<()> {
        Ok(self.store.ping().await?)
    }

    /// Purge expired tokens every `interval` until the runtime shuts down
    ///
    /// Stores with native expiry report nothing to purge.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.purge_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Purged expired tokens"),
                    Err(e) => tracing::warn!(error = %e, "Token sweep failed"),
                }
            }
        })
    }
}

fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
