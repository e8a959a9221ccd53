// ============================================================================
// Identity Registry
// ============================================================================
//
// Service layer over the identity, alias and envelope stores. Identities are
// plain records; every operation takes the acting identity explicitly.
//
// ============================================================================

use muttr_crypto::PublicKey;
use muttr_types::{validate_alias_name, Alias, Contact, Envelope, Identity, Token, TokenMethod};
use std::sync::Arc;

use crate::dispatch::build_inboxes_from;
use crate::error::{PodError, PodResult};
use crate::storage::{AliasBinding, EnvelopeStore, IdentityStore, NonceAdvance};
use crate::tokens::CapabilityTokens;

/// Largest nonce the ledger can hold
pub const MAX_NONCE: u64 = i64::MAX as u64;

pub const INVALID_NONCE_MESSAGE: &str = "Invalid nonce supplied";

#[derive(Clone)]
pub struct IdentityRegistry {
    identities: Arc<dyn IdentityStore>,
    envelopes: Arc<dyn EnvelopeStore>,
    tokens: CapabilityTokens,
}

impl IdentityRegistry {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        envelopes: Arc<dyn EnvelopeStore>,
        tokens: CapabilityTokens,
    ) -> Self {
        Self {
            identities,
            envelopes,
            tokens,
        }
    }

    /// Register an armored public key
    ///
    /// Registering the same key material again returns the existing record.
    pub async fn create(&self, pubkey_armored: &str) -> PodResult<Identity> {
        let key = PublicKey::from_armored(pubkey_armored)?;
        let candidate = Identity::new(key.to_armored(), key.pubkeyhash());

        let identity = self.identities.upsert_identity(candidate).await?;

        tracing::info!(pubkeyhash = %identity.pubkeyhash, "Identity registered");
        Ok(identity)
    }

    pub async fn ping(&self) -> PodResult<()> {
        Ok(self.identities.ping().await?)
    }

    pub async fn find_identity(&self, pubkeyhash: &str) -> PodResult<Option<Identity>> {
        Ok(self.identities.find_identity(pubkeyhash).await?)
    }

    /// Identity bound to a local alias
    pub async fn resolve_alias(&self, name: &str) -> PodResult<Identity> {
        let alias = self
            .identities
            .find_alias(name)
            .await?
            .ok_or_else(|| PodError::not_found(format!("Unknown alias: {name}")))?;

        self.identities
            .find_identity(&alias.pubkeyhash)
            .await?
            .ok_or(PodError::NotFound(None))
    }

    /// Parsed public key of a local alias
    pub async fn resolve_alias_key(&self, name: &str) -> PodResult<PublicKey> {
        let identity = self.resolve_alias(name).await?;
        stored_key(&identity)
    }

    /// Advance the replay ledger to `nonce`
    ///
    /// Fails NotFound for an unknown identity and Unauthorized when `nonce`
    /// does not exceed the stored value.
    pub async fn advance_nonce(&self, pubkeyhash: &str, nonce: u64) -> PodResult<Identity> {
        if nonce > MAX_NONCE {
            return Err(PodError::unauthorized(INVALID_NONCE_MESSAGE));
        }

        match self.identities.advance_nonce(pubkeyhash, nonce).await? {
            NonceAdvance::Advanced(identity) => Ok(identity),
            NonceAdvance::Stale { last_nonce } => {
                tracing::warn!(
                    pubkeyhash = %pubkeyhash,
                    nonce,
                    last_nonce,
                    "Rejected replayed nonce"
                );
                Err(PodError::unauthorized(INVALID_NONCE_MESSAGE))
            }
            NonceAdvance::UnknownIdentity => Err(PodError::NotFound(None)),
        }
    }

    /// Find-or-create `name` under `identity`
    pub async fn add_alias(&self, identity: &Identity, name: &str) -> PodResult<Alias> {
        validate_alias_name(name)?;

        match self
            .identities
            .bind_alias(Alias::new(name, &identity.pubkeyhash))
            .await?
        {
            AliasBinding::Created(alias) => {
                tracing::info!(
                    pubkeyhash = %identity.pubkeyhash,
                    alias = %alias.name,
                    "Alias created"
                );
                Ok(alias)
            }
            AliasBinding::Existing(alias) => Ok(alias),
            AliasBinding::Conflict => Err(PodError::bad_request(format!(
                "Alias {name} is already taken"
            ))),
        }
    }

    pub async fn remove_alias(&self, identity: &Identity, name: &str) -> PodResult<()> {
        if !self
            .identities
            .remove_alias(name, &identity.pubkeyhash)
            .await?
        {
            return Err(PodError::not_found(format!("Unknown alias: {name}")));
        }

        tracing::info!(pubkeyhash = %identity.pubkeyhash, alias = %name, "Alias removed");
        Ok(())
    }

    pub async fn create_token(
        &self,
        identity: &Identity,
        method: TokenMethod,
        resource: &str,
    ) -> PodResult<Token> {
        self.tokens.issue(identity, method, resource).await
    }

    /// Envelopes addressed to `identity`, oldest first
    pub async fn get_messages(&self, identity: &Identity) -> PodResult<Vec<Envelope>> {
        Ok(self.envelopes.envelopes_for(&identity.pubkeyhash).await?)
    }

    /// Inbox grouped per sender, each group newest first
    pub async fn inbox(&self, identity: &Identity) -> PodResult<Vec<Contact>> {
        let messages = self.get_messages(identity).await?;
        Ok(build_inboxes_from(messages))
    }

    pub async fn purge_messages(&self, identity: &Identity) -> PodResult<u64> {
        let purged = self
            .envelopes
            .purge_envelopes(&identity.pubkeyhash)
            .await?;

        tracing::info!(pubkeyhash = %identity.pubkeyhash, purged, "Inbox purged");
        Ok(purged)
    }
}

/// Parse an identity's stored armored key
pub fn stored_key(identity: &Identity) -> PodResult<PublicKey> {
    PublicKey::from_armored(&identity.pubkey).map_err(|e| {
        PodError::internal(format!(
            "Stored key for {} is unreadable: {e}",
            identity.pubkeyhash
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use muttr_crypto::SigningKey;
    use rand::rngs::OsRng;

    fn registry() -> IdentityRegistry {
        let store = Arc::new(MemoryStore::new());
        IdentityRegistry::new(
            store.clone(),
            store.clone(),
            CapabilityTokens::new(store),
        )
    }

    fn armored_key() -> String {
        PublicKey::from(SigningKey::generate(&mut OsRng).verifying_key()).to_armored()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let registry = registry();
        let key = armored_key();

        let first = registry.create(&key).await.unwrap();
        registry.advance_nonce(&first.pubkeyhash, 3).await.unwrap();
        let second = registry.create(&key).await.unwrap();

        assert_eq!(first.pubkeyhash, second.pubkeyhash);
        assert_eq!(second.last_nonce, 3);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_key() {
        let registry = registry();
        assert!(matches!(
            registry.create("").await,
            Err(PodError::BadRequest(_))
        ));
        assert!(matches!(
            registry.create("not a key").await,
            Err(PodError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_is_rejected() {
        let registry = registry();
        let identity = registry.create(&armored_key()).await.unwrap();

        registry.advance_nonce(&identity.pubkeyhash, 5).await.unwrap();
        assert_eq!(
            registry.advance_nonce(&identity.pubkeyhash, 5).await,
            Err(PodError::unauthorized(INVALID_NONCE_MESSAGE))
        );
        let advanced = registry.advance_nonce(&identity.pubkeyhash, 6).await.unwrap();
        assert_eq!(advanced.last_nonce, 6);

        assert_eq!(
            registry.advance_nonce("ffff", 1).await,
            Err(PodError::NotFound(None))
        );
        assert!(registry
            .advance_nonce(&identity.pubkeyhash, u64::MAX)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_same_nonce_single_winner() {
        let registry = registry();
        let identity = registry.create(&armored_key()).await.unwrap();

        let attempts = (0..16).map(|_| {
            let registry = registry.clone();
            let hash = identity.pubkeyhash.clone();
            tokio::spawn(async move { registry.advance_nonce(&hash, 1).await.is_ok() })
        });

        let mut winners = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_alias_lifecycle() {
        let registry = registry();
        let alice = registry.create(&armored_key()).await.unwrap();
        let mallory = registry.create(&armored_key()).await.unwrap();

        registry.add_alias(&alice, "alice").await.unwrap();
        registry.add_alias(&alice, "alice").await.unwrap();
        assert!(matches!(
            registry.add_alias(&mallory, "alice").await,
            Err(PodError::BadRequest(_))
        ));
        assert!(matches!(
            registry.add_alias(&alice, "no spaces").await,
            Err(PodError::BadRequest(_))
        ));

        assert_eq!(
            registry.resolve_alias("alice").await.unwrap().pubkeyhash,
            alice.pubkeyhash
        );
        assert!(registry.resolve_alias_key("alice").await.is_ok());

        assert!(matches!(
            registry.remove_alias(&mallory, "alice").await,
            Err(PodError::NotFound(_))
        ));
        registry.remove_alias(&alice, "alice").await.unwrap();
        assert!(matches!(
            registry.resolve_alias("alice").await,
            Err(PodError::NotFound(_))
        ));
    }
}
