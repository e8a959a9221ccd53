use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use muttr_types::{Alias, Envelope, Identity, Token, TokenMethod};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Mutex, RwLock};

use super::{
    AliasBinding, DhtEntry, DhtStorage, EnvelopeStore, IdentityStore, NonceAdvance, StoreResult,
    TokenStore,
};

/// Process-local store backing every repository trait
///
/// Each table sits behind its own lock; compare-and-set operations hold the
/// write lock for their whole read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    identities: RwLock<HashMap<String, Identity>>,
    aliases: RwLock<HashMap<String, Alias>>,
    envelopes: RwLock<Vec<Envelope>>,
    tokens: Mutex<HashMap<String, Token>>,
    dht: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn upsert_identity(&self, identity: Identity) -> StoreResult<Identity> {
        let mut identities = self.identities.write().await;
        let stored = identities
            .entry(identity.pubkeyhash.clone())
            .or_insert(identity);
        Ok(stored.clone())
    }

    async fn find_identity(&self, pubkeyhash: &str) -> StoreResult<Option<Identity>> {
        Ok(self.identities.read().await.get(pubkeyhash).cloned())
    }

    async fn advance_nonce(&self, pubkeyhash: &str, nonce: u64) -> StoreResult<NonceAdvance> {
        let mut identities = self.identities.write().await;
        let Some(identity) = identities.get_mut(pubkeyhash) else {
            return Ok(NonceAdvance::UnknownIdentity);
        };

        if !identity.accepts_nonce(nonce) {
            return Ok(NonceAdvance::Stale {
                last_nonce: identity.last_nonce,
            });
        }

        identity.last_nonce = nonce;
        Ok(NonceAdvance::Advanced(identity.clone()))
    }

    async fn bind_alias(&self, alias: Alias) -> StoreResult<AliasBinding> {
        let mut aliases = self.aliases.write().await;
        match aliases.get(&alias.name) {
            Some(existing) if existing.pubkeyhash == alias.pubkeyhash => {
                Ok(AliasBinding::Existing(existing.clone()))
            }
            Some(_) => Ok(AliasBinding::Conflict),
            None => {
                aliases.insert(alias.name.clone(), alias.clone());
                Ok(AliasBinding::Created(alias))
            }
        }
    }

    async fn find_alias(&self, name: &str) -> StoreResult<Option<Alias>> {
        Ok(self.aliases.read().await.get(name).cloned())
    }

    async fn remove_alias(&self, name: &str, pubkeyhash: &str) -> StoreResult<bool> {
        let mut aliases = self.aliases.write().await;
        if aliases.get(name).is_some_and(|a| a.pubkeyhash == pubkeyhash) {
            aliases.remove(name);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl EnvelopeStore for MemoryStore {
    async fn insert_envelope(&self, envelope: &Envelope) -> StoreResult<()> {
        self.envelopes.write().await.push(envelope.clone());
        Ok(())
    }

    async fn envelopes_for(&self, pubkeyhash: &str) -> StoreResult<Vec<Envelope>> {
        let mut found: Vec<Envelope> = self
            .envelopes
            .read()
            .await
            .iter()
            .filter(|e| e.recipient.pubkeyhash == pubkeyhash)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        found.sort_by_key(|e| e.timestamp);
        Ok(found)
    }

    async fn purge_envelopes(&self, pubkeyhash: &str) -> StoreResult<u64> {
        let mut envelopes = self.envelopes.write().await;
        let before = envelopes.len();
        envelopes.retain(|e| e.recipient.pubkeyhash != pubkeyhash);
        Ok((before - envelopes.len()) as u64)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &Token) -> StoreResult<()> {
        self.tokens
            .lock()
            .await
            .insert(token.value.clone(), token.clone());
        Ok(())
    }

    async fn redeem_token(
        &self,
        value: &str,
        resource: &str,
        method: TokenMethod,
    ) -> StoreResult<Option<Token>> {
        let mut tokens = self.tokens.lock().await;
        match tokens.get(value) {
            Some(token) if token.is_expired_at(Utc::now()) => {
                tokens.remove(value);
                Ok(None)
            }
            Some(token) if token.grants(resource, method) => Ok(tokens.remove(value)),
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl DhtStorage for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.dht.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.dht.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.dht.write().await.remove(key);
        Ok(())
    }

    fn entries(&self) -> BoxStream<'_, StoreResult<DhtEntry>> {
        // Walks the map one key at a time, re-acquiring the lock per step
        stream::unfold(None::<String>, move |after| async move {
            let dht = self.dht.read().await;
            let next = match &after {
                Some(last) => dht
                    .range::<String, _>((
                        std::ops::Bound::Excluded(last),
                        std::ops::Bound::Unbounded,
                    ))
                    .next(),
                None => dht.iter().next(),
            };
            let entry = next.map(|(key, value)| DhtEntry {
                key: key.clone(),
                value: value.clone(),
            })?;
            drop(dht);
            let cursor = Some(entry.key.clone());
            Some((Ok(entry), cursor))
        })
        .boxed()
    }
}
