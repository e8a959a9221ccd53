// ============================================================================
// Storage Adapters
// ============================================================================
//
// Repository traits the registry, token and dispatch services are written
// against, plus the key/value contract consumed by the distributed store.
//
// Implementations:
// - memory.rs: everything in process (default, tests)
// - postgres.rs: identities, aliases, envelopes, DHT entries (sqlx)
// - redis_tokens.rs: capability tokens with native key expiry
//
// ============================================================================

mod memory;
mod postgres;
mod redis_tokens;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use redis_tokens::RedisTokenStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use muttr_types::{Alias, Envelope, Identity, Token, TokenMethod};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a compare-and-set on an identity's replay ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonceAdvance {
    /// The nonce was greater than the stored one and has been persisted
    Advanced(Identity),
    /// The nonce was not greater than `last_nonce`; nothing changed
    Stale { last_nonce: u64 },
    UnknownIdentity,
}

/// Outcome of a find-or-create on an alias name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasBinding {
    Created(Alias),
    /// Already bound to the requesting identity
    Existing(Alias),
    /// Bound to a different identity
    Conflict,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert `identity` unless one with the same pubkeyhash exists; return the stored record
    async fn upsert_identity(&self, identity: Identity) -> StoreResult<Identity>;

    async fn find_identity(&self, pubkeyhash: &str) -> StoreResult<Option<Identity>>;

    /// Atomically store `nonce` as the identity's last nonce if it is strictly greater
    async fn advance_nonce(&self, pubkeyhash: &str, nonce: u64) -> StoreResult<NonceAdvance>;

    async fn bind_alias(&self, alias: Alias) -> StoreResult<AliasBinding>;

    async fn find_alias(&self, name: &str) -> StoreResult<Option<Alias>>;

    /// Remove `name` if it is bound to `pubkeyhash`; returns whether anything was removed
    async fn remove_alias(&self, name: &str, pubkeyhash: &str) -> StoreResult<bool>;

    /// Round-trip to the backing store
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    async fn insert_envelope(&self, envelope: &Envelope) -> StoreResult<()>;

    /// All envelopes addressed to `pubkeyhash`, oldest first
    async fn envelopes_for(&self, pubkeyhash: &str) -> StoreResult<Vec<Envelope>>;

    /// Delete all envelopes addressed to `pubkeyhash`; returns how many were removed
    async fn purge_envelopes(&self, pubkeyhash: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &Token) -> StoreResult<()>;

    /// Consume the live token matching `value`, `resource` and `method`
    ///
    /// At most one caller ever receives `Some` for a given token. A token
    /// that does not match on every field is left untouched.
    async fn redeem_token(
        &self,
        value: &str,
        resource: &str,
        method: TokenMethod,
    ) -> StoreResult<Option<Token>>;

    /// Drop tokens issued before the TTL window ending at `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// One `{key, value}` pair of the distributed store's backing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Backing store for the distributed key/value network
///
/// Shared between the HTTP surface and the network component, so every
/// implementation must tolerate concurrent use.
#[async_trait]
pub trait DhtStorage: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Lazy scan over every entry. Calling it again restarts the scan.
    fn entries(&self) -> BoxStream<'_, StoreResult<DhtEntry>>;
}

/// Storage handles as wired into the pod
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub envelopes: Arc<dyn EnvelopeStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub dht: Arc<dyn DhtStorage>,
}

impl Stores {
    /// Everything backed by one in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            identities: store.clone(),
            envelopes: store.clone(),
            tokens: store.clone(),
            dht: store,
        }
    }

    /// Pick backends from configuration
    pub async fn connect(config: &crate::config::Config) -> anyhow::Result<Self> {
        let memory = Arc::new(MemoryStore::new());
        let mut stores = Self::from_memory(memory);

        if let Some(database_url) = &config.database_url {
            let pg = Arc::new(
                tokio::time::timeout(Duration::from_secs(10), PgStore::connect(database_url))
                    .await
                    .map_err(|_| anyhow::anyhow!("Database connection timed out after 10 seconds"))??,
            );
            tracing::info!("Connected to database");

            tracing::info!("Applying database migrations...");
            pg.migrate().await?;
            tracing::info!("Database migrations applied successfully.");

            stores.identities = pg.clone();
            stores.envelopes = pg.clone();
            stores.dht = pg;
        } else {
            tracing::warn!("DATABASE_URL not set, identities and envelopes are kept in memory");
        }

        if let Some(redis_url) = &config.redis_url {
            let tokens = tokio::time::timeout(
                Duration::from_secs(10),
                RedisTokenStore::connect(redis_url),
            )
            .await
            .map_err(|_| anyhow::anyhow!("Redis connection timed out after 10 seconds"))??;
            tracing::info!("Connected to Redis");
            stores.tokens = Arc::new(tokens);
        }

        Ok(stores)
    }
}
