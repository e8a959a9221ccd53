use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use muttr_types::{Alias, Envelope, Identity, Party};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use super::{
    AliasBinding, DhtEntry, DhtStorage, EnvelopeStore, IdentityStore, NonceAdvance, StoreError,
    StoreResult,
};

pub type DbPool = Pool<Postgres>;

#[derive(Debug, Clone, sqlx::FromRow)]
struct IdentityRow {
    pubkeyhash: String,
    pubkey: String,
    last_nonce: i64,
    registered: DateTime<Utc>,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Identity {
            pubkey: row.pubkey,
            pubkeyhash: row.pubkeyhash,
            // Column is constrained non-negative
            last_nonce: u64::try_from(row.last_nonce).unwrap_or_default(),
            registered: row.registered,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AliasRow {
    name: String,
    pubkeyhash: String,
    created: DateTime<Utc>,
}

impl From<AliasRow> for Alias {
    fn from(row: AliasRow) -> Self {
        Alias {
            name: row.name,
            pubkeyhash: row.pubkeyhash,
            created: row.created,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct EnvelopeRow {
    recipient_user_id: String,
    recipient_pubkeyhash: String,
    sender_user_id: String,
    sender_pubkeyhash: String,
    content_key: String,
    sent_at: DateTime<Utc>,
}

impl From<EnvelopeRow> for Envelope {
    fn from(row: EnvelopeRow) -> Self {
        Envelope {
            recipient: Party {
                user_id: row.recipient_user_id,
                pubkeyhash: row.recipient_pubkeyhash,
            },
            sender: Party {
                user_id: row.sender_user_id,
                pubkeyhash: row.sender_pubkeyhash,
            },
            key: row.content_key,
            timestamp: row.sent_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DhtRow {
    key: String,
    value: Vec<u8>,
}

/// PostgreSQL-backed identities, aliases, envelopes and DHT entries
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn nonce_to_db(nonce: u64) -> StoreResult<i64> {
    i64::try_from(nonce).map_err(|_| StoreError::OutOfRange(format!("nonce {nonce}")))
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn upsert_identity(&self, identity: Identity) -> StoreResult<Identity> {
        sqlx::query(
            r#"
            INSERT INTO identities (pubkeyhash, pubkey, last_nonce, registered)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pubkeyhash) DO NOTHING
            "#,
        )
        .bind(&identity.pubkeyhash)
        .bind(&identity.pubkey)
        .bind(nonce_to_db(identity.last_nonce)?)
        .bind(identity.registered)
        .execute(&self.pool)
        .await?;

        let stored = self.find_identity(&identity.pubkeyhash).await?;
        Ok(stored.unwrap_or(identity))
    }

    async fn find_identity(&self, pubkeyhash: &str) -> StoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT pubkeyhash, pubkey, last_nonce, registered
            FROM identities
            WHERE pubkeyhash = $1
            "#,
        )
        .bind(pubkeyhash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Identity::from))
    }

    async fn advance_nonce(&self, pubkeyhash: &str, nonce: u64) -> StoreResult<NonceAdvance> {
        // The WHERE clause makes this a single compare-and-set
        let advanced = sqlx::query_as::<_, IdentityRow>(
            r#"
            UPDATE identities
            SET last_nonce = $2
            WHERE pubkeyhash = $1 AND last_nonce < $2
            RETURNING pubkeyhash, pubkey, last_nonce, registered
            "#,
        )
        .bind(pubkeyhash)
        .bind(nonce_to_db(nonce)?)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = advanced {
            return Ok(NonceAdvance::Advanced(row.into()));
        }

        Ok(match self.find_identity(pubkeyhash).await? {
            Some(identity) => NonceAdvance::Stale {
                last_nonce: identity.last_nonce,
            },
            None => NonceAdvance::UnknownIdentity,
        })
    }

    async fn bind_alias(&self, alias: Alias) -> StoreResult<AliasBinding> {
        // Retry covers a concurrent delete between the insert and the lookup
        for _ in 0..3 {
            let created = sqlx::query_as::<_, AliasRow>(
                r#"
                INSERT INTO aliases (name, pubkeyhash, created)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO NOTHING
                RETURNING name, pubkeyhash, created
                "#,
            )
            .bind(&alias.name)
            .bind(&alias.pubkeyhash)
            .bind(alias.created)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = created {
                return Ok(AliasBinding::Created(row.into()));
            }

            match self.find_alias(&alias.name).await? {
                Some(existing) if existing.pubkeyhash == alias.pubkeyhash => {
                    return Ok(AliasBinding::Existing(existing))
                }
                Some(_) => return Ok(AliasBinding::Conflict),
                None => continue,
            }
        }

        Ok(AliasBinding::Conflict)
    }

    async fn find_alias(&self, name: &str) -> StoreResult<Option<Alias>> {
        let row = sqlx::query_as::<_, AliasRow>(
            r#"
            SELECT name, pubkeyhash, created
            FROM aliases
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Alias::from))
    }

    async fn remove_alias(&self, name: &str, pubkeyhash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM aliases WHERE name = $1 AND pubkeyhash = $2")
            .bind(name)
            .bind(pubkeyhash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EnvelopeStore for PgStore {
    async fn insert_envelope(&self, envelope: &Envelope) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO envelopes (
                recipient_user_id, recipient_pubkeyhash,
                sender_user_id, sender_pubkeyhash,
                content_key, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&envelope.recipient.user_id)
        .bind(&envelope.recipient.pubkeyhash)
        .bind(&envelope.sender.user_id)
        .bind(&envelope.sender.pubkeyhash)
        .bind(&envelope.key)
        .bind(envelope.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn envelopes_for(&self, pubkeyhash: &str) -> StoreResult<Vec<Envelope>> {
        let rows = sqlx::query_as::<_, EnvelopeRow>(
            r#"
            SELECT recipient_user_id, recipient_pubkeyhash,
                   sender_user_id, sender_pubkeyhash,
                   content_key, sent_at
            FROM envelopes
            WHERE recipient_pubkeyhash = $1
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(pubkeyhash)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Envelope::from).collect())
    }

    async fn purge_envelopes(&self, pubkeyhash: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM envelopes WHERE recipient_pubkeyhash = $1")
            .bind(pubkeyhash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DhtStorage for PgStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM dht_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dht_entries (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM dht_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn entries(&self) -> BoxStream<'_, StoreResult<DhtEntry>> {
        sqlx::query_as::<_, DhtRow>("SELECT key, value FROM dht_entries ORDER BY key")
            .fetch(&self.pool)
            .map(|row| {
                row.map(|r| DhtEntry {
                    key: r.key,
                    value: r.value,
                })
                .map_err(StoreError::from)
            })
            .boxed()
    }
}
