use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muttr_types::{Token, TokenMethod, TOKEN_TTL_SECS};
use redis::{aio::ConnectionManager, AsyncCommands};

use super::{StoreResult, TokenStore};

const TOKEN_KEY_PREFIX: &str = "token:";

/// Capability tokens held in Redis
///
/// Keys are written with a TTL, so expiry needs no sweeping.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
}

impl RedisTokenStore {
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(value: &str) -> String {
        format!("{TOKEN_KEY_PREFIX}{value}")
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn insert_token(&self, token: &Token) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(token)?;
        let _: () = conn
            .set_ex(Self::key(&token.value), payload, TOKEN_TTL_SECS as u64)
            .await?;
        Ok(())
    }

    async fn redeem_token(
        &self,
        value: &str,
        resource: &str,
        method: TokenMethod,
    ) -> StoreResult<Option<Token>> {
        let mut conn = self.conn.clone();
        let key = Self::key(value);

        let payload: Option<String> = conn.get(&key).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let token: Token = serde_json::from_str(&payload)?;
        if !token.grants(resource, method) || token.is_expired_at(Utc::now()) {
            return Ok(None);
        }

        // Only the caller whose DEL removed the key wins the token
        let removed: i64 = conn.del(&key).await?;
        Ok((removed == 1).then_some(token))
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(0)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_token_single_use() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let store = RedisTokenStore::connect(&url).await.unwrap();

        let token = Token {
            value: uuid::Uuid::new_v4().simple().to_string(),
            resource: "/inboxes".into(),
            method: TokenMethod::Get,
            pubkeyhash: "aa".into(),
            issued: Utc::now(),
        };
        store.insert_token(&token).await.unwrap();

        assert!(store
            .redeem_token(&token.value, "/inboxes", TokenMethod::Delete)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .redeem_token(&token.value, "/inboxes", TokenMethod::Get)
                .await
                .unwrap(),
            Some(token.clone())
        );
        assert!(store
            .redeem_token(&token.value, "/inboxes", TokenMethod::Get)
            .await
            .unwrap()
            .is_none());
    }
}
