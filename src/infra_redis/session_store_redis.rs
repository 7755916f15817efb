use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

// KEYS[1] user index set; returns how many token entries were deleted
const REVOKE_USER_SCRIPT: &str = r#"
local removed = 0
for _, key in ipairs(redis.call('SMEMBERS', KEYS[1])) do
    removed = removed + redis.call('DEL', key)
end
redis.call('DEL', KEYS[1])
return removed
"#;

/// Refresh tokens as `SET EX` entries keyed by token digest, plus a per-user
/// index set for revoke-all. Expiry is left to Redis TTLs.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    user_id: UserId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisSessionStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, token: &TokenString) -> String {
        format!("{}:rt:{}", self.prefix, token.digest_hex())
    }

    fn user_key(&self, user_id: &UserId) -> String {
        format!("{}:user:{}", self.prefix, user_id)
    }

    fn decode(token: &TokenString, raw: Option<String>) -> Result<Option<RefreshToken>, StoreError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let stored: StoredSession =
            serde_json::from_str(&raw).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(RefreshToken {
            token: token.clone(),
            user_id: stored.user_id,
            issued_at: stored.issued_at,
            expires_at: stored.expires_at,
        }))
    }

    /// `GETDEL` the entry, then drop it from its owner's index set.
    async fn remove(&self, token: &TokenString) -> Result<Option<RefreshToken>, StoreError> {
        let key = self.key(token);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get_del(&key).await.map_err(backend)?;
        let record = Self::decode(token, raw)?;
        if let Some(record) = &record {
            let _: () = conn
                .srem(self.user_key(&record.user_id), &key)
                .await
                .map_err(backend)?;
        }
        Ok(record)
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), StoreError> {
        let ttl_secs = (record.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let value = serde_json::to_string(&StoredSession {
            user_id: record.user_id.clone(),
            issued_at: record.issued_at,
            expires_at: record.expires_at,
        })
        .map_err(|e| StoreError::Decode(e.to_string()))?;

        let key = self.key(&record.token);
        let user_key = self.user_key(&record.user_id);
        let mut conn = self.conn.clone();
        // MULTI/EXEC: an entry is never visible without its index membership
        let _: () = redis::pipe()
            .atomic()
            .set_ex(&key, value, ttl_secs)
            .ignore()
            .sadd(&user_key, &key)
            .ignore()
            .expire(&user_key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn find_by_token(
        &self,
        token: &TokenString,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(token)).await.map_err(backend)?;
        Self::decode(token, raw)
    }

    async fn delete_by_token(&self, token: &TokenString) -> Result<(), StoreError> {
        self.remove(token).await.map(|_| ())
    }

    async fn take_by_token(
        &self,
        token: &TokenString,
    ) -> Result<Option<RefreshToken>, StoreError> {
        self.remove(token).await
    }

    async fn delete_by_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        // one script run, so no insert interleaves between SMEMBERS and DEL
        let removed: u64 = redis::Script::new(REVOKE_USER_SCRIPT)
            .key(self.user_key(user_id))
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed)
    }

    async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        // TTLs already evict expired entries
        Ok(0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
