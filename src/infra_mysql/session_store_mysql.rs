use super::util::{decode_err, store_err};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// Refresh tokens keyed by the SHA-256 of the token string.
///
/// The raw token is never written to the table, so the row keeps only the
/// digest and a lookup recomputes it.
pub struct MySqlSessionStore {
    pool: MySqlPool,
}

impl MySqlSessionStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlSessionStore { pool }
    }

    fn row_to_record(token: &TokenString, row: MySqlRow) -> Result<RefreshToken, StoreError> {
        let user_id: UserId = row.try_get("user_id").map_err(decode_err("user_id"))?;
        let issued_at: DateTime<Utc> =
            row.try_get("issued_at").map_err(decode_err("issued_at"))?;
        let expires_at: DateTime<Utc> =
            row.try_get("expires_at").map_err(decode_err("expires_at"))?;

        Ok(RefreshToken {
            token: token.clone(),
            user_id,
            issued_at,
            expires_at,
        })
    }
}

#[async_trait::async_trait]
impl SessionStore for MySqlSessionStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
INSERT INTO refresh_token (token_hash, user_id, issued_at, expires_at)
VALUES (?, ?, ?, ?)
"#,
        )
        .bind(record.token.digest_hex())
        .bind(&record.user_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("refresh_token insert"))?;

        Ok(())
    }

    async fn find_by_token(
        &self,
        token: &TokenString,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, issued_at, expires_at
FROM refresh_token
WHERE token_hash = ?
"#,
        )
        .bind(token.digest_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("refresh_token select"))?;

        row_opt
            .map(|row| Self::row_to_record(token, row))
            .transpose()
    }

    async fn delete_by_token(&self, token: &TokenString) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_token WHERE token_hash = ?")
            .bind(token.digest_hex())
            .execute(&self.pool)
            .await
            .map_err(store_err("refresh_token delete"))?;

        Ok(())
    }

    async fn take_by_token(
        &self,
        token: &TokenString,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let Some(record) = self.find_by_token(token).await? else {
            return Ok(None);
        };

        // the DELETE is the arbiter: only the caller that removed the row wins
        let res = sqlx::query("DELETE FROM refresh_token WHERE token_hash = ?")
            .bind(token.digest_hex())
            .execute(&self.pool)
            .await
            .map_err(store_err("refresh_token take"))?;

        if res.rows_affected() == 1 {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    async fn delete_by_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM refresh_token WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(store_err("refresh_token delete_by_user"))?;

        Ok(res.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM refresh_token WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(store_err("refresh_token delete_expired"))?;

        Ok(res.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(store_err("ping"))?;
        Ok(())
    }
}
