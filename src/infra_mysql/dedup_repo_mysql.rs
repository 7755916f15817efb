use super::util::{decode_err, is_dup_key, store_err};
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlDedupRepo {
    pool: MySqlPool,
}

impl MySqlDedupRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<DedupRecord, StoreError> {
        let event_id: EventId = row.try_get("event_id").map_err(decode_err("event_id"))?;
        let kind: String = row.try_get("event_type").map_err(decode_err("event_type"))?;
        let payload: String = row.try_get("payload").map_err(decode_err("payload"))?;
        let payload = serde_json::from_str(&payload)
            .map_err(|e| StoreError::Decode(format!("payload json: {e}")))?;

        let status = match row.try_get::<&str, _>("status") {
            Ok(s) => DedupStatus::parse(s)
                .ok_or_else(|| StoreError::Decode(format!("dedup bad status: {s}")))?,
            Err(e) => return Err(decode_err("status")(e)),
        };

        Ok(DedupRecord {
            event_id,
            kind: EventKind::from(kind.as_str()),
            payload,
            status,
            last_error: row.try_get("last_error").map_err(decode_err("last_error"))?,
            received_at: row.try_get("received_at").map_err(decode_err("received_at"))?,
            updated_at: row.try_get("updated_at").map_err(decode_err("updated_at"))?,
        })
    }

    async fn set_status(
        &self,
        event_id: &EventId,
        status: DedupStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
UPDATE webhook_event_dedup SET status=?, last_error=?, updated_at=?
WHERE event_id=?
"#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(at)
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(store_err("dedup set_status"))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl DedupRepo for MySqlDedupRepo {
    async fn claim(&self, record: &DedupRecord) -> Result<DedupClaim, StoreError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| StoreError::Decode(format!("payload json: {e}")))?;

        let res = sqlx::query(
            r#"
INSERT INTO webhook_event_dedup
    (event_id, event_type, payload, status, last_error, received_at, updated_at)
VALUES (?, ?, ?, ?, NULL, ?, ?)
"#,
        )
        .bind(&record.event_id)
        .bind(record.kind.as_str())
        .bind(payload)
        .bind(record.status.as_str())
        .bind(record.received_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(DedupClaim::Won),
            Err(e) if is_dup_key(&e) => match self.get(&record.event_id).await? {
                Some(existing) => Ok(DedupClaim::Existing(existing)),
                // pruned between our insert attempt and the read; still a duplicate
                None => Ok(DedupClaim::Existing(record.clone())),
            },
            Err(e) => Err(store_err("dedup insert")(e)),
        }
    }

    async fn get(&self, event_id: &EventId) -> Result<Option<DedupRecord>, StoreError> {
        let row_opt = sqlx::query(
            r#"
SELECT event_id, event_type, payload, status, last_error, received_at, updated_at
FROM webhook_event_dedup
WHERE event_id=?
"#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err("dedup select"))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn try_reclaim(
        &self,
        expected: &DedupRecord,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
UPDATE webhook_event_dedup SET status=?, updated_at=?
WHERE event_id=? AND status=? AND updated_at=?
"#,
        )
        .bind(DedupStatus::Pending.as_str())
        .bind(at)
        .bind(&expected.event_id)
        .bind(expected.status.as_str())
        .bind(expected.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err("dedup reclaim"))?;

        Ok(res.rows_affected() == 1)
    }

    async fn mark_succeeded(
        &self,
        event_id: &EventId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.set_status(event_id, DedupStatus::Succeeded, None, at)
            .await
    }

    async fn mark_failed(
        &self,
        event_id: &EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.set_status(event_id, DedupStatus::Failed, Some(error), at)
            .await
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM webhook_event_dedup WHERE received_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_err("dedup prune"))?;

        Ok(res.rows_affected())
    }
}
