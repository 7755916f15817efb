use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

// KEYS[1] record key; ARGV: expected status, expected updated_at, new value
const RECLAIM_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local record = cjson.decode(raw)
if record.status ~= ARGV[1] or record.updated_at ~= ARGV[2] then return 0 end
redis.call('SET', KEYS[1], ARGV[3], 'XX', 'KEEPTTL')
return 1
"#;

/// Dedup records with `SET NX EX`, the TTL being the redelivery horizon.
pub struct RedisDedupRepo {
    conn: ConnectionManager,
    prefix: String,
    horizon: Duration,
}

impl RedisDedupRepo {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, horizon: Duration) -> Self {
        RedisDedupRepo {
            conn,
            prefix: prefix.into(),
            horizon,
        }
    }

    fn key(&self, event_id: &EventId) -> String {
        format!("{}:evt:{}", self.prefix, event_id)
    }

    async fn set_status(
        &self,
        event_id: &EventId,
        status: DedupStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let Some(mut record) = self.get(event_id).await? else {
            return Ok(());
        };
        record.status = status;
        record.last_error = error.map(str::to_owned);
        record.updated_at = at;
        let value = encode(&record)?;

        let mut conn = self.conn.clone();
        let _: Option<String> = redis::cmd("SET")
            .arg(self.key(event_id))
            .arg(value)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode(record: &DedupRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl DedupRepo for RedisDedupRepo {
    async fn claim(&self, record: &DedupRecord) -> Result<DedupClaim, StoreError> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(self.key(&record.event_id))
            .arg(encode(record)?)
            .arg("NX")
            .arg("EX")
            .arg(self.horizon.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if set.is_some() {
            return Ok(DedupClaim::Won);
        }
        match self.get(&record.event_id).await? {
            Some(existing) => Ok(DedupClaim::Existing(existing)),
            None => Ok(DedupClaim::Existing(record.clone())),
        }
    }

    async fn get(&self, event_id: &EventId) -> Result<Option<DedupRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(event_id)).await.map_err(backend)?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(|e| StoreError::Decode(e.to_string())))
            .transpose()
    }

    async fn try_reclaim(
        &self,
        expected: &DedupRecord,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // same serializer as the stored JSON, so the strings compare equal
        let expected_updated_at = serde_json::to_value(expected.updated_at)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let expected_updated_at = expected_updated_at.as_str().unwrap_or_default().to_owned();

        let mut reclaimed = expected.clone();
        reclaimed.status = DedupStatus::Pending;
        reclaimed.updated_at = at;

        let mut conn = self.conn.clone();
        let swapped: i64 = redis::Script::new(RECLAIM_SCRIPT)
            .key(self.key(&expected.event_id))
            .arg(expected.status.as_str())
            .arg(expected_updated_at)
            .arg(encode(&reclaimed)?)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(swapped == 1)
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

    async fn prune_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        // the EX on claim already bounds record lifetime to the horizon
        Ok(0)
    }
}
