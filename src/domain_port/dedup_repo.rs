use super::StoreError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

pub enum DedupClaim {
    /// This caller inserted the record and owns dispatch.
    Won,
    /// Someone already claimed the id; nothing may be dispatched.
    Existing(DedupRecord),
}

#[async_trait::async_trait]
pub trait DedupRepo: Send + Sync {
    /// Conditional insert of a `Pending` record. Must be atomic in the
    /// backend (unique key, `SET NX`, map entry), never a read-then-write.
    async fn claim(&self, record: &DedupRecord) -> Result<DedupClaim, StoreError>;

    async fn get(&self, event_id: &EventId) -> Result<Option<DedupRecord>, StoreError>;

    /// Compare-and-set back to `Pending` for a replay. Applies only while the
    /// stored status and `updated_at` still equal those of `expected`; of
    /// concurrent replays of one record at most one gets `true`.
    async fn try_reclaim(
        &self,
        expected: &DedupRecord,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn mark_succeeded(&self, event_id: &EventId, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    async fn mark_failed(
        &self,
        event_id: &EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop records received before `cutoff`.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
