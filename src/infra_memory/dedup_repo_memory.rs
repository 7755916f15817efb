use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Default)]
pub struct MemoryDedupRepo {
    records: DashMap<EventId, DedupRecord>,
}

impl MemoryDedupRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn update(
        &self,
        event_id: &EventId,
        status: DedupStatus,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.records.get_mut(event_id) {
            Some(mut record) => {
                record.status = status;
                record.last_error = error.map(str::to_owned);
                record.updated_at = at;
                Ok(())
            }
            // pruned between claim and completion
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DedupRepo for MemoryDedupRepo {
    async fn claim(&self, record: &DedupRecord) -> Result<DedupClaim, StoreError> {
        match self.records.entry(record.event_id.clone()) {
            Entry::Occupied(existing) => Ok(DedupClaim::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(DedupClaim::Won)
            }
        }
    }

    async fn get(&self, event_id: &EventId) -> Result<Option<DedupRecord>, StoreError> {
        Ok(self.records.get(event_id).map(|r| r.value().clone()))
    }

    async fn try_reclaim(
        &self,
        expected: &DedupRecord,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // the shard lock held by get_mut makes check and set one step
        match self.records.get_mut(&expected.event_id) {
            Some(mut record)
                if record.status == expected.status && record.updated_at == expected.updated_at =>
            {
                record.status = DedupStatus::Pending;
                record.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_succeeded(
        &self,
        event_id: &EventId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(event_id, DedupStatus::Succeeded, None, at)
    }

    async fn mark_failed(
        &self,
        event_id: &EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(event_id, DedupStatus::Failed, Some(error), at)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.received_at >= cutoff);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}
