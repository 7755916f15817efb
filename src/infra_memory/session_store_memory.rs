use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Default)]
pub struct MemorySessionStore {
    tokens: DashMap<TokenString, RefreshToken>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), StoreError> {
        match self.tokens.entry(record.token.clone()) {
            Entry::Occupied(_) => Err(StoreError::Backend("duplicate refresh token".into())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find_by_token(
        &self,
        token: &TokenString,
    ) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tokens.get(token).map(|r| r.value().clone()))
    }

    async fn delete_by_token(&self, token: &TokenString) -> Result<(), StoreError> {
        self.tokens.remove(token);
        Ok(())
    }

    async fn take_by_token(
        &self,
        token: &TokenString,
    ) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.tokens.remove(token).map(|(_, record)| record))
    }

    async fn delete_by_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| &record.user_id != user_id);
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, record| !record.is_expired_at(now));
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
