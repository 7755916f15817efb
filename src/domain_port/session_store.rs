use super::StoreError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a freshly generated refresh token.
    async fn insert(&self, record: &RefreshToken) -> Result<(), StoreError>;

    /// Absence is `Ok(None)`, never an error.
    async fn find_by_token(&self, token: &TokenString)
    -> Result<Option<RefreshToken>, StoreError>;

    /// Hard delete. Succeeds whether or not the token existed.
    async fn delete_by_token(&self, token: &TokenString) -> Result<(), StoreError>;

    /// Atomic find-and-delete. Among concurrent callers for the same token
    /// at most one gets `Some`.
    async fn take_by_token(&self, token: &TokenString)
    -> Result<Option<RefreshToken>, StoreError>;

    /// Revoke every session of a user, returning how many were removed.
    async fn delete_by_user(&self, user_id: &UserId) -> Result<u64, StoreError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
