use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::SessionStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RealSessionService {
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn AccessTokenCodec>,
    refresh_ttl: Duration,
}

impl RealSessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        codec: Arc<dyn AccessTokenCodec>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            refresh_ttl,
        }
    }
}

impl RealSessionService {
    async fn discard(&self, record: &RefreshToken) {
        if let Err(e) = self.store.delete_by_token(&record.token).await {
            warn!(user_id = %record.user_id, error = %e, "failed to discard unissued refresh token");
        }
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn create_token(&self, user_id: &str) -> Result<RefreshToken, SessionError> {
        let user_id: UserId = user_id.parse()?;
        let record = RefreshToken::generate(user_id, self.refresh_ttl);
        self.store.insert(&record).await?;
        info!(user_id = %record.user_id, expires_at = %record.expires_at, "refresh token issued");
        Ok(record)
    }

    async fn find_by_token(&self, raw: &str) -> Result<Option<RefreshToken>, SessionError> {
        let token = TokenString::parse(raw)?;
        let record = self.store.find_by_token(&token).await?;
        Ok(record.filter(|r| !r.is_expired_at(Utc::now())))
    }

    async fn revoke(&self, raw: &str) -> Result<(), SessionError> {
        let token = TokenString::parse(raw)?;
        self.store.delete_by_token(&token).await?;
        debug!("refresh token revoked");
        Ok(())
    }

    async fn rotate(&self, raw: &str) -> Result<AuthTokens, SessionError> {
        let token = TokenString::parse(raw)?;
        let Some(current) = self.store.find_by_token(&token).await? else {
            return Err(SessionError::TokenInvalid);
        };
        if current.is_expired_at(Utc::now()) {
            return Err(SessionError::TokenInvalid);
        }

        // successor first: a revoke-all landing between the two steps
        // deletes at least one of them
        let next = RefreshToken::generate(current.user_id.clone(), self.refresh_ttl);
        self.store.insert(&next).await?;
        let consumed = match self.store.take_by_token(&token).await {
            Ok(consumed) => consumed,
            Err(e) => {
                self.discard(&next).await;
                return Err(e.into());
            }
        };
        match consumed {
            Some(old) if old.user_id == next.user_id && !old.is_expired_at(Utc::now()) => {}
            _ => {
                // revoked or rotated concurrently
                self.discard(&next).await;
                return Err(SessionError::TokenInvalid);
            }
        }

        let (access_token, access_token_expires_at) = match self.codec.issue(&next.user_id) {
            Ok(issued) => issued,
            Err(e) => {
                self.discard(&next).await;
                return Err(e);
            }
        };
        info!(user_id = %next.user_id, "refresh token rotated");

        Ok(AuthTokens {
            user_id: next.user_id,
            access_token,
            refresh_token: next.token,
            access_token_expires_at,
            refresh_token_expires_at: next.expires_at,
        })
    }

    fn verify_access(&self, token: &str) -> Result<UserId, SessionError> {
        self.codec.verify(token)
    }
}
