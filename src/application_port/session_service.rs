use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("token invalid")]
    TokenInvalid,
    #[error("store error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Storage(err.to_string())
    }
}

impl From<TokenFormatError> for SessionError {
    fn from(err: TokenFormatError) -> Self {
        SessionError::Validation(err.to_string())
    }
}

impl From<UserIdError> for SessionError {
    fn from(err: UserIdError) -> Self {
        SessionError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub user_id: UserId,
    pub access_token: AccessToken,
    pub refresh_token: TokenString,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

pub trait AccessTokenCodec: Send + Sync {
    fn issue(&self, user: &UserId) -> Result<(AccessToken, DateTime<Utc>), SessionError>;
    fn verify(&self, token: &str) -> Result<UserId, SessionError>;
}

/// Validation layer in front of the `SessionStore`. Raw strings from
/// callers enter here and are checked before any storage call.
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    async fn create_token(&self, user_id: &str) -> Result<RefreshToken, SessionError>;
    /// Expired records are reported as absent.
    async fn find_by_token(&self, raw: &str) -> Result<Option<RefreshToken>, SessionError>;
    /// Logout. `Ok(())` for every well-formed token, live or not.
    async fn revoke(&self, raw: &str) -> Result<(), SessionError>;
    async fn rotate(&self, raw: &str) -> Result<AuthTokens, SessionError>;
    fn verify_access(&self, token: &str) -> Result<UserId, SessionError>;
}
