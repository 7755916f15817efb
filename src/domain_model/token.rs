use super::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const MAX_TOKEN_LEN: usize = 256;
/// 43 symbols of a 64-symbol alphabet, about 258 bits.
pub const GENERATED_TOKEN_LEN: usize = 43;

const TOKEN_ALPHABET: [char; 64] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l',
    'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4',
    '5', '6', '7', '8', '9', '_', '-',
];

/// Refresh-token string that passed the syntactic checks.
///
/// Only URL-safe characters are accepted, which is also the alphabet the
/// token generator draws from.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenString(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenFormatError {
    #[error("token is empty")]
    Empty,
    #[error("token longer than {MAX_TOKEN_LEN} bytes")]
    TooLong,
    #[error("token contains characters outside [A-Za-z0-9_-]")]
    BadCharacter,
}

impl TokenString {
    pub fn parse(raw: &str) -> Result<Self, TokenFormatError> {
        if raw.is_empty() {
            return Err(TokenFormatError::Empty);
        }
        if raw.len() > MAX_TOKEN_LEN {
            return Err(TokenFormatError::TooLong);
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(TokenFormatError::BadCharacter);
        }
        Ok(TokenString(raw.to_owned()))
    }

    pub fn generate() -> Self {
        TokenString(nanoid::nanoid!(GENERATED_TOKEN_LEN, &TOKEN_ALPHABET))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the token, the at-rest key for SQL storage.
    pub fn digest_hex(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

// never print the credential itself
impl fmt::Debug for TokenString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenString(***{})", self.0.len())
    }
}

impl TryFrom<String> for TokenString {
    type Error = TokenFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TokenString::parse(&value)
    }
}

impl From<TokenString> for String {
    fn from(value: TokenString) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: TokenString,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn generate(user_id: UserId, ttl: Duration) -> Self {
        let issued_at = Utc::now();
        RefreshToken {
            token: TokenString::generate(),
            user_id,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
