use crate::application_port::*;
use crate::domain_model::UserId;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
}

pub struct JwtHs256Codec {
    config: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

impl AccessTokenCodec for JwtHs256Codec {
    fn issue(&self, user: &UserId) -> Result<(AccessToken, DateTime<Utc>), SessionError> {
        let iat_dt = Utc::now();
        let exp_dt = iat_dt + self.config.access_ttl;
        let claims = AccessClaims {
            sub: user.to_string(),
            exp: exp_dt.timestamp(),
            iat: iat_dt.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.config.signing_key),
        )
        .map_err(|e| SessionError::Internal(e.to_string()))?;
        Ok((AccessToken(token), exp_dt))
    }

    fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = true;
        v.set_audience(&[self.config.audience.clone()]);
        v.set_issuer(&[self.config.issuer.clone()]);
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.config.signing_key),
            &v,
        )
        .map_err(|_| SessionError::TokenInvalid)?;
        Ok(UserId(data.claims.sub))
    }
}
