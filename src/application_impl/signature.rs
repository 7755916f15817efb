use crate::application_port::SignatureError;
use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;
use std::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Accepted clock skew for timestamps from the future.
const FUTURE_SKEW_SECS: i64 = 60;

/// Verifies `t=<unix>,v1=<hex>` signature headers over the raw request body.
///
/// The signed message is `"{t}.{body}"`. Several `v1` entries may be present
/// and several secrets may be configured (current first, then previous ones
/// still accepted during a rotation); any pair that matches passes.
pub struct HmacSignatureVerifier {
    secrets: RwLock<Vec<Vec<u8>>>,
    tolerance_secs: i64,
}

struct ParsedHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<Vec<u8>>,
}

impl HmacSignatureVerifier {
    pub fn new(secrets: Vec<String>, tolerance_secs: u64) -> Self {
        Self {
            secrets: RwLock::new(Self::to_keys(secrets)),
            tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX),
        }
    }

    fn to_keys(secrets: Vec<String>) -> Vec<Vec<u8>> {
        secrets
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::into_bytes)
            .collect()
    }

    /// Swap the accepted secrets without restarting.
    pub fn rotate(&self, secrets: Vec<String>) {
        let keys = Self::to_keys(secrets);
        let count = keys.len();
        match self.secrets.write() {
            Ok(mut guard) => *guard = keys,
            Err(poisoned) => *poisoned.into_inner() = keys,
        }
        tracing::info!(secrets = count, "webhook secrets rotated");
    }

    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(body, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        body: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let parsed = parse_header(header)?;

        let timestamp: i64 = parsed
            .timestamp
            .parse()
            .map_err(|_| SignatureError::Malformed)?;
        // `t` is unauthenticated at this point
        let age = now
            .checked_sub(timestamp)
            .ok_or(SignatureError::Malformed)?;
        if age > self.tolerance_secs || age < -FUTURE_SKEW_SECS {
            return Err(SignatureError::Stale);
        }

        let secrets = match self.secrets.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if secrets.is_empty() {
            return Err(SignatureError::NoSecret);
        }

        for secret in &secrets {
            let mut mac =
                HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::NoSecret)?;
            mac.update(parsed.timestamp.as_bytes());
            mac.update(b".");
            mac.update(body);
            // verify_slice compares in constant time
            if parsed
                .signatures
                .iter()
                .any(|sig| mac.clone().verify_slice(sig).is_ok())
            {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Produce a header value for `body`. Used by tests and by operators
    /// crafting deliveries by hand.
    pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::NoSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        ))
    }
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            // undecodable entries simply never match
            if let Ok(bytes) = hex::decode(s) {
                signatures.push(bytes);
            }
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}
