use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";

const VERSION: &str = "v0";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is {age_secs}s away from now")]
    Stale { age_secs: i64 },
    #[error("request signature does not match")]
    Mismatch,
}

/// Computes `v0=<hex hmac>` over `v0:{timestamp}:{body}`.
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    format!("{VERSION}={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    secret: SecretString,
    max_age_secs: u64,
}

impl SignatureVerifier {
    /// `max_age_secs == 0` disables the freshness check.
    pub fn new(secret: SecretString, max_age_secs: u64) -> Self {
        Self { secret, max_age_secs }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_secs: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        if self.max_age_secs > 0 {
            let sent_at = timestamp
                .trim()
                .parse::<i64>()
                .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
            let age_secs = now_secs.saturating_sub(sent_at);
            if age_secs.unsigned_abs() > self.max_age_secs {
                return Err(SignatureError::Stale { age_secs });
            }
        }

        let provided = signature
            .strip_prefix("v0=")
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or(SignatureError::Mismatch)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(format!("{VERSION}:{timestamp}:").as_bytes());
        mac.update(body);
        mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
    }
}
