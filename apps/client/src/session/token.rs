//! Unverified reads of bearer-token claims.
//!
//! The client never checks signatures; it only peeks at `exp`/`iat` to decide
//! whether a token is worth sending. Anything it cannot read counts as expired.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Prefix used by development builds for placeholder tokens. Never sent.
const PLACEHOLDER_PREFIX: &str = "mock-";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub exp: Option<i64>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub iat: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|s| Utc.timestamp_opt(s, 0).single())
    }
}

/// Accepts integer or fractional epoch seconds; anything else reads as absent.
fn epoch_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.floor() as i64))))
}

/// Decodes the payload segment of a `header.payload.signature` token.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.trim().split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// True when `exp` is at or before `now`, or when the token cannot be read.
pub fn is_token_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token).and_then(|c| c.exp) {
        Some(exp) => now.timestamp() >= exp,
        None => true,
    }
}

pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, Utc::now())
}

pub fn is_placeholder(token: &str) -> bool {
    token.starts_with(PLACEHOLDER_PREFIX)
}

#[cfg(test)]
pub(crate) fn make_token(claims: serde_json::Value) -> String {
    let header = Base64UrlUnpadded::encode_string(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
pub(crate) fn token_expiring_in(seconds: i64) -> String {
    let now = Utc::now().timestamp();
    make_token(serde_json::json!({ "exp": now + seconds, "iat": now, "sub": "user-1" }))
}
