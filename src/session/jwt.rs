//! Unverified JWT payload inspection.
//!
//! The server already verifies tokens; the client only reads `sub` and `exp`
//! to label the session and to fill in a missing expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum JwtError {
    #[error("Invalid JWT format")]
    Malformed,
    #[error("Failed to decode JWT payload: {0}")]
    Encoding(String),
    #[error("Failed to parse JWT payload: {0}")]
    Payload(String),
}

/// The registered claims the client cares about.
#[derive(Debug, Default, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub exp: Option<i64>,
}

/// Decode the payload segment of a compact JWT without checking the signature.
pub fn decode_claims(token: &str) -> Result<Claims, JwtError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(JwtError::Malformed),
    };

    // Some issuers keep the base64 padding; the no-pad engine rejects it.
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| JwtError::Encoding(e.to_string()))?;

    serde_json::from_slice(&decoded).map_err(|e| JwtError::Payload(e.to_string()))
}

/// Expiry of an access token from its `exp` claim, if it has one.
pub fn expiry(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token).ok()?.exp?;
    DateTime::from_timestamp(exp, 0)
}

/// Subject (`sub`) of an access token, if it has one.
pub fn subject(token: &str) -> Option<String> {
    decode_claims(token).ok()?.sub
}

#[cfg(test)]
pub(crate) fn make_token(payload_json: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\",\"typ\":\"JWT\"}");
    let payload = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());
    format!("{}.{}.fake-signature", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sub_and_exp() {
        let token = make_token("{\"sub\":\"user-123-abc\",\"exp\":1700000000}");

        assert_eq!(subject(&token).as_deref(), Some("user-123-abc"));
        assert_eq!(expiry(&token).map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_missing_exp() {
        let token = make_token("{\"sub\":\"user-123-abc\"}");
        assert_eq!(expiry(&token), None);
    }

    #[test]
    fn test_not_a_jwt() {
        assert_eq!(decode_claims("not-a-jwt").unwrap_err(), JwtError::Malformed);
        assert_eq!(decode_claims("a.b.c.d").unwrap_err(), JwtError::Malformed);
        assert_eq!(subject("not-a-jwt"), None);
    }

    #[test]
    fn test_garbage_payload() {
        let result = decode_claims("aGVhZGVy.!!!.sig");
        assert!(matches!(result, Err(JwtError::Encoding(_))));
    }
}
