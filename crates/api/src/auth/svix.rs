//! Svix (Clerk) webhook signature verification
//!
//! The secret is `whsec_` followed by the base64 signing key. The signed
//! content is `"{svix-id}.{svix-timestamp}.{raw body}"`; `svix-signature`
//! holds space-separated `v1,<base64>` entries, any of which may match.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{check_tolerance, SignatureError};

type HmacSha256 = Hmac<Sha256>;

pub const SVIX_ID: &str = "svix-id";
pub const SVIX_TIMESTAMP: &str = "svix-timestamp";
pub const SVIX_SIGNATURE: &str = "svix-signature";

fn signing_key(secret: &str) -> Result<Vec<u8>, SignatureError> {
    let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
    STANDARD
        .decode(encoded)
        .map_err(|_| SignatureError::InvalidSecret)
}

pub fn verify_svix_signature(
    message_id: &str,
    timestamp: &str,
    signature_header: &str,
    payload: &[u8],
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed_timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::MalformedHeader(format!("bad timestamp {}", timestamp)))?;
    check_tolerance(parsed_timestamp, now)?;

    let key = signing_key(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(message_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let candidates: Vec<&str> = signature_header
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == "v1")
        .map(|(_, signature)| signature)
        .collect();

    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader(
            "no v1 signature".to_string(),
        ));
    }

    let matched = candidates
        .iter()
        .filter_map(|signature| STANDARD.decode(signature).ok())
        .any(|signature| bool::from(signature.as_slice().ct_eq(expected.as_slice())));

    if !matched {
        tracing::warn!(message_id = %message_id, "Svix signature mismatch");
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

/// Build a valid `svix-signature` header value
#[cfg(test)]
pub(crate) fn sign(message_id: &str, timestamp: i64, payload: &[u8], secret: &str) -> String {
    let key = signing_key(secret).unwrap();
    let mut mac = HmacSha256::new_from_slice(&key).unwrap();
    mac.update(format!("{}.{}.", message_id, timestamp).as_bytes());
    mac.update(payload);
    format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes()))
}
