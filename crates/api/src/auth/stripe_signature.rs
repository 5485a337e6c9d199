//! Stripe webhook signature verification
//!
//! Header format: `t=<unix>,v1=<hex>[,v1=<hex>...][,v0=<hex>]`. The signed
//! content is `"{t}.{raw body}"`, HMAC-SHA256 keyed with the full endpoint
//! secret. Any `v1` entry may match, which covers secret rotation.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{check_tolerance, SignatureError};

type HmacSha256 = Hmac<Sha256>;

pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut raw_timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            match key {
                "t" => raw_timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
    }

    let raw_timestamp = raw_timestamp
        .ok_or_else(|| SignatureError::MalformedHeader("missing timestamp".to_string()))?;
    let timestamp: i64 = raw_timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader(format!("bad timestamp {}", raw_timestamp)))?;

    if signatures.is_empty() {
        tracing::warn!("Stripe signature header has no v1 signature");
        return Err(SignatureError::MalformedHeader(
            "missing v1 signature".to_string(),
        ));
    }

    check_tolerance(timestamp, now)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(raw_timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let matched = signatures
        .iter()
        .filter_map(|signature| hex::decode(signature).ok())
        .any(|signature| bool::from(signature.as_slice().ct_eq(expected.as_slice())));

    if !matched {
        tracing::warn!(
            timestamp = timestamp,
            candidates = signatures.len(),
            "Stripe signature mismatch"
        );
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

/// Build a valid `Stripe-Signature` header
#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
