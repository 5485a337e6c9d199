//! Edge Case Tests for Webhook Signature Verification
//!
//! Boundary conditions in:
//! - Timestamp tolerance (SIG-T01 to SIG-T04)
//! - Stripe header parsing and secret rotation (SIG-S01 to SIG-S05)
//! - Svix header parsing (SIG-V01 to SIG-V04)

#[cfg(test)]
mod tolerance_tests {
    use super::super::{check_tolerance, SignatureError, SIGNATURE_TOLERANCE_SECS};
    use super::super::stripe_signature::{sign, verify_stripe_signature};
    use super::super::svix;

    const STRIPE_SECRET: &str = "whsec_test_secret";
    const CLERK_SECRET: &str = "whsec_Y2xlcmstc2lnbmluZy1rZXk=";
    const NOW: i64 = 1_700_000_000;

    // =========================================================================
    // SIG-T01: Signed exactly at the tolerance edge - accepted
    // =========================================================================
    #[test]
    fn test_stripe_timestamp_at_exact_tolerance() {
        let payload = b"{}";
        let header = sign(payload, STRIPE_SECRET, NOW - SIGNATURE_TOLERANCE_SECS);

        assert_eq!(
            verify_stripe_signature(payload, &header, STRIPE_SECRET, NOW),
            Ok(())
        );
    }

    // =========================================================================
    // SIG-T02: One second past tolerance - rejected even with a valid MAC
    // =========================================================================
    #[test]
    fn test_stripe_timestamp_one_past_tolerance() {
        let payload = b"{}";
        let timestamp = NOW - SIGNATURE_TOLERANCE_SECS - 1;
        let header = sign(payload, STRIPE_SECRET, timestamp);

        assert_eq!(
            verify_stripe_signature(payload, &header, STRIPE_SECRET, NOW),
            Err(SignatureError::TimestampOutOfTolerance { timestamp, now: NOW })
        );
    }

    // =========================================================================
    // SIG-T03: Future timestamps are bounded the same way as past ones
    // =========================================================================
    #[test]
    fn test_future_timestamp_symmetric() {
        assert_eq!(check_tolerance(NOW + SIGNATURE_TOLERANCE_SECS, NOW), Ok(()));
        assert!(check_tolerance(NOW + SIGNATURE_TOLERANCE_SECS + 1, NOW).is_err());
    }

    // =========================================================================
    // SIG-T04: Svix uses the same window
    // =========================================================================
    #[test]
    fn test_svix_tolerance_boundary() {
        let payload = b"{}";

        let at_edge = NOW - SIGNATURE_TOLERANCE_SECS;
        let header = svix::sign("msg_1", at_edge, payload, CLERK_SECRET);
        assert_eq!(
            svix::verify_svix_signature(
                "msg_1",
                &at_edge.to_string(),
                &header,
                payload,
                CLERK_SECRET,
                NOW
            ),
            Ok(())
        );

        let stale = at_edge - 1;
        let header = svix::sign("msg_1", stale, payload, CLERK_SECRET);
        assert!(matches!(
            svix::verify_svix_signature(
                "msg_1",
                &stale.to_string(),
                &header,
                payload,
                CLERK_SECRET,
                NOW
            ),
            Err(SignatureError::TimestampOutOfTolerance { .. })
        ));
    }
}

#[cfg(test)]
mod stripe_header_tests {
    use super::super::stripe_signature::{sign, verify_stripe_signature};
    use super::super::SignatureError;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn v1_of(header: &str) -> &str {
        header
            .split(',')
            .find_map(|part| part.strip_prefix("v1="))
            .unwrap()
    }

    // =========================================================================
    // SIG-S01: Rotation - old and new secret signatures both listed
    // =========================================================================
    #[test]
    fn test_multiple_v1_any_matches() {
        let payload = br#"{"id":"evt_1"}"#;
        let old = sign(payload, "whsec_old_secret", NOW);
        let new = sign(payload, SECRET, NOW);
        let header = format!("t={},v1={},v1={}", NOW, v1_of(&old), v1_of(&new));

        assert_eq!(verify_stripe_signature(payload, &header, SECRET, NOW), Ok(()));
    }

    // =========================================================================
    // SIG-S02: A valid v0 entry alone is not enough
    // =========================================================================
    #[test]
    fn test_v0_only_is_malformed() {
        let payload = b"{}";
        let valid = sign(payload, SECRET, NOW);
        let header = format!("t={},v0={}", NOW, v1_of(&valid));

        assert!(matches!(
            verify_stripe_signature(payload, &header, SECRET, NOW),
            Err(SignatureError::MalformedHeader(_))
        ));
    }

    // =========================================================================
    // SIG-S03: Non-hex v1 entries are skipped, not fatal
    // =========================================================================
    #[test]
    fn test_non_hex_entry_skipped() {
        let payload = b"{}";
        let valid = sign(payload, SECRET, NOW);
        let header = format!("t={},v1=not-hex,v1={}", NOW, v1_of(&valid));

        assert_eq!(verify_stripe_signature(payload, &header, SECRET, NOW), Ok(()));
    }

    // =========================================================================
    // SIG-S04: Whitespace after commas is tolerated
    // =========================================================================
    #[test]
    fn test_whitespace_between_parts() {
        let payload = b"{}";
        let valid = sign(payload, SECRET, NOW);
        let header = format!("t={}, v1={}", NOW, v1_of(&valid));

        assert_eq!(verify_stripe_signature(payload, &header, SECRET, NOW), Ok(()));
    }

    // =========================================================================
    // SIG-S05: Empty body is still signed content
    // =========================================================================
    #[test]
    fn test_empty_body_signature() {
        let header = sign(b"", SECRET, NOW);

        assert_eq!(verify_stripe_signature(b"", &header, SECRET, NOW), Ok(()));
        assert_eq!(
            verify_stripe_signature(b" ", &header, SECRET, NOW),
            Err(SignatureError::Mismatch)
        );
    }
}

#[cfg(test)]
mod svix_header_tests {
    use super::super::svix::{sign, verify_svix_signature};
    use super::super::SignatureError;

    const SECRET: &str = "whsec_Y2xlcmstc2lnbmluZy1rZXk=";
    const NOW: i64 = 1_700_000_000;

    // =========================================================================
    // SIG-V01: Only unknown versions listed - malformed
    // =========================================================================
    #[test]
    fn test_unknown_versions_only() {
        assert!(matches!(
            verify_svix_signature("msg_1", &NOW.to_string(), "v2,abcd", b"{}", SECRET, NOW),
            Err(SignatureError::MalformedHeader(_))
        ));
    }

    // =========================================================================
    // SIG-V02: Non-numeric timestamp - malformed
    // =========================================================================
    #[test]
    fn test_non_numeric_timestamp() {
        assert!(matches!(
            verify_svix_signature("msg_1", "yesterday", "v1,abcd", b"{}", SECRET, NOW),
            Err(SignatureError::MalformedHeader(_))
        ));
    }

    // =========================================================================
    // SIG-V03: Secret without the whsec_ prefix decodes the same key
    // =========================================================================
    #[test]
    fn test_secret_without_prefix() {
        let payload = b"{}";
        let header = sign("msg_1", NOW, payload, SECRET);
        let bare = SECRET.trim_start_matches("whsec_");

        assert_eq!(
            verify_svix_signature("msg_1", &NOW.to_string(), &header, payload, bare, NOW),
            Ok(())
        );
    }

    // =========================================================================
    // SIG-V04: Timestamp is part of the signed content
    // =========================================================================
    #[test]
    fn test_timestamp_is_signed() {
        let payload = b"{}";
        let header = sign("msg_1", NOW, payload, SECRET);
        let shifted = (NOW + 1).to_string();

        assert_eq!(
            verify_svix_signature("msg_1", &shifted, &header, payload, SECRET, NOW),
            Err(SignatureError::Mismatch)
        );
    }
}
