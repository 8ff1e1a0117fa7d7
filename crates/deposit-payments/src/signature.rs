//! Stripe Webhook Signatures
//!
//! Header format: `t=<unix_timestamp>,v1=<hex hmac>[,v1=<hex hmac>...][,v0=...]`.
//! The signed payload is `"{t}."` followed by the raw body bytes, keyed with the
//! full endpoint secret (including the `whsec_` prefix). The body is never
//! decoded, re-encoded, or otherwise touched before the MAC is checked.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header Stripe uses to carry the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Default maximum age of a signed delivery, matching the Stripe SDKs
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the signature was generated at
    pub timestamp: i64,

    /// Every `v1` (HMAC-SHA256) signature present; secrets being rolled
    /// produce more than one
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse a header value.
    ///
    /// Unknown schemes (`v0`, future ones), items without `=` and
    /// undecodable `v1` entries are skipped; they simply can never match.
    pub fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };

            match key {
                "t" => {
                    let parsed = value
                        .parse::<i64>()
                        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".into()))?;
                    timestamp = Some(parsed);
                }
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        v1_signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".into()))?;
        if v1_signatures.is_empty() {
            return Err(PaymentError::InvalidSignature("no v1 signature".into()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(format!("webhook secret unusable: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify `header` against the exact `payload` bytes.
///
/// `now` is the current unix time; deliveries older than `tolerance_secs`
/// are rejected to bound replay. Comparison is constant-time.
pub fn verify(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<SignatureHeader> {
    let parsed = SignatureHeader::parse(header)?;
    let mac = mac_for(secret, parsed.timestamp, payload)?;

    let matched = parsed
        .v1_signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
    if !matched {
        return Err(PaymentError::InvalidSignature(
            "no signature matches the payload".into(),
        ));
    }

    if now.saturating_sub(parsed.timestamp) > tolerance_secs {
        return Err(PaymentError::InvalidSignature(format!(
            "timestamp {} outside tolerance of {tolerance_secs}s",
            parsed.timestamp
        )));
    }

    Ok(parsed)
}

/// Build a valid header for `payload`, the same way Stripe does.
///
/// Used by the mock processor and by tests that need signed deliveries.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    #[test]
    fn test_valid_signature() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        let parsed = verify(SECRET, BODY, &header, NOW, DEFAULT_TOLERANCE_SECS).unwrap();
        assert_eq!(parsed.timestamp, NOW);
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        let mut tampered = BODY.to_vec();
        tampered[10] ^= 0x01;

        let err = verify(SECRET, &tampered, &header, NOW, DEFAULT_TOLERANCE_SECS).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[test]
    fn test_reserialized_body_rejected() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        let value: serde_json::Value = serde_json::from_slice(BODY).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();

        assert!(verify(SECRET, &pretty, &header, NOW, DEFAULT_TOLERANCE_SECS).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign("whsec_other", NOW, BODY).unwrap();
        assert!(verify(SECRET, BODY, &header, NOW, DEFAULT_TOLERANCE_SECS).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        let later = NOW + DEFAULT_TOLERANCE_SECS + 1;
        assert!(verify(SECRET, BODY, &header, later, DEFAULT_TOLERANCE_SECS).is_err());
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign(SECRET, NOW, BODY).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig},v0=deadbeef", "00".repeat(32));

        assert!(verify(SECRET, BODY, &header, NOW, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_items_without_equals_skipped() {
        let good = sign(SECRET, NOW, BODY).unwrap();

        for header in [format!("{good},"), format!("junk,{good}"), format!("{good},,extra")] {
            assert!(
                verify(SECRET, BODY, &header, NOW, DEFAULT_TOLERANCE_SECS).is_ok(),
                "{header}"
            );
        }
    }

    #[test]
    fn test_header_parse_errors() {
        assert!(SignatureHeader::parse("").is_err());
        assert!(SignatureHeader::parse("v1=abcd").is_err());
        assert!(SignatureHeader::parse("t=notanumber,v1=abcd").is_err());
        assert!(SignatureHeader::parse("t=123").is_err());
        assert!(SignatureHeader::parse("t=123,v1=zz").is_err());
    }
}
