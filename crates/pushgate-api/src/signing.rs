//! Canonical-string HMAC signing shared by the verifier and callers.
//!
//! The canonical message is
//! `METHOD\nPATH\nTIMESTAMP\nTRIMMED_NONCE\nRAW_BODY` joined with plain
//! line feeds; the raw body bytes participate verbatim, so any JSON
//! reshaping between signing and verification breaks the signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

fn canonical_message(
    method: &str,
    path: &str,
    timestamp_ms: i64,
    nonce: &str,
    body: &[u8],
) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(method.len() + path.len() + nonce.len() + body.len() + 32);
    message.extend_from_slice(method.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(path.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(timestamp_ms.to_string().as_bytes());
    message.push(b'\n');
    message.extend_from_slice(nonce.trim().as_bytes());
    message.push(b'\n');
    message.extend_from_slice(body);
    message
}

fn digest(secret: &str, message: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Produce the hex signature a caller attaches as `X-Signature`.
///
/// Mirrors the caller-library contract: `timestamp_ms` is the value sent in
/// `X-Timestamp` and `body` is the exact serialized request body.
#[must_use]
pub fn sign_request(
    secret: &str,
    method: &str,
    path: &str,
    timestamp_ms: i64,
    nonce: &str,
    body: &[u8],
) -> String {
    digest(secret, &canonical_message(method, path, timestamp_ms, nonce, body))
        .map(hex::encode)
        .unwrap_or_default()
}

/// Verify a hex signature against the canonical message in constant time.
pub(crate) fn verify_signature(
    secret: &str,
    method: &str,
    path: &str,
    timestamp_ms: i64,
    nonce: &str,
    body: &[u8],
    signature_hex: &str,
) -> bool {
    let Some(expected) = digest(secret, &canonical_message(method, path, timestamp_ms, nonce, body))
    else {
        return false;
    };
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    expected.ct_eq(provided.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let body = br#"{"appId":"com.acme.app","platform":"ios","tokens":["t1"]}"#;
        let signature = sign_request("secret", "POST", "/v1/notify", 1_700_000_000_000, "n-1", body);
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(
            "secret",
            "POST",
            "/v1/notify",
            1_700_000_000_000,
            "n-1",
            body,
            &signature
        ));
    }

    #[test]
    fn verification_is_byte_exact_over_the_body() {
        let body = br#"{"a": 1}"#;
        let reshaped = br#"{"a":1}"#;
        let signature = sign_request("secret", "POST", "/v1/notify", 1, "n", body);
        assert!(verify_signature("secret", "POST", "/v1/notify", 1, "n", body, &signature));
        assert!(!verify_signature(
            "secret",
            "POST",
            "/v1/notify",
            1,
            "n",
            reshaped,
            &signature
        ));
    }

    #[test]
    fn nonce_is_trimmed_before_signing() {
        let body = b"{}";
        let trimmed = sign_request("secret", "POST", "/v1/notify", 1, "nonce", body);
        let padded = sign_request("secret", "POST", "/v1/notify", 1, "  nonce  ", body);
        assert_eq!(trimmed, padded);
    }

    #[test]
    fn mismatched_inputs_fail_verification() {
        let body = b"{}";
        let signature = sign_request("secret", "POST", "/v1/notify", 1, "n", body);
        assert!(!verify_signature("other", "POST", "/v1/notify", 1, "n", body, &signature));
        assert!(!verify_signature("secret", "GET", "/v1/notify", 1, "n", body, &signature));
        assert!(!verify_signature("secret", "POST", "/v1/notify", 2, "n", body, &signature));
        assert!(!verify_signature("secret", "POST", "/v1/notify", 1, "m", body, &signature));
        assert!(!verify_signature("secret", "POST", "/v1/notify", 1, "n", body, "zz"));
    }
}
