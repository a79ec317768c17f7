use chasqui_common::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Validates a webhook signature header against the exact raw request bytes.
///
/// The header value is `sha256=<hexdigest>`, keyed by the resolved channel's
/// signing secret. Comparison is constant-time via the hmac crate's
/// `verify_slice`. Pure validation, no side effects.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<()> {
    let hex_digest = header
        .trim()
        .strip_prefix("sha256=")
        .ok_or_else(|| Error::Signature("header must use sha256=<hex> format".into()))?;

    let signature = hex::decode(hex_digest)
        .map_err(|_| Error::Signature("signature is not valid hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Signature("failed to initialize verifier".into()))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| Error::Signature("signature mismatch".into()))
}

/// Computes the `sha256=<hex>` header value for a body. Counterpart of
/// [`verify_signature`]; used by tests and local tooling.
pub fn signature_header(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// GET handshake check: the challenge may be echoed only when the mode is
/// `subscribe` and the token matches the configured verify token.
pub fn handshake_accepts(expected_token: Option<&str>, mode: &str, token: &str) -> bool {
    let Some(expected) = expected_token.map(str::trim).filter(|t| !t.is_empty()) else {
        return false;
    };
    mode == "subscribe" && token.trim() == expected
}

#[cfg(test)]
mod tests {
    use super::{handshake_accepts, signature_header, verify_signature};

    const SECRET: &str = "app-secret";

    #[test]
    fn a_freshly_signed_body_verifies() {
        let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let header = signature_header(SECRET, body);
        verify_signature(SECRET, body, &header).expect("signature should verify");
    }

    #[test]
    fn altering_a_single_byte_invalidates_the_signature() {
        let body = br#"{"object":"whatsapp_business_account"}"#.to_vec();
        let header = signature_header(SECRET, &body);

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(
                verify_signature(SECRET, &tampered, &header).is_err(),
                "flip at byte {i} should invalidate"
            );
        }
    }

    #[test]
    fn a_signature_from_a_different_secret_is_rejected() {
        let body = b"payload";
        let header = signature_header("other-secret", body);
        assert!(verify_signature(SECRET, body, &header).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let body = b"payload";
        assert!(verify_signature(SECRET, body, "deadbeef").is_err());
        assert!(verify_signature(SECRET, body, "sha256=not-hex").is_err());
        assert!(verify_signature(SECRET, body, "").is_err());
    }

    #[test]
    fn handshake_requires_subscribe_mode_and_a_matching_token() {
        assert!(handshake_accepts(Some("vt"), "subscribe", "vt"));
        assert!(!handshake_accepts(Some("vt"), "subscribe", "wrong"));
        assert!(!handshake_accepts(Some("vt"), "unsubscribe", "vt"));
        assert!(!handshake_accepts(None, "subscribe", "vt"));
        assert!(!handshake_accepts(Some(""), "subscribe", ""));
    }
}
