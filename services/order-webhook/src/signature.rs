//! Webhook signature verification
//!
//! The sender signs the raw request body with HMAC-SHA256 under the shared
//! secret. The digest arrives hex encoded (64 characters) or base64 encoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify `header` against the body. Missing or undecodable headers fail.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> bool {
    let Some(expected) = header.and_then(decode_digest) else {
        return false;
    };
    let mut mac = keyed(secret);
    mac.update(body);
    // constant time
    mac.verify_slice(&expected).is_ok()
}

/// Hex-encoded signature of `body`
pub fn sign_hex(secret: &[u8], body: &[u8]) -> String {
    hex::encode(digest(secret, body))
}

/// Base64-encoded signature of `body`
pub fn sign_base64(secret: &[u8], body: &[u8]) -> String {
    STANDARD.encode(digest(secret, body))
}

fn keyed(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

fn digest(secret: &[u8], body: &[u8]) -> Vec<u8> {
    let mut mac = keyed(secret);
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

fn decode_digest(header: &str) -> Option<Vec<u8>> {
    let header = header.trim();
    if header.is_empty() {
        return None;
    }
    if header.len() == 64 && header.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(header).ok();
    }
    STANDARD.decode(header).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shpss_test_secret";
    const BODY: &[u8] = br#"{"id":1,"line_items":[]}"#;

    #[test]
    fn test_hex_signature_accepted() {
        let sig = sign_hex(SECRET, BODY);
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(SECRET, BODY, Some(&sig)));
        assert!(verify_signature(SECRET, BODY, Some(&sig.to_uppercase())));
    }

    #[test]
    fn test_base64_signature_accepted() {
        let sig = sign_base64(SECRET, BODY);
        assert!(verify_signature(SECRET, BODY, Some(&sig)));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let sig = sign_hex(SECRET, BODY);
        assert!(!verify_signature(SECRET, br#"{"id":2,"line_items":[]}"#, Some(&sig)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = sign_base64(b"other", BODY);
        assert!(!verify_signature(SECRET, BODY, Some(&sig)));
    }

    #[test]
    fn test_missing_or_garbage_header_rejected() {
        assert!(!verify_signature(SECRET, BODY, None));
        assert!(!verify_signature(SECRET, BODY, Some("")));
        assert!(!verify_signature(SECRET, BODY, Some("not base64 at all!")));
    }
}
