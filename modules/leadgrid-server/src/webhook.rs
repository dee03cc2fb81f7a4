//! Generation-completion webhook. The generator signs the raw request body
//! with HMAC-SHA256 over the shared secret; anything unsigned or missigned
//! is rejected before parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-leadgrid-signature";

#[derive(Debug, Deserialize)]
pub struct GenerationCallback {
    pub business_id: Uuid,
    #[serde(default)]
    pub status: Option<String>,
}

/// Verify the hex-encoded HMAC-SHA256 signature of `body`.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Sign a body the way the generator does. Test helper and documentation of
/// the contract in one place.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let secret = "shared-secret";
        let body = br#"{"business_id":"7b2ea2f1-9a44-4a7e-9d3a-1f0f39a2a001"}"#;
        let sig = sign(secret, body);
        assert!(verify_signature(secret, body, &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"{}";
        let sig = sign("secret-a", body);
        assert!(!verify_signature("secret-b", body, &sig));
    }

    #[test]
    fn tampered_body_fails() {
        let secret = "shared-secret";
        let sig = sign(secret, b"{\"business_id\":\"a\"}");
        assert!(!verify_signature(secret, b"{\"business_id\":\"b\"}", &sig));
    }

    #[test]
    fn garbage_signature_fails() {
        assert!(!verify_signature("secret", b"{}", "not-hex"));
        assert!(!verify_signature("secret", b"{}", ""));
    }
}
