//! X-Line-Signature verification: base64(HMAC-SHA256(channel secret, raw body)).

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed verifier built once from the channel secret and shared across requests.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl SignatureVerifier {
    pub fn new(channel_secret: &str) -> Result<Self, hmac::digest::InvalidLength> {
        let mac = HmacSha256::new_from_slice(channel_secret.as_bytes())?;
        Ok(Self { mac })
    }

    /// Signature the platform would send for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        let tag = self.mac.clone().chain_update(body).finalize().into_bytes();
        base64::engine::general_purpose::STANDARD.encode(tag)
    }

    /// Constant-time check of `signature` against the MAC of the exact bytes received.
    /// Undecodable signatures never match.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim())
        else {
            return false;
        };
        self.mac
            .clone()
            .chain_update(body)
            .verify_slice(&expected)
            .is_ok()
    }
}
