//! Proof Key for Code Exchange (PKCE) ([RFC 7636]).
//!
//! The code verifier binds the token-exchange leg of an authorization flow to
//! the authorize leg. Only the S256 challenge method is supported.
//!
//! [RFC 7636]: https://www.rfc-editor.org/rfc/rfc7636

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a code verifier: 32 random octets, base64url-encoded without
/// padding (43 characters).
#[must_use]
pub fn code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Derive the S256 code challenge for a verifier:
/// `base64url(sha256(verifier))` with padding stripped.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}
