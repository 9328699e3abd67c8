//! # Key Resolver
//!
//! Resolves the public key a gateway token was signed with. Keys are looked
//! up by the identifier in the token header (`kid`, with any appended
//! algorithm name stripped, falling back to the `x5t` thumbprint), served
//! from the public-key cache when possible, and otherwise fetched from the
//! gateway's JWKS document after the token's issuer has been checked against
//! configuration.
//!
//! Cache writes are idempotent: concurrent resolves of the same missing key
//! may both fetch the JWKS, and both succeed.

use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::broker::provider::{Gateway, Metadata, Provider};
use crate::broker::state::{self, Family};
use crate::broker::types::TokenClaims;
use crate::broker::{Error, Result};
use crate::server;

/// RSA public-key components, cached in place of the opaque decoding key.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct CachedKey {
    /// Modulus, base64url.
    n: String,

    /// Exponent, base64url.
    e: String,
}

impl CachedKey {
    fn decoding_key(&self) -> Result<DecodingKey> {
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| Error::BadToken(format!("issue building public key: {e}")))
    }
}

/// Resolve the public key for a parsed token header and claims.
///
/// # Errors
///
/// Returns `Error::BadToken` when the header carries no usable key
/// identifier, the JWKS has no matching key, or the matching key cannot be
/// turned into an RSA public key; `Error::UntrustedIssuer` when the `iss`
/// claim is not recognised or the JWKS cannot be retrieved.
pub async fn resolve(
    provider: &impl Provider, header: &jsonwebtoken::Header, claims: &TokenClaims,
) -> Result<DecodingKey> {
    let Some(ident) = key_identifier(header) else {
        return Err(Error::BadToken("token header carries no key identifier".into()));
    };

    // cache lookup precedes any network fetch
    if let Some(cached) = state::peek::<CachedKey>(provider, Family::PublicKey, &ident).await? {
        return cached.decoding_key();
    }

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;

    let Some(issuer) = claims.iss.as_deref() else {
        return Err(Error::UntrustedIssuer("token carries no issuer".into()));
    };
    let trusted = issuer.starts_with(&broker.host)
        || broker.token_issuers.iter().any(|candidate| issuer == candidate);
    if !trusted {
        return Err(Error::UntrustedIssuer(format!("unrecognised issuer: {issuer}")));
    }

    let jwks = Gateway::jwks(provider, &broker)
        .await
        .map_err(|e| Error::UntrustedIssuer(format!("issue retrieving JWKS: {e}")))?;
    if jwks.keys.is_empty() {
        return Err(Error::UntrustedIssuer("JWKS document is empty".into()));
    }

    let Some(jwk) = jwks.keys.iter().find(|jwk| matches(jwk, &ident)) else {
        return Err(Error::BadToken(format!("no JWKS entry for key: {ident}")));
    };
    let cached = components(jwk)?;

    state::put(provider, Family::PublicKey, &ident, &cached).await?;
    cached.decoding_key()
}

/// Extract the key identifier from a token header: `kid` with any trailing
/// algorithm name stripped, else the `x5t` thumbprint.
fn key_identifier(header: &jsonwebtoken::Header) -> Option<String> {
    let ident = if let Some(kid) = &header.kid {
        let alg = format!("{:?}", header.alg);
        kid.strip_suffix(&alg).unwrap_or(kid).trim().to_string()
    } else {
        header.x5t.clone().unwrap_or_default()
    };
    if ident.is_empty() { None } else { Some(ident) }
}

fn matches(jwk: &Jwk, ident: &str) -> bool {
    jwk.common.key_id.as_deref() == Some(ident)
        || jwk.common.x509_sha1_fingerprint.as_deref() == Some(ident)
}

/// RSA components from a JWK: directly from `n`/`e` when present, otherwise
/// from the first certificate of its `x5c` chain.
fn components(jwk: &Jwk) -> Result<CachedKey> {
    if let AlgorithmParameters::RSA(rsa) = &jwk.algorithm {
        return Ok(CachedKey {
            n: rsa.n.clone(),
            e: rsa.e.clone(),
        });
    }

    let Some(chain) = &jwk.common.x509_chain else {
        return Err(Error::BadToken("JWKS entry carries no RSA key or certificate".into()));
    };
    let Some(head) = chain.first() else {
        return Err(Error::BadToken("JWKS entry carries an empty certificate chain".into()));
    };

    let der = Base64::decode_vec(head)
        .map_err(|e| Error::BadToken(format!("issue decoding certificate: {e}")))?;
    let (_, certificate) = X509Certificate::from_der(&der)
        .map_err(|e| Error::BadToken(format!("issue parsing certificate: {e:?}")))?;
    let key = certificate
        .public_key()
        .parsed()
        .map_err(|e| Error::BadToken(format!("issue reading certificate key: {e}")))?;
    let PublicKey::RSA(rsa) = key else {
        return Err(Error::BadToken("certificate key is not RSA".into()));
    };

    Ok(CachedKey {
        n: Base64UrlUnpadded::encode_string(strip_leading_zeros(rsa.modulus)),
        e: Base64UrlUnpadded::encode_string(strip_leading_zeros(rsa.exponent)),
    })
}

// DER integers are signed, so unsigned values may carry a leading zero
// octet that must not reach the JWK component encoding.
fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len().saturating_sub(1));
    &bytes[start..]
}
