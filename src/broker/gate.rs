//! # Admission Gates
//!
//! Checks applied before a flow handler runs: the signed-envelope HMAC
//! admission filter, the modification-log freshness cross-check, and the
//! verified-session gate. Handlers wire these into their
//! [`Handler::validate`](crate::broker::endpoint::Handler::validate) hook so
//! a failing request never reaches the flow body.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::broker::provider::{Clock, Metadata, ModificationLog, Provider};
use crate::broker::state::{self, Family};
use crate::broker::types::{CredentialType, SignedEnvelope};
use crate::broker::{Error, Result};
use crate::token::codec;
use crate::{forbidden, invalid, server};

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64 envelope HMAC for a payload and signing window.
///
/// The input is the canonical payload serialisation: a JSON object with
/// keys sorted and no insignificant whitespace, followed by the RFC 3339
/// forms of `signed_at` and `valid_until`.
///
/// # Errors
///
/// Returns `Error::ServerError` when the payload cannot be serialised.
pub fn digest<T: Serialize>(
    data: &T, signed_at: DateTime<Utc>, valid_until: DateTime<Utc>, secret: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| server!("issue keying envelope digest: {e}"))?;
    mac.update(&mac_input(data, signed_at, valid_until)?);
    Ok(Base64::encode_string(&mac.finalize().into_bytes()))
}

/// Verify a signed envelope against the shared secret and the clock.
///
/// # Errors
///
/// Returns `Error::Forbidden` when the signing window is invalid
/// (`signed_at` in the future, `valid_until` not after now, both strict) or
/// the HMAC does not match the payload.
pub fn verify_envelope<T: Serialize>(
    envelope: &SignedEnvelope<T>, secret: &str, now: DateTime<Utc>,
) -> Result<()> {
    let signature = &envelope.signature;
    if signature.signed_at > now {
        return Err(forbidden!("payload signed in the future"));
    }
    if signature.valid_until <= now {
        return Err(forbidden!("signature is no longer valid"));
    }

    let Ok(expected) = Base64::decode_vec(&signature.hmac) else {
        return Err(forbidden!("signature is not valid base64"));
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| server!("issue keying envelope digest: {e}"))?;
    mac.update(&mac_input(&envelope.data, signature.signed_at, signature.valid_until)?);
    mac.verify_slice(&expected).map_err(|_| forbidden!("signature does not match payload"))
}

/// Reject a signed payload when the upstream record changed on or after the
/// signing instant.
///
/// # Errors
///
/// Returns `Error::Forbidden` when the modification log records
/// `last_modified_at ≥ signed_at`.
pub async fn assert_unmodified(
    provider: &impl Provider, entity_id: &str, credential_type: CredentialType,
    signed_at: DateTime<Utc>,
) -> Result<()> {
    let record = ModificationLog::get(provider, entity_id, credential_type)
        .await
        .map_err(|e| server!("issue reading modification log: {e}"))?;

    if let Some(record) = record {
        if record.last_modified_at >= signed_at {
            return Err(forbidden!("data modified since payload was signed"));
        }
    }
    Ok(())
}

/// Whether the caller's session has passed identity verification within the
/// session TTL.
///
/// # Errors
///
/// Returns `Error::BadRequest` when the authorization value is empty and
/// `Error::BadToken` when it is not a parseable token.
pub async fn has_verified_session(provider: &impl Provider, authorization: &str) -> Result<bool> {
    if authorization.trim().is_empty() {
        return Err(invalid!("missing authorization"));
    }
    let claims = codec::parse_unverified(authorization)?;
    let Some(session) = claims.origin_jti else {
        return Ok(false);
    };

    let verified: Option<String> =
        state::peek(provider, Family::VerifiedSession, &session).await?;
    Ok(verified.is_some())
}

/// Require a verified session for the caller.
///
/// # Errors
///
/// Returns `Error::Unauthorized` when the session has not passed identity
/// verification; transports attach the `WWW-Authenticate` challenge.
pub async fn assert_verified_session(
    provider: &impl Provider, authorization: &str,
) -> Result<()> {
    if has_verified_session(provider, authorization).await? {
        return Ok(());
    }
    Err(Error::Unauthorized("caller identity has not been verified".into()))
}

/// Verify an envelope with the configured secret.
///
/// # Errors
///
/// As [`verify_envelope`]; additionally `Error::ServerError` when broker
/// metadata cannot be read.
pub async fn admit<T: Serialize>(
    provider: &impl Provider, envelope: &SignedEnvelope<T>,
) -> Result<()> {
    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;
    verify_envelope(envelope, &broker.envelope_secret, Clock::now(provider))
}

fn mac_input<T: Serialize>(
    data: &T, signed_at: DateTime<Utc>, valid_until: DateTime<Utc>,
) -> Result<Vec<u8>> {
    // serde_json orders object keys, giving the canonical form
    let value =
        serde_json::to_value(data).map_err(|e| server!("issue serializing payload: {e}"))?;
    let mut bytes =
        serde_json::to_vec(&value).map_err(|e| server!("issue serializing payload: {e}"))?;
    bytes.extend_from_slice(timestamp(signed_at).as_bytes());
    bytes.extend_from_slice(timestamp(valid_until).as_bytes());
    Ok(bytes)
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
