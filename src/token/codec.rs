//! # JWT Codec
//!
//! Signs outbound credential-data tokens and parses inbound tokens.
//!
//! Outbound tokens are HMAC-SHA256 signed with the base64-encoded key shared
//! with the gateway, and carry the credential's wire claims together with
//! the constant assurance-metadata block. Inbound tokens are parsed either
//! unverified (where the surrounding infrastructure supplies trust, e.g.
//! claims of the caller's own bearer token) or verified against the
//! gateway's JWKS via [`keys::resolve`](crate::token::keys::resolve).

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

use crate::broker::provider::{Clock, Provider};
use crate::broker::types::{CredentialData, Signing, TokenClaims};
use crate::broker::{Error, Result};

// Constant assurance metadata carried by every outbound credential token.
const ORIGIN: &str = "NHS England";
const ASSURANCE_POLICY: &str = "TIS Record Assurance";
const ASSURANCE_OUTCOME: &str = "Verified";
const PROVIDER: &str = "Health Education England";
const VERIFIER: &str = "Technology Enhanced Learning";
const VERIFICATION_METHOD: &str = "Record Verification";
const PEDIGREE: &str = "Authoritative";

/// Sign credential data as a JWT for use as the PAR `id_token_hint`.
///
/// Standard claims are `aud`, `iss`, `iat`, `nbf` (both `now`), and `exp`
/// (`now` plus the type-specific lifetime), all epoch seconds as numbers.
///
/// # Errors
///
/// Returns `Error::ServerError` when the signing key is malformed or signing
/// fails.
pub fn sign(
    signing: &Signing, credential: &CredentialData, now: DateTime<Utc>,
) -> Result<String> {
    let expires = now + signing.lifetime(credential.credential_type());

    let mut claims = Map::new();
    claims.insert("aud".into(), Value::from(signing.audience.clone()));
    claims.insert("iss".into(), Value::from(signing.issuer.clone()));
    claims.insert("iat".into(), Value::from(now.timestamp()));
    claims.insert("nbf".into(), Value::from(now.timestamp()));
    claims.insert("exp".into(), Value::from(expires.timestamp()));

    for (name, value) in credential_claims(credential) {
        claims.insert(name.into(), Value::from(value));
    }
    for (name, value) in metadata_claims(now) {
        claims.insert(name.into(), Value::from(value));
    }

    let key = EncodingKey::from_base64_secret(&signing.secret)
        .map_err(|e| Error::ServerError(format!("issue reading signing key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|e| Error::ServerError(format!("issue signing token: {e}")))
}

/// The wire claims derived from credential data.
fn credential_claims(credential: &CredentialData) -> Vec<(&'static str, String)> {
    match credential {
        CredentialData::Programme(programme) => vec![
            ("TPR-Name", programme.programme_name.clone()),
            ("TPR-ProgrammeStartDate", programme.start_date.to_string()),
            ("TPR-ProgrammeEndDate", programme.end_date.to_string()),
        ],
        CredentialData::Placement(placement) => {
            let mut claims = vec![
                ("TPL-Specialty", placement.specialty.clone()),
                ("TPL-Grade", placement.grade.clone()),
                ("TPL-EmployingBodyOfPost", placement.employing_body.clone()),
                ("TPL-Site", placement.site.clone()),
                ("TPL-PlacementStartDate", placement.start_date.to_string()),
                ("TPL-PlacementEndDate", placement.end_date.to_string()),
            ];
            if let Some(npn) = &placement.national_post_number {
                claims.push(("TPL-PlacementNPN", npn.clone()));
            }
            claims
        }
    }
}

/// The constant assurance-metadata block. `LastRefresh` is the signing day.
fn metadata_claims(now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("Origin", ORIGIN.into()),
        ("AssurancePolicy", ASSURANCE_POLICY.into()),
        ("AssuranceOutcome", ASSURANCE_OUTCOME.into()),
        ("Provider", PROVIDER.into()),
        ("Verifier", VERIFIER.into()),
        ("VerificationMethod", VERIFICATION_METHOD.into()),
        ("Pedigree", PEDIGREE.into()),
        ("LastRefresh", now.date_naive().to_string()),
    ]
}

/// Strip an optional `Bearer ` prefix from a token.
#[must_use]
pub fn strip_bearer(token: &str) -> &str {
    token.trim().strip_prefix("Bearer ").unwrap_or(token.trim()).trim()
}

/// Parse a token's claims without verifying its signature.
///
/// Used to retrieve correlation keys from tokens whose trust is supplied by
/// the surrounding infrastructure.
///
/// # Errors
///
/// Returns `Error::BadToken` when the token is not three base64url segments
/// of JSON.
pub fn parse_unverified(token: &str) -> Result<TokenClaims> {
    let token = strip_bearer(token);
    let mut segments = token.split('.');
    let (Some(_), Some(body)) = (segments.next(), segments.next()) else {
        return Err(Error::BadToken("token is not a JWT".into()));
    };

    let bytes = Base64UrlUnpadded::decode_vec(body)
        .map_err(|e| Error::BadToken(format!("issue decoding claims: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::BadToken(format!("issue deserializing claims: {e}")))
}

/// Parse a token's claims, verifying its signature against the gateway's
/// JWKS and its temporal claims against the clock.
///
/// # Errors
///
/// Returns `Error::BadToken` for malformed tokens, unresolvable keys,
/// signature mismatches, and out-of-window temporal claims;
/// `Error::UntrustedIssuer` when the `iss` claim is not recognised.
pub async fn parse_verified(provider: &impl Provider, token: &str) -> Result<TokenClaims> {
    let token = strip_bearer(token);

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| Error::BadToken(format!("issue reading token header: {e}")))?;
    if !matches!(header.alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
        return Err(Error::BadToken(format!("unsupported algorithm: {:?}", header.alg)));
    }

    // issuer and key id come from the unverified form; nothing is trusted
    // until the signature checks out against the resolved key
    let unverified = parse_unverified(token)?;
    let key = crate::token::keys::resolve(provider, &header, &unverified).await?;

    // `exp`/`nbf` may be strings, which jsonwebtoken cannot validate, so
    // temporal checks are applied below on the parsed claims
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = std::collections::HashSet::new();

    let data = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation)
        .map_err(|e| Error::BadToken(format!("issue verifying token: {e}")))?;
    let claims = data.claims;

    let now = Clock::now(provider);
    if let Some(exp) = claims.exp.as_ref().and_then(|e| e.as_datetime()) {
        if exp <= now {
            return Err(Error::BadToken("token has expired".into()));
        }
    }
    if let Some(nbf) = claims.nbf.as_ref().and_then(|n| n.as_datetime()) {
        if nbf > now {
            return Err(Error::BadToken("token not yet valid".into()));
        }
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use base64ct::Base64;
    use chrono::NaiveDate;

    use super::*;
    use crate::broker::types::PlacementData;

    fn signing() -> Signing {
        Signing {
            secret: Base64::encode_string(b"a shared signing secret"),
            issuer: "https://broker.example.com".into(),
            audience: "https://gateway.example.com".into(),
            ..Signing::default()
        }
    }

    fn placement() -> CredentialData {
        CredentialData::Placement(PlacementData {
            tis_id: "P1".into(),
            specialty: "Cardio".into(),
            grade: "ST3".into(),
            national_post_number: Some("NPN1".into()),
            employing_body: "Trust1".into(),
            site: "Hospital1".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        })
    }

    // Signing then parsing unverified returns every wire claim of the data.
    #[test]
    fn sign_parse_round_trip() {
        let now = Utc::now();
        let token = sign(&signing(), &placement(), now).expect("should sign");
        let claims = parse_unverified(&token).expect("should parse");

        assert_eq!(claims.additional["TPL-Specialty"], "Cardio");
        assert_eq!(claims.additional["TPL-Grade"], "ST3");
        assert_eq!(claims.additional["TPL-PlacementNPN"], "NPN1");
        assert_eq!(claims.additional["TPL-EmployingBodyOfPost"], "Trust1");
        assert_eq!(claims.additional["TPL-Site"], "Hospital1");
        assert_eq!(claims.additional["TPL-PlacementStartDate"], "2024-01-01");
        assert_eq!(claims.additional["TPL-PlacementEndDate"], "2024-06-30");
        assert_eq!(claims.additional["Origin"], ORIGIN);
        assert_eq!(claims.additional["LastRefresh"], now.date_naive().to_string());
    }

    // Outbound temporal claims are numeric epoch seconds with the default
    // 30 day lifetime.
    #[test]
    fn sign_numeric_lifetime() {
        let now = Utc::now();
        let token = sign(&signing(), &placement(), now).expect("should sign");
        let claims = parse_unverified(&token).expect("should parse");

        let iat = claims.iat.expect("should have iat");
        let exp = claims.exp.expect("should have exp");
        assert!(matches!(iat, crate::broker::types::Epoch::Number(_)));
        assert_eq!(
            exp.as_datetime().unwrap() - iat.as_datetime().unwrap(),
            chrono::Duration::days(30)
        );
    }

    #[test]
    fn bearer_prefix_stripped() {
        let token = sign(&signing(), &placement(), Utc::now()).expect("should sign");
        let claims = parse_unverified(&format!("Bearer {token}")).expect("should parse");
        assert_eq!(claims.additional["TPL-Site"], "Hospital1");
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
    }

    #[test]
    fn malformed_token_rejected() {
        let err = parse_unverified("not a token").expect_err("should reject");
        assert_eq!(err.status(), 401);
    }
}
