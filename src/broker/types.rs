//! # Broker Types
//!
//! Data model for the issuance, verification, and revocation flows: the
//! closed credential-type set, caller-supplied credential and identity data,
//! signed-envelope wrappers, persisted credential metadata, modification
//! records, token claims, and the request/response types processed by
//! [`endpoint::handle`](crate::broker::endpoint::handle).

use std::fmt::{self, Display};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::broker::Result;
use crate::invalid;

/// The closed set of credential types the broker issues and revokes.
///
/// Each type derives three wire strings: a display name used when persisting
/// metadata, an issuance scope carrying the `issue.` prefix, and a template
/// name (no prefix) used by the revocation endpoint. The type of a credential
/// never changes over its lifetime.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    /// Membership of a training programme.
    TrainingProgramme,

    /// A clinical training placement.
    TrainingPlacement,
}

impl CredentialType {
    /// Display name, as persisted in credential metadata.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::TrainingProgramme => "TRAINING_PROGRAMME",
            Self::TrainingPlacement => "TRAINING_PLACEMENT",
        }
    }

    /// Template name used by the gateway's revocation endpoint.
    #[must_use]
    pub const fn template_name(self) -> &'static str {
        match self {
            Self::TrainingProgramme => "TrainingProgramme",
            Self::TrainingPlacement => "TrainingPlacement",
        }
    }

    /// Issuance scope requested from the gateway.
    #[must_use]
    pub const fn issuance_scope(self) -> &'static str {
        match self {
            Self::TrainingProgramme => "issue.TrainingProgramme",
            Self::TrainingPlacement => "issue.TrainingPlacement",
        }
    }
}

impl Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Input to credential issuance: a tagged variant over the programme and
/// placement shapes.
///
/// The discriminator is carried by the request path, so the wire form is the
/// bare field set of each variant. Deserialisation tries the placement shape
/// first (its required field set is the superset).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CredentialData {
    /// A training placement.
    Placement(PlacementData),

    /// A training programme membership.
    Programme(ProgrammeData),
}

impl CredentialData {
    /// The credential type of this data.
    #[must_use]
    pub const fn credential_type(&self) -> CredentialType {
        match self {
            Self::Placement(_) => CredentialType::TrainingPlacement,
            Self::Programme(_) => CredentialType::TrainingProgramme,
        }
    }

    /// The upstream record identifier the credential describes.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Placement(placement) => &placement.tis_id,
            Self::Programme(programme) => &programme.tis_id,
        }
    }

    /// Check required fields are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` naming the first missing field.
    pub fn verify(&self) -> Result<()> {
        match self {
            Self::Placement(placement) => placement.verify(),
            Self::Programme(programme) => programme.verify(),
        }
    }
}

/// Programme-membership credential data.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammeData {
    /// Upstream record identifier.
    pub tis_id: String,

    /// Name of the training programme.
    pub programme_name: String,

    /// First day of programme membership.
    pub start_date: NaiveDate,

    /// Last day of programme membership.
    pub end_date: NaiveDate,
}

impl ProgrammeData {
    fn verify(&self) -> Result<()> {
        for (field, value) in [("tisId", &self.tis_id), ("programmeName", &self.programme_name)] {
            if value.trim().is_empty() {
                return Err(invalid!("`{field}` is required"));
            }
        }
        Ok(())
    }
}

/// Placement credential data.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementData {
    /// Upstream record identifier.
    pub tis_id: String,

    /// Placement specialty.
    pub specialty: String,

    /// Training grade.
    pub grade: String,

    /// National post number. Optional, reserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_post_number: Option<String>,

    /// The employing body for the post.
    pub employing_body: String,

    /// The placement site.
    pub site: String,

    /// First day of the placement.
    pub start_date: NaiveDate,

    /// Last day of the placement.
    pub end_date: NaiveDate,
}

impl PlacementData {
    fn verify(&self) -> Result<()> {
        for (field, value) in [
            ("tisId", &self.tis_id),
            ("specialty", &self.specialty),
            ("grade", &self.grade),
            ("employingBody", &self.employing_body),
            ("site", &self.site),
        ] {
            if value.trim().is_empty() {
                return Err(invalid!("`{field}` is required"));
            }
        }
        Ok(())
    }
}

/// Identity data captured at the start of identity verification.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityData {
    /// Legal forenames.
    pub forenames: String,

    /// Legal surname.
    pub surname: String,

    /// Date of birth (ISO date).
    pub date_of_birth: NaiveDate,
}

impl IdentityData {
    /// Check required fields are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` naming the first missing field.
    pub fn verify(&self) -> Result<()> {
        for (field, value) in [("forenames", &self.forenames), ("surname", &self.surname)] {
            if value.trim().is_empty() {
                return Err(invalid!("`{field}` is required"));
            }
        }
        Ok(())
    }
}

/// A payload wrapped with an HMAC envelope signature.
///
/// The signature covers the canonical serialisation of the payload together
/// with the signing window, under the shared envelope secret.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SignedEnvelope<T> {
    /// The signed payload, flattened alongside the signature block on the
    /// wire.
    #[serde(flatten)]
    pub data: T,

    /// The envelope signature block.
    pub signature: EnvelopeSignature,
}

/// Signature block of a [`SignedEnvelope`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSignature {
    /// When the payload was signed. Must not be in the future.
    pub signed_at: DateTime<Utc>,

    /// When the signature ceases to be acceptable. Must be in the future.
    pub valid_until: DateTime<Utc>,

    /// Base64 HMAC-SHA256 over the canonical payload serialisation.
    pub hmac: String,
}

/// Persisted metadata for an issued credential.
///
/// The gateway owns the credential serial number; the broker records it as
/// the primary key. Rows are stamped `revoked_at` rather than deleted so
/// revocation history is retained.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    /// Serial number assigned by the gateway.
    pub credential_id: String,

    /// The trainee the credential was issued to.
    pub subject_id: String,

    /// The upstream record the credential describes.
    pub entity_id: String,

    /// Credential type, serialised as its display name.
    pub credential_type: CredentialType,

    /// When the credential was issued. Absent only on legacy rows; listing
    /// treats absence as a data-integrity error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,

    /// When the credential expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// When the credential was revoked, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl CredentialMetadata {
    /// Whether the credential has been revoked.
    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// A record of the latest upstream modification for an entity/type pair.
///
/// Writes replace earlier records for the same key; the newest
/// `last_modified_at` wins by write order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRecord {
    /// Upstream record identifier.
    pub entity_id: String,

    /// Credential type the modification applies to.
    pub credential_type: CredentialType,

    /// When the upstream record last changed.
    pub last_modified_at: DateTime<Utc>,

    /// MD5 content fingerprint computed from update events. Carried for
    /// future use; does not gate revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// An instant that may arrive as epoch seconds or as a stringified number.
///
/// Gateway tokens are inconsistent about `iat`/`exp` typing; both forms are
/// accepted. Outbound tokens always serialise the numeric form.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Epoch {
    /// Epoch seconds as a JSON number.
    Number(i64),

    /// Epoch seconds as a JSON string.
    Text(String),
}

impl Epoch {
    /// The instant this epoch value denotes, if it parses.
    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = match self {
            Self::Number(secs) => *secs,
            Self::Text(text) => text.trim().parse().ok()?,
        };
        DateTime::from_timestamp(secs, 0)
    }
}

impl From<DateTime<Utc>> for Epoch {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Number(value.timestamp())
    }
}

/// Claims carried by tokens exchanged with the gateway.
///
/// Only the claims the broker consumes are typed; everything else is
/// retained in `additional`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TokenClaims {
    /// Token issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Nonce binding the token to a flow's start leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Credential serial number assigned by the gateway.
    #[serde(rename = "SerialNumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// Issued-at, epoch seconds (number or string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<Epoch>,

    /// Not-before, epoch seconds (number or string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<Epoch>,

    /// Expiry, epoch seconds (number or string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<Epoch>,

    /// The caller's session identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_jti: Option<String>,

    /// The trainee identifier asserted by the caller's bearer token.
    #[serde(rename = "custom:tisId", skip_serializing_if = "Option::is_none")]
    pub tis_id: Option<String>,

    /// Verified legal first name.
    #[serde(rename = "Identity.ID-LegalFirstName", skip_serializing_if = "Option::is_none")]
    pub legal_first_name: Option<String>,

    /// Verified legal surname.
    #[serde(rename = "Identity.ID-LegalSurname", skip_serializing_if = "Option::is_none")]
    pub legal_surname: Option<String>,

    /// Verified date of birth.
    #[serde(rename = "Identity.ID-BirthDate", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    /// Any further claims.
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

/// Broker configuration, supplied by the
/// [`Metadata`](crate::broker::provider::Metadata) provider.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Broker {
    /// Gateway host, used to validate token issuers.
    pub host: String,

    /// OAuth client identifier registered with the gateway.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// Organisation identifier sent with revocation requests.
    pub organisation_id: String,

    /// Pushed Authorization Request endpoint.
    pub par_endpoint: String,

    /// Authorization endpoint.
    pub authorize_endpoint: String,

    /// Token endpoint.
    pub token_endpoint: String,

    /// JWKS document endpoint.
    pub jwks_endpoint: String,

    /// Credential revocation endpoint.
    pub revoke_endpoint: String,

    /// Redirect URI registered for the identity-verification flow.
    pub verify_redirect_uri: String,

    /// Redirect URI registered for the issuance flow.
    pub issue_redirect_uri: String,

    /// Trusted token issuers, in addition to `host`.
    #[serde(default)]
    pub token_issuers: Vec<String>,

    /// Outbound token signing parameters.
    pub signing: Signing,

    /// Shared secret for signed-envelope admission.
    pub envelope_secret: String,
}

/// Parameters for signing outbound credential-data tokens.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Signing {
    /// Base64-encoded HMAC-SHA256 key shared with the gateway.
    pub secret: String,

    /// `iss` claim for outbound tokens.
    pub issuer: String,

    /// `aud` claim for outbound tokens.
    pub audience: String,

    /// Override lifetime, in days, for programme tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub programme_lifetime_days: Option<i64>,

    /// Override lifetime, in days, for placement tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_lifetime_days: Option<i64>,
}

const DEFAULT_LIFETIME_DAYS: i64 = 30;

impl Signing {
    /// Token lifetime for a credential type. Defaults to 30 days.
    #[must_use]
    pub fn lifetime(&self, credential_type: CredentialType) -> Duration {
        let days = match credential_type {
            CredentialType::TrainingProgramme => self.programme_lifetime_days,
            CredentialType::TrainingPlacement => self.placement_lifetime_days,
        };
        Duration::days(days.unwrap_or(DEFAULT_LIFETIME_DAYS))
    }
}

// --- requests and responses -------------------------------------------------

/// Headers carrying the caller's bearer token.
#[derive(Clone, Debug, Default)]
pub struct BearerHeaders {
    /// The `Authorization` header value, with or without a `Bearer ` prefix.
    /// Empty when the header was absent.
    pub authorization: String,
}

/// `POST /api/verify/identity`: start identity verification.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VerifyIdentityRequest {
    /// Signed identity data to verify against the gateway's identity proof.
    #[serde(flatten)]
    pub identity: SignedEnvelope<IdentityData>,

    /// Opaque client state echoed on the final redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_state: Option<String>,
}

/// `GET /api/verify/callback`: gateway redirect completing identity
/// verification.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VerifyCallbackRequest {
    /// Authorization code.
    pub code: Option<String>,

    /// Granted scope.
    pub scope: Option<String>,

    /// The `state` issued at flow start.
    pub state: String,
}

/// `POST /api/issue/programme-membership` and `POST /api/issue/placement`:
/// start credential issuance.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IssueCredentialRequest {
    /// Signed credential data to issue.
    #[serde(flatten)]
    pub credential: SignedEnvelope<CredentialData>,

    /// Opaque client state echoed on the final redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_state: Option<String>,
}

/// `GET /api/issue/callback`: gateway redirect completing issuance.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IssueCallbackRequest {
    /// Authorization code. Absent when the gateway reports an error.
    pub code: Option<String>,

    /// The `state` issued at flow start.
    pub state: String,

    /// Error code relayed by the gateway.
    pub error: Option<String>,

    /// Error description relayed by the gateway.
    pub error_description: Option<String>,
}

/// `GET /api/programme-membership` and `GET /api/placement`: list the
/// caller's latest issued credentials.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct LatestCredentialsRequest {
    /// The credential type to list.
    pub credential_type: CredentialType,
}

/// Response to [`LatestCredentialsRequest`]: one non-revoked credential per
/// distinct entity.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LatestCredentialsResponse {
    /// The latest credential for each entity.
    pub credentials: Vec<CredentialMetadata>,
}

/// A `302 Found` redirect.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Redirect {
    /// The redirect target.
    pub location: String,
}

impl Redirect {
    /// Redirect to `base` with the given query parameters appended.
    #[must_use]
    pub fn with_query(base: &str, pairs: &[(&str, &str)]) -> Self {
        Self {
            location: crate::core::urlencode::with_query(base, pairs),
        }
    }
}

/// Response to an issuance start: `201 Created` whose `Location` carries the
/// authorize URL. The location is empty when the PAR leg failed.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct IssueStartResponse {
    /// Authorize URL carrying the pushed `request_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// --- queue events -----------------------------------------------------------

/// A record-deleted event consumed from the delete queues.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDeleteEvent {
    /// The deleted record's identifier.
    pub tis_id: String,
}

/// A record-updated event consumed from the update queues.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RecordUpdateEvent {
    /// The updated record's identifier.
    #[serde(rename = "tisId")]
    pub tis_id: String,

    /// The updated record content. The field name matches the upstream wire
    /// format.
    #[serde(rename = "recrd")]
    pub record: RecordEnvelope,
}

/// Envelope around an updated record's fields.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RecordEnvelope {
    /// The record's fields.
    pub data: Map<String, Value>,
}
