//! # Broker Errors
//!
//! Typed errors for the issuance, verification, and revocation flows. Each
//! variant maps to an HTTP status via [`Error::status`]; the Display form is
//! an OAuth-style JSON body.
//!
//! Stale-data outcomes are not errors: they travel as query parameters on
//! the final redirect of the issuance flow.

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Errors surfaced by broker handlers.
#[derive(Error, Debug, Deserialize)]
pub enum Error {
    /// Malformed input: missing required header, field, or claim.
    #[error(r#"{{"error": "bad_request", "error_description": "{0}"}}"#)]
    BadRequest(String),

    /// The caller has no verified session. Surfaced as `401` with a
    /// `WWW-Authenticate` challenge naming the identity-verification
    /// endpoint.
    #[error(r#"{{"error": "unauthorized", "error_description": "{0}"}}"#)]
    Unauthorized(String),

    /// Envelope signature invalid, or the signed payload is older than the
    /// latest recorded modification.
    #[error(r#"{{"error": "forbidden", "error_description": "{0}"}}"#)]
    Forbidden(String),

    /// A token could not be trusted: no key identifier, no matching JWKS
    /// entry, or signature mismatch.
    #[error(r#"{{"error": "bad_token", "error_description": "{0}"}}"#)]
    BadToken(String),

    /// The token's `iss` claim names an unrecognised issuer.
    #[error(r#"{{"error": "untrusted_issuer", "error_description": "{0}"}}"#)]
    UntrustedIssuer(String),

    /// A record exists but is missing data it must have.
    #[error(r#"{{"error": "not_found", "error_description": "{0}"}}"#)]
    NotFound(String),

    /// The gateway returned a non-success status where one was required.
    #[error(r#"{{"error": "gateway_failure", "error_description": "{0}"}}"#)]
    GatewayFailure(String),

    /// An unexpected condition prevented the broker from completing the
    /// request.
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    ServerError(String),
}

/// Challenge sent with `401` responses that require identity verification.
pub const WWW_AUTHENTICATE: &str = r#"IdentityVerification realm="/api/verify/identity""#;

impl Error {
    /// The HTTP status this error surfaces as.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) | Self::BadToken(_) | Self::UntrustedIssuer(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::GatewayFailure(_) | Self::ServerError(_) => 500,
        }
    }

    /// Transform the error to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.to_string()).unwrap_or_default()
    }
}

/// Error body shape shared by all variants.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    error: String,
    error_description: String,
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as SerdeError;

        let Ok(body) = serde_json::from_str::<ErrorBody>(&self.to_string()) else {
            return Err(SerdeError::custom("issue deserializing Error"));
        };
        body.serialize(serializer)
    }
}

/// Construct an `Error::BadRequest` from a format string.
#[macro_export]
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::broker::Error::BadRequest(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::broker::Error::BadRequest(format!($err))
    };
}

/// Construct an `Error::Forbidden` from a format string.
#[macro_export]
macro_rules! forbidden {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::broker::Error::Forbidden(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::broker::Error::Forbidden(format!($err))
    };
}

/// Construct an `Error::ServerError` from a format string.
#[macro_export]
macro_rules! server {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::broker::Error::ServerError(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::broker::Error::ServerError(format!($err))
    };
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn err_json() {
        let err = forbidden!("signature mismatch");
        let ser: Value = serde_json::from_str(&err.to_string()).unwrap();
        assert_eq!(
            ser,
            json!({"error": "forbidden", "error_description": "signature mismatch"})
        );
    }

    #[test]
    fn err_status() {
        assert_eq!(invalid!("missing field").status(), 400);
        assert_eq!(Error::Unauthorized("no session".into()).status(), 401);
        assert_eq!(Error::BadToken("no key id".into()).status(), 401);
        assert_eq!(forbidden!("stale").status(), 403);
        assert_eq!(Error::GatewayFailure("502".into()).status(), 500);
    }

    #[test]
    fn err_serialize() {
        let err = Error::UntrustedIssuer("unknown host".into());
        let ser = serde_json::to_value(&err).unwrap();
        assert_eq!(
            ser,
            json!({"error": "untrusted_issuer", "error_description": "unknown host"})
        );
    }
}
