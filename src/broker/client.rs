//! # Client
//!
//! Builders for the signed payloads the broker admits. Downstream clients
//! (and the test-suite) use these to produce envelopes whose HMAC matches
//! the broker's canonicalisation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::broker::Result;
use crate::broker::gate;
use crate::broker::types::{
    CredentialData, EnvelopeSignature, IdentityData, IssueCredentialRequest, SignedEnvelope,
    VerifyIdentityRequest,
};

/// Build a [`SignedEnvelope`] around a payload.
#[derive(Clone, Debug)]
pub struct SignedEnvelopeBuilder<T> {
    data: T,
    secret: String,
    signed_at: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
}

impl<T: Serialize> SignedEnvelopeBuilder<T> {
    /// Create a builder for a payload, sealing with the given shared secret.
    pub fn new(data: T, secret: impl Into<String>) -> Self {
        Self {
            data,
            secret: secret.into(),
            signed_at: None,
            valid_until: None,
        }
    }

    /// Specify the signing instant. Defaults to now.
    #[must_use]
    pub fn signed_at(mut self, signed_at: DateTime<Utc>) -> Self {
        self.signed_at = Some(signed_at);
        self
    }

    /// Specify the end of the signature's validity window. Defaults to one
    /// day after the signing instant.
    #[must_use]
    pub fn valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    /// Seal the payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::ServerError` when the payload cannot be serialised.
    pub fn build(self) -> Result<SignedEnvelope<T>> {
        let signed_at = self.signed_at.unwrap_or_else(Utc::now);
        let valid_until = self.valid_until.unwrap_or(signed_at + Duration::days(1));
        let hmac = gate::digest(&self.data, signed_at, valid_until, &self.secret)?;

        Ok(SignedEnvelope {
            data: self.data,
            signature: EnvelopeSignature {
                signed_at,
                valid_until,
                hmac,
            },
        })
    }
}

/// Build a [`VerifyIdentityRequest`] with a correctly sealed envelope.
#[derive(Clone, Debug)]
pub struct VerifyIdentityRequestBuilder {
    envelope: SignedEnvelopeBuilder<IdentityData>,
    client_state: Option<String>,
}

impl VerifyIdentityRequestBuilder {
    /// Create a builder for the given identity data and envelope secret.
    pub fn new(identity: IdentityData, secret: impl Into<String>) -> Self {
        Self {
            envelope: SignedEnvelopeBuilder::new(identity, secret),
            client_state: None,
        }
    }

    /// Specify the signing instant. Defaults to now.
    #[must_use]
    pub fn signed_at(mut self, signed_at: DateTime<Utc>) -> Self {
        self.envelope = self.envelope.signed_at(signed_at);
        self
    }

    /// Attach opaque client state to echo on the final redirect.
    #[must_use]
    pub fn client_state(mut self, client_state: impl Into<String>) -> Self {
        self.client_state = Some(client_state.into());
        self
    }

    /// Build the request.
    ///
    /// # Errors
    ///
    /// Returns `Error::ServerError` when the payload cannot be serialised.
    pub fn build(self) -> Result<VerifyIdentityRequest> {
        Ok(VerifyIdentityRequest {
            identity: self.envelope.build()?,
            client_state: self.client_state,
        })
    }
}

/// Build an [`IssueCredentialRequest`] with a correctly sealed envelope.
#[derive(Clone, Debug)]
pub struct IssueCredentialRequestBuilder {
    envelope: SignedEnvelopeBuilder<CredentialData>,
    client_state: Option<String>,
}

impl IssueCredentialRequestBuilder {
    /// Create a builder for the given credential data and envelope secret.
    pub fn new(credential: CredentialData, secret: impl Into<String>) -> Self {
        Self {
            envelope: SignedEnvelopeBuilder::new(credential, secret),
            client_state: None,
        }
    }

    /// Specify the signing instant. Defaults to now.
    #[must_use]
    pub fn signed_at(mut self, signed_at: DateTime<Utc>) -> Self {
        self.envelope = self.envelope.signed_at(signed_at);
        self
    }

    /// Attach opaque client state to echo on the final redirect.
    #[must_use]
    pub fn client_state(mut self, client_state: impl Into<String>) -> Self {
        self.client_state = Some(client_state.into());
        self
    }

    /// Build the request.
    ///
    /// # Errors
    ///
    /// Returns `Error::ServerError` when the payload cannot be serialised.
    pub fn build(self) -> Result<IssueCredentialRequest> {
        Ok(IssueCredentialRequest {
            credential: self.envelope.build()?,
            client_state: self.client_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const SECRET: &str = "an envelope sealing secret";

    #[test]
    fn builder_output_is_admissible() {
        let identity = IdentityData {
            forenames: "Anthony".into(),
            surname: "Gilliam".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 11, 11).unwrap(),
        };
        let envelope =
            SignedEnvelopeBuilder::new(identity, SECRET).build().expect("should build");
        gate::verify_envelope(&envelope, SECRET, Utc::now()).expect("should admit");
    }

    #[test]
    fn validity_window_defaults_to_one_day() {
        let identity = IdentityData::default();
        let signed_at = Utc::now();
        let envelope = SignedEnvelopeBuilder::new(identity, SECRET)
            .signed_at(signed_at)
            .build()
            .expect("should build");
        assert_eq!(envelope.signature.valid_until, signed_at + Duration::days(1));
    }
}
