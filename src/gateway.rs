//! # Gateway Client
//!
//! The wire protocol spoken to the external credential gateway: Pushed
//! Authorization Requests, authorization-code token exchange, credential
//! revocation, and JWKS retrieval.
//!
//! [`HttpGateway`] implements the [`Gateway`](crate::broker::provider::Gateway)
//! provider trait over HTTP. Requests are stateless; retry policy is the
//! caller's concern, composed on the returned error.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use crate::broker::provider::Gateway;
use crate::broker::types::Broker;

/// Reason sent with every revocation request.
const REVOCATION_REASON: &str = "The source data is no longer valid.";

/// Default deadline applied to each gateway call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A Pushed Authorization Request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParRequest {
    /// Issuance scope for the credential being requested.
    pub scope: String,

    /// Signed JWT of the credential data.
    pub id_token_hint: String,

    /// Nonce binding the pushed request to the issuance flow.
    pub nonce: String,

    /// State correlating the authorize callback with the flow.
    pub state: String,
}

/// Response to a successful Pushed Authorization Request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ParResponse {
    /// Opaque reference to the pushed request, used at the authorize
    /// endpoint.
    pub request_uri: String,
}

/// An authorization-code token exchange.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenRequest {
    /// The authorization code returned by the gateway callback.
    pub code: String,

    /// PKCE code verifier, present for flows started with a code challenge.
    pub code_verifier: Option<String>,

    /// The redirect URI registered for the flow.
    pub redirect_uri: String,

    /// Fresh random state for the exchange leg.
    pub state: String,
}

/// Response to a successful token exchange.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TokenResponse {
    /// The signed ID token.
    pub id_token: String,
}

/// A credential revocation request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RevokeRequest {
    /// Template name of the credential type being revoked.
    pub credential_template_name: String,

    /// Serial number of the credential to revoke.
    pub serial_number: String,
}

/// Wire body of a revocation request.
#[derive(Serialize)]
struct RevokeBody<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(rename = "OrganisationId")]
    organisation_id: &'a str,
    #[serde(rename = "CredentialTemplateName")]
    credential_template_name: &'a str,
    #[serde(rename = "SerialNumber")]
    serial_number: &'a str,
    #[serde(rename = "RevocationReason")]
    revocation_reason: &'a str,
}

/// HTTP implementation of the [`Gateway`] provider trait.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway client with the default 10 second deadline.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a gateway client with a custom per-call deadline.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("issue building HTTP client")?;
        Ok(Self { client })
    }
}

impl Gateway for HttpGateway {
    async fn par(&self, broker: &Broker, request: &ParRequest) -> Result<ParResponse> {
        let form = [
            ("client_id", broker.client_id.as_str()),
            ("client_secret", broker.client_secret.as_str()),
            ("redirect_uri", broker.issue_redirect_uri.as_str()),
            ("scope", request.scope.as_str()),
            ("id_token_hint", request.id_token_hint.as_str()),
            ("nonce", request.nonce.as_str()),
            ("state", request.state.as_str()),
        ];

        let response = self
            .client
            .post(&broker.par_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .context("issue sending PAR request")?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            bail!("unexpected PAR response status: {status}");
        }

        let par: ParResponse = response.json().await.context("issue reading PAR response")?;
        if par.request_uri.is_empty() {
            bail!("PAR response contained no request_uri");
        }
        Ok(par)
    }

    async fn exchange(&self, broker: &Broker, request: &TokenRequest) -> Result<TokenResponse> {
        let mut form = vec![
            ("client_id", broker.client_id.as_str()),
            ("client_secret", broker.client_secret.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("state", request.state.as_str()),
        ];
        if let Some(verifier) = &request.code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }

        let response = self
            .client
            .post(&broker.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .context("issue sending token request")?;

        let status = response.status();
        if !status.is_success() {
            bail!("unexpected token response status: {status}");
        }

        let token: TokenResponse =
            response.json().await.context("issue reading token response")?;
        if token.id_token.is_empty() {
            bail!("token response contained no id_token");
        }
        Ok(token)
    }

    async fn revoke(&self, broker: &Broker, request: &RevokeRequest) -> Result<()> {
        let body = RevokeBody {
            client_id: &broker.client_id,
            client_secret: &broker.client_secret,
            organisation_id: &broker.organisation_id,
            credential_template_name: &request.credential_template_name,
            serial_number: &request.serial_number,
            revocation_reason: REVOCATION_REASON,
        };

        let response = self
            .client
            .post(&broker.revoke_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .context("issue sending revocation request")?;

        let status = response.status();
        if !status.is_success() {
            bail!("revocation failed with status {status}");
        }
        Ok(())
    }

    async fn jwks(&self, broker: &Broker) -> Result<JwkSet> {
        let response = self
            .client
            .get(&broker.jwks_endpoint)
            .send()
            .await
            .context("issue fetching JWKS document")?;

        let status = response.status();
        if !status.is_success() {
            bail!("unexpected JWKS response status: {status}");
        }
        response.json().await.context("issue reading JWKS document")
    }
}
