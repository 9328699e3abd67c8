//! # Issue Callback Endpoint
//!
//! Completes credential issuance when the gateway redirects back. The code
//! is exchanged for the issued credential's ID token, the issuance is
//! checked for staleness against the modification log, and fresh issuances
//! are persisted as credential metadata.
//!
//! Every outcome is a redirect to `/credential-issued`; gateway-relayed
//! errors and staleness outcomes travel in its query string.

use tracing::instrument;

use crate::broker::endpoint::{Body, Handler, NoHeaders, Request, Response};
use crate::broker::provider::{CredentialStore, Gateway, Metadata, Provider};
use crate::broker::state::{self, Family};
use crate::broker::types::{CredentialData, CredentialMetadata, IssueCallbackRequest, Redirect};
use crate::broker::{Result, revocation};
use crate::core::generate;
use crate::gateway::TokenRequest;
use crate::server;
use crate::token::codec;

const ISSUED_URI: &str = "/credential-issued";

const STALE_DATA: (&str, &str) =
    ("stale_data", "The issued credential data was stale and has been revoked");
const UNKNOWN_FRESHNESS: (&str, &str) = (
    "unknown_data_freshness",
    "The issued credential data could not be verified and has been revoked",
);

fn issued(
    client_state: Option<&str>, error: Option<&str>, error_description: Option<&str>,
) -> Redirect {
    let mut pairs = vec![];
    if let Some(client_state) = client_state {
        pairs.push(("state", client_state));
    }
    if let Some(error) = error {
        pairs.push(("error", error));
    }
    if let Some(error_description) = error_description {
        pairs.push(("error_description", error_description));
    }
    Redirect::with_query(ISSUED_URI, &pairs)
}

#[instrument(level = "debug", skip_all)]
async fn issue_callback(
    provider: &impl Provider, request: IssueCallbackRequest,
) -> Result<Redirect> {
    tracing::debug!("issue_callback");

    let client_state: Option<String> =
        state::take(provider, Family::ClientState, &request.state).await?;
    let client_state = client_state.as_deref();

    // gateway-reported errors and missing codes pass straight through
    let code = match (&request.error, request.code) {
        (None, Some(code)) => code,
        _ => {
            return Ok(issued(
                client_state,
                request.error.as_deref(),
                request.error_description.as_deref(),
            ));
        }
    };

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;
    let token_request = TokenRequest {
        code,
        code_verifier: None,
        redirect_uri: broker.issue_redirect_uri.clone(),
        state: generate::state(),
    };
    let claims = match Gateway::exchange(provider, &broker, &token_request).await {
        Ok(response) => match codec::parse_verified(provider, &response.id_token).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("issue verifying issued token: {e}");
                return Ok(issued(client_state, None, None));
            }
        },
        Err(e) => {
            tracing::warn!("issue exchanging issuance code: {e}");
            return Ok(issued(client_state, None, None));
        }
    };

    let (Some(nonce), Some(serial_number)) = (&claims.nonce, &claims.serial_number) else {
        tracing::warn!("issued token carried no nonce or serial number");
        return Ok(issued(client_state, None, None));
    };

    let subject: Option<String> = state::take(provider, Family::Subject, &request.state).await?;
    let credential: Option<CredentialData> =
        state::take(provider, Family::Credential, nonce).await?;
    let (Some(subject_id), Some(credential)) = (subject, credential) else {
        tracing::warn!("issuance correlation expired before completion");
        return Ok(issued(client_state, None, None));
    };

    // freshness window: issuance start to now; an absent baseline means the
    // window is unknown and the credential cannot be trusted
    let baseline: Option<chrono::DateTime<chrono::Utc>> =
        state::take(provider, Family::IssuedAt, &request.state).await?;
    let since = baseline.unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

    let revoked = revocation::revoke_if_stale(
        provider,
        serial_number,
        credential.entity_id(),
        credential.credential_type(),
        since,
    )
    .await?;
    if revoked {
        let (error, description) =
            if baseline.is_none() { UNKNOWN_FRESHNESS } else { STALE_DATA };
        return Ok(issued(client_state, Some(error), Some(description)));
    }

    let metadata = CredentialMetadata {
        credential_id: serial_number.clone(),
        subject_id,
        entity_id: credential.entity_id().to_string(),
        credential_type: credential.credential_type(),
        issued_at: claims.iat.as_ref().and_then(|iat| iat.as_datetime()),
        expires_at: claims.exp.as_ref().and_then(|exp| exp.as_datetime()),
        revoked_at: None,
    };
    CredentialStore::save(provider, &metadata)
        .await
        .map_err(|e| server!("issue saving credential metadata: {e}"))?;
    tracing::info!("issued {} credential {serial_number}", metadata.credential_type);

    Ok(issued(client_state, None, None))
}

impl Handler for Request<IssueCallbackRequest, NoHeaders> {
    type Response = Redirect;

    fn handle(
        self, provider: &impl Provider,
    ) -> impl Future<Output = Result<impl Into<Response<Self::Response>>>> + Send {
        issue_callback(provider, self.body)
    }
}

impl Body for IssueCallbackRequest {}
