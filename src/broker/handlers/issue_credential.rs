//! # Issue Credential Endpoint
//!
//! Starts credential issuance for a programme membership or placement. The
//! signed credential data is cached against a fresh nonce/state pair, the
//! issuance-start instant is captured as the staleness baseline, and the
//! credential data is pushed to the gateway as a signed `id_token_hint` via
//! PAR. The response's `Location` carries the authorize URL with the pushed
//! `request_uri`; when the PAR leg fails the location is empty.

use tracing::instrument;

use crate::broker::Result;
use crate::broker::endpoint::{Body, Handler, Request, Response};
use crate::broker::gate;
use crate::broker::provider::{Clock, Gateway, Metadata, Provider};
use crate::broker::state::{self, Family};
use crate::broker::types::{BearerHeaders, IssueCredentialRequest, IssueStartResponse};
use crate::core::{generate, urlencode};
use crate::gateway::ParRequest;
use crate::token::codec;
use crate::{invalid, server};

#[instrument(level = "debug", skip_all)]
async fn issue_credential(
    provider: &impl Provider, request: Request<IssueCredentialRequest, BearerHeaders>,
) -> Result<IssueStartResponse> {
    tracing::debug!("issue_credential");

    let claims = codec::parse_unverified(&request.headers.authorization)?;
    let Some(subject_id) = claims.tis_id else {
        return Err(invalid!("token carries no trainee identifier"));
    };

    let credential = request.body.credential.data;
    let nonce = generate::nonce();
    let state_id = generate::state();

    state::put(provider, Family::Credential, &nonce, &credential).await?;
    state::put(provider, Family::Subject, &state_id, &subject_id).await?;
    state::put(provider, Family::IssuedAt, &state_id, Clock::now(provider)).await?;
    if let Some(client_state) = &request.body.client_state {
        state::put(provider, Family::ClientState, &state_id, client_state).await?;
    }

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;
    let hint = codec::sign(&broker.signing, &credential, Clock::now(provider))?;
    let par = ParRequest {
        scope: credential.credential_type().issuance_scope().to_string(),
        id_token_hint: hint,
        nonce,
        state: state_id,
    };

    match Gateway::par(provider, &broker, &par).await {
        Ok(response) => {
            let location = urlencode::with_query(
                &broker.authorize_endpoint,
                &[("request_uri", response.request_uri.as_str())],
            );
            Ok(IssueStartResponse {
                location: Some(location),
            })
        }
        Err(e) => {
            tracing::warn!("issue pushing authorization request: {e}");
            Ok(IssueStartResponse { location: None })
        }
    }
}

impl Handler for Request<IssueCredentialRequest, BearerHeaders> {
    type Response = IssueStartResponse;

    fn handle(
        self, provider: &impl Provider,
    ) -> impl Future<Output = Result<impl Into<Response<Self::Response>>>> + Send {
        issue_credential(provider, self)
    }

    // admission order mirrors the filter chain: envelope signature, then
    // data freshness, then the verified-session requirement
    async fn validate(&self, provider: &impl Provider) -> Result<()> {
        let envelope = &self.body.credential;
        gate::admit(provider, envelope).await?;
        gate::assert_unmodified(
            provider,
            envelope.data.entity_id(),
            envelope.data.credential_type(),
            envelope.signature.signed_at,
        )
        .await?;
        gate::assert_verified_session(provider, &self.headers.authorization).await?;
        envelope.data.verify()
    }
}

impl Body for IssueCredentialRequest {}
