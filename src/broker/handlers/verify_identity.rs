//! # Verify Identity Endpoint
//!
//! Starts the identity-verification flow. The caller posts signed identity
//! data; the broker caches it against a fresh nonce/state pair, binds the
//! token leg with a PKCE challenge, and redirects the caller to the
//! gateway's authorize endpoint with the `openid Identity` scope.

use tracing::instrument;

use crate::broker::endpoint::{Body, Handler, Request, Response};
use crate::broker::gate;
use crate::broker::provider::{Metadata, Provider};
use crate::broker::state::{self, Family};
use crate::broker::types::{BearerHeaders, Redirect, VerifyIdentityRequest};
use crate::broker::Result;
use crate::core::{generate, pkce, urlencode};
use crate::token::codec;
use crate::{invalid, server};

/// Identity scope requested from the gateway.
pub const IDENTITY_SCOPE: &str = "openid Identity";

#[instrument(level = "debug", skip_all)]
async fn verify_identity(
    provider: &impl Provider, request: Request<VerifyIdentityRequest, BearerHeaders>,
) -> Result<Redirect> {
    tracing::debug!("verify_identity");

    let claims = codec::parse_unverified(&request.headers.authorization)?;
    let Some(session_id) = claims.origin_jti else {
        return Err(invalid!("token carries no session identifier"));
    };

    let nonce = generate::nonce();
    let state_id = generate::state();
    let code_verifier = pkce::code_verifier();
    let code_challenge = pkce::code_challenge(&code_verifier);

    let body = request.body;
    state::put(provider, Family::Identity, &nonce, &body.identity.data).await?;
    state::put(provider, Family::CodeVerifier, &state_id, &code_verifier).await?;
    state::put(provider, Family::UnverifiedSession, &nonce, &session_id).await?;
    if let Some(client_state) = &body.client_state {
        state::put(provider, Family::ClientState, &state_id, client_state).await?;
    }

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;
    let location = urlencode::with_query(
        &broker.authorize_endpoint,
        &[
            ("nonce", nonce.as_str()),
            ("state", state_id.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge.as_str()),
            ("scope", IDENTITY_SCOPE),
        ],
    );
    Ok(Redirect { location })
}

impl Handler for Request<VerifyIdentityRequest, BearerHeaders> {
    type Response = Redirect;

    fn handle(
        self, provider: &impl Provider,
    ) -> impl Future<Output = Result<impl Into<Response<Self::Response>>>> + Send {
        verify_identity(provider, self)
    }

    async fn validate(&self, provider: &impl Provider) -> Result<()> {
        gate::admit(provider, &self.body.identity).await?;
        self.body.identity.data.verify()
    }
}

impl Body for VerifyIdentityRequest {}
