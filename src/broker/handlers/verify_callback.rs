//! # Verify Callback Endpoint
//!
//! Completes the identity-verification flow when the gateway redirects
//! back. The code is exchanged for an ID token, the token's identity claims
//! are matched against the identity cached at flow start, and on success
//! the caller's session is marked verified.
//!
//! Every outcome is a redirect: failures carry a `reason` query parameter
//! on `/invalid-credential`, success lands on `/credential-verified`.

use tracing::instrument;

use crate::broker::Result;
use crate::broker::endpoint::{Body, Handler, NoHeaders, Request, Response};
use crate::broker::handlers::verify_identity::IDENTITY_SCOPE;
use crate::broker::provider::{Gateway, Metadata, Provider};
use crate::broker::state::{self, Family};
use crate::broker::types::{IdentityData, Redirect, TokenClaims, VerifyCallbackRequest};
use crate::core::{generate, strings};
use crate::gateway::TokenRequest;
use crate::server;
use crate::token::codec;

const VERIFIED_URI: &str = "/credential-verified";
const INVALID_URI: &str = "/invalid-credential";

fn rejected(reason: &str) -> Redirect {
    Redirect::with_query(INVALID_URI, &[("reason", reason)])
}

#[instrument(level = "debug", skip_all)]
async fn verify_callback(
    provider: &impl Provider, request: VerifyCallbackRequest,
) -> Result<Redirect> {
    tracing::debug!("verify_callback");

    // single-use: a replayed callback finds no verifier and is rejected
    let verifier: Option<String> =
        state::take(provider, Family::CodeVerifier, &request.state).await?;
    let Some(code_verifier) = verifier else {
        return Ok(rejected("no_code_verifier"));
    };

    if request.scope.as_deref() != Some(IDENTITY_SCOPE) {
        return Ok(rejected("unsupported_scope"));
    }

    let Some(code) = request.code else {
        return Ok(rejected("identity_verification_failed"));
    };

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;
    let token_request = TokenRequest {
        code,
        code_verifier: Some(code_verifier),
        redirect_uri: broker.verify_redirect_uri.clone(),
        state: generate::state(),
    };
    let claims = match Gateway::exchange(provider, &broker, &token_request).await {
        Ok(response) => match codec::parse_verified(provider, &response.id_token).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("issue verifying identity token: {e}");
                return Ok(rejected("identity_verification_failed"));
            }
        },
        Err(e) => {
            tracing::warn!("issue exchanging identity code: {e}");
            return Ok(rejected("identity_verification_failed"));
        }
    };

    let Some(nonce) = &claims.nonce else {
        return Ok(rejected("identity_verification_failed"));
    };
    let identity: Option<IdentityData> = state::take(provider, Family::Identity, nonce).await?;
    let session: Option<String> =
        state::take(provider, Family::UnverifiedSession, nonce).await?;
    let (Some(identity), Some(session)) = (identity, session) else {
        return Ok(rejected("identity_verification_failed"));
    };

    if !matches_identity(&claims, &identity) {
        tracing::info!("identity claims did not match for session {session}");
        return Ok(rejected("identity_verification_failed"));
    }

    state::put(provider, Family::VerifiedSession, &session, &session).await?;

    let client_state: Option<String> =
        state::take(provider, Family::ClientState, &request.state).await?;
    let redirect = match &client_state {
        Some(client_state) => Redirect::with_query(VERIFIED_URI, &[("state", client_state)]),
        None => Redirect::with_query(VERIFIED_URI, &[]),
    };
    Ok(redirect)
}

/// Exact equality of the token's identity claims and the cached identity,
/// after trim and case-fold normalisation.
fn matches_identity(claims: &TokenClaims, identity: &IdentityData) -> bool {
    let (Some(first_name), Some(surname), Some(birth_date)) =
        (&claims.legal_first_name, &claims.legal_surname, &claims.birth_date)
    else {
        return false;
    };

    strings::eq_normalized(first_name, &identity.forenames)
        && strings::eq_normalized(surname, &identity.surname)
        && strings::eq_normalized(birth_date, &identity.date_of_birth.to_string())
}

impl Handler for Request<VerifyCallbackRequest, NoHeaders> {
    type Response = Redirect;

    fn handle(
        self, provider: &impl Provider,
    ) -> impl Future<Output = Result<impl Into<Response<Self::Response>>>> + Send {
        verify_callback(provider, self.body)
    }
}

impl Body for VerifyCallbackRequest {}
