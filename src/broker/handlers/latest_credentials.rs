//! # Latest Credentials Endpoint
//!
//! Lists the caller's most recently issued credential for each distinct
//! upstream entity, excluding revoked rows. The caller is identified by the
//! trainee id asserted in their bearer token.

use std::collections::HashMap;

use tracing::instrument;

use crate::broker::endpoint::{Body, Handler, Request, Response};
use crate::broker::provider::{CredentialStore, Provider};
use crate::broker::types::{
    BearerHeaders, CredentialMetadata, LatestCredentialsRequest, LatestCredentialsResponse,
};
use crate::broker::{Error, Result};
use crate::token::codec;
use crate::{invalid, server};

#[instrument(level = "debug", skip_all)]
async fn latest_credentials(
    provider: &impl Provider, request: Request<LatestCredentialsRequest, BearerHeaders>,
) -> Result<LatestCredentialsResponse> {
    tracing::debug!("latest_credentials");

    if request.headers.authorization.trim().is_empty() {
        return Err(invalid!("missing authorization"));
    }
    let claims = codec::parse_unverified(&request.headers.authorization)?;
    let Some(subject_id) = claims.tis_id else {
        return Err(invalid!("token carries no trainee identifier"));
    };

    let credential_type = request.body.credential_type;
    let recorded = CredentialStore::find_by_subject(provider, credential_type, &subject_id)
        .await
        .map_err(|e| server!("issue finding credentials: {e}"))?;

    let mut latest: HashMap<String, CredentialMetadata> = HashMap::new();
    for credential in recorded.into_iter().filter(|credential| !credential.is_revoked()) {
        let Some(issued_at) = credential.issued_at else {
            // a recorded credential with no issued timestamp is corrupt
            return Err(Error::NotFound(format!(
                "credential {} has no issued timestamp",
                credential.credential_id
            )));
        };

        match latest.get(&credential.entity_id) {
            Some(existing) if existing.issued_at >= Some(issued_at) => {}
            _ => {
                latest.insert(credential.entity_id.clone(), credential);
            }
        }
    }

    let mut credentials: Vec<_> = latest.into_values().collect();
    credentials.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));

    Ok(LatestCredentialsResponse { credentials })
}

impl Handler for Request<LatestCredentialsRequest, BearerHeaders> {
    type Response = LatestCredentialsResponse;

    fn handle(
        self, provider: &impl Provider,
    ) -> impl Future<Output = Result<impl Into<Response<Self::Response>>>> + Send {
        latest_credentials(provider, self)
    }
}

impl Body for LatestCredentialsRequest {}
