//! # Revocation Engine
//!
//! Revokes issued credentials when their source data mutates (delete/update
//! events) or proves stale at issuance completion. Every revocation call
//! records the mutation in the modification log first, so the admission
//! filter and the staleness check see it even when there was nothing to
//! revoke.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::broker::Result;
use crate::broker::provider::{
    Clock, CredentialStore, Gateway, Metadata, ModificationLog, Provider,
};
use crate::broker::types::{CredentialType, ModificationRecord};
use crate::gateway::RevokeRequest;
use crate::server;

/// Revoke all issued credentials for an upstream entity.
///
/// The modification log is upserted unconditionally (`timestamp` when the
/// event supplies one, else now), then every non-revoked credential recorded
/// for `(credential_type, entity_id)` is revoked at the gateway and stamped
/// locally. Gateway failure propagates without mutating the local record for
/// that credential.
///
/// # Errors
///
/// Returns `Error::GatewayFailure` when the gateway rejects a revocation and
/// `Error::ServerError` when a store fails.
pub async fn revoke(
    provider: &impl Provider, entity_id: &str, credential_type: CredentialType,
    timestamp: Option<DateTime<Utc>>, fingerprint: Option<String>,
) -> Result<()> {
    let record = ModificationRecord {
        entity_id: entity_id.to_string(),
        credential_type,
        last_modified_at: timestamp.unwrap_or_else(|| Clock::now(provider)),
        fingerprint,
    };
    ModificationLog::upsert(provider, &record)
        .await
        .map_err(|e| server!("issue recording modification: {e}"))?;

    let recorded = CredentialStore::find_by_entity(provider, credential_type, entity_id)
        .await
        .map_err(|e| server!("issue finding credentials: {e}"))?;

    // best-effort de-duplication so one serial is revoked at most once
    let mut seen = HashSet::new();
    let issued: Vec<_> = recorded
        .into_iter()
        .filter(|credential| !credential.is_revoked())
        .filter(|credential| seen.insert(credential.credential_id.clone()))
        .collect();

    if issued.is_empty() {
        tracing::info!("no issued {credential_type} credentials for entity {entity_id}");
        return Ok(());
    }

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;

    for credential in issued {
        gateway_revoke(provider, &broker, credential_type, &credential.credential_id).await?;
        CredentialStore::mark_revoked(provider, &credential.credential_id, Clock::now(provider))
            .await
            .map_err(|e| server!("issue stamping revocation: {e}"))?;
        tracing::info!(
            "revoked {credential_type} credential {} for entity {entity_id}",
            credential.credential_id
        );
    }
    Ok(())
}

/// Revoke a just-issued credential when its source data changed after
/// `since`.
///
/// Returns `false` when no modification is recorded or the modification is
/// not strictly after `since` (equal timestamps are not stale); otherwise
/// revokes at the gateway and returns `true`. The credential has not been
/// persisted at this point, so there is no local row to stamp.
///
/// # Errors
///
/// Returns `Error::GatewayFailure` when the gateway rejects the revocation
/// and `Error::ServerError` when a store fails.
pub async fn revoke_if_stale(
    provider: &impl Provider, credential_id: &str, entity_id: &str,
    credential_type: CredentialType, since: DateTime<Utc>,
) -> Result<bool> {
    let record = ModificationLog::get(provider, entity_id, credential_type)
        .await
        .map_err(|e| server!("issue reading modification log: {e}"))?;

    let Some(record) = record else {
        return Ok(false);
    };
    if record.last_modified_at <= since {
        return Ok(false);
    }

    let broker =
        Metadata::broker(provider).await.map_err(|e| server!("issue getting metadata: {e}"))?;
    gateway_revoke(provider, &broker, credential_type, credential_id).await?;
    tracing::info!(
        "revoked stale {credential_type} credential {credential_id} for entity {entity_id}"
    );
    Ok(true)
}

async fn gateway_revoke(
    provider: &impl Provider, broker: &crate::broker::types::Broker,
    credential_type: CredentialType, credential_id: &str,
) -> Result<()> {
    let request = RevokeRequest {
        credential_template_name: credential_type.template_name().to_string(),
        serial_number: credential_id.to_string(),
    };
    Gateway::revoke(provider, broker, &request)
        .await
        .map_err(|e| crate::broker::Error::GatewayFailure(format!("issue revoking: {e}")))
}
