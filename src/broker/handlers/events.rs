//! # Event Ingress
//!
//! Queue consumers translating upstream record mutations into revocations.
//! Delete events revoke outright; update events additionally compute an MD5
//! content fingerprint over a fixed field tuple, which is recorded on the
//! modification log for future use; update semantics remain revoke-on-any-
//! update.
//!
//! Delivery is at-least-once: the consumer acknowledges a message only when
//! the handler returns `Ok`; an `Err` leaves it for redelivery.

use serde_json::{Map, Value};
use tracing::instrument;

use crate::broker::Result;
use crate::broker::provider::Provider;
use crate::broker::revocation;
use crate::broker::types::{CredentialType, RecordDeleteEvent, RecordUpdateEvent};
use crate::invalid;

/// Fingerprint tuple for programme update events, in fingerprint order.
const PROGRAMME_FIELDS: &[&str] = &["programmeName", "startDate", "endDate"];

/// Fingerprint tuple for placement update events, in fingerprint order.
const PLACEMENT_FIELDS: &[&str] =
    &["specialty", "grade", "nationalPostNumber", "employingBody", "site", "dateFrom", "dateTo"];

/// A programme-membership record was deleted upstream.
///
/// # Errors
///
/// Returns `Error::GatewayFailure` or `Error::ServerError` when revocation
/// fails; the message must be redelivered.
#[instrument(level = "debug", skip(provider))]
pub async fn programme_deleted(
    provider: &impl Provider, event: RecordDeleteEvent,
) -> Result<()> {
    revocation::revoke(provider, &event.tis_id, CredentialType::TrainingProgramme, None, None)
        .await
}

/// A placement record was deleted upstream.
///
/// # Errors
///
/// Returns `Error::GatewayFailure` or `Error::ServerError` when revocation
/// fails; the message must be redelivered.
#[instrument(level = "debug", skip(provider))]
pub async fn placement_deleted(
    provider: &impl Provider, event: RecordDeleteEvent,
) -> Result<()> {
    revocation::revoke(provider, &event.tis_id, CredentialType::TrainingPlacement, None, None)
        .await
}

/// A programme-membership record was updated upstream.
///
/// # Errors
///
/// Returns `Error::BadRequest` when a fingerprint field is missing and no
/// revocation is attempted, otherwise as the delete handlers.
#[instrument(level = "debug", skip(provider, event))]
pub async fn programme_updated(
    provider: &impl Provider, event: RecordUpdateEvent,
) -> Result<()> {
    let fingerprint = fingerprint(&event.record.data, PROGRAMME_FIELDS)?;
    revocation::revoke(
        provider,
        &event.tis_id,
        CredentialType::TrainingProgramme,
        None,
        Some(fingerprint),
    )
    .await
}

/// A placement record was updated upstream.
///
/// # Errors
///
/// Returns `Error::BadRequest` when a fingerprint field is missing and no
/// revocation is attempted, otherwise as the delete handlers.
#[instrument(level = "debug", skip(provider, event))]
pub async fn placement_updated(
    provider: &impl Provider, event: RecordUpdateEvent,
) -> Result<()> {
    let fingerprint = fingerprint(&event.record.data, PLACEMENT_FIELDS)?;
    revocation::revoke(
        provider,
        &event.tis_id,
        CredentialType::TrainingPlacement,
        None,
        Some(fingerprint),
    )
    .await
}

/// MD5 over the concatenation of the tuple fields, in tuple order.
fn fingerprint(data: &Map<String, Value>, fields: &[&str]) -> Result<String> {
    let mut joined = String::new();
    for field in fields {
        let Some(value) = data.get(*field).and_then(Value::as_str) else {
            return Err(invalid!("update event missing `{field}`"));
        };
        joined.push_str(value);
    }
    Ok(format!("{:x}", md5::compute(joined.as_bytes())))
}
