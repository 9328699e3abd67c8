//! Revocation engine and queue event ingress.

mod utils;

use chrono::{Duration, Utc};
use serde_json::json;
use trainee_credentials::broker::types::{
    CredentialMetadata, CredentialType, RecordDeleteEvent, RecordUpdateEvent,
};
use trainee_credentials::broker::{Error, events, revocation};
use utils::ProviderImpl;

fn programme_credential(credential_id: &str, entity_id: &str) -> CredentialMetadata {
    CredentialMetadata {
        credential_id: credential_id.into(),
        subject_id: "TR1".into(),
        entity_id: entity_id.into(),
        credential_type: CredentialType::TrainingProgramme,
        issued_at: Some(Utc::now()),
        expires_at: Some(Utc::now() + Duration::days(30)),
        revoked_at: None,
    }
}

fn update_event(tis_id: &str) -> RecordUpdateEvent {
    serde_json::from_value(json!({
        "tisId": tis_id,
        "recrd": {
            "data": {
                "specialty": "Cardio",
                "grade": "ST3",
                "nationalPostNumber": "NPN1",
                "employingBody": "Trust1",
                "site": "Hospital1",
                "dateFrom": "2024-01-01",
                "dateTo": "2024-06-30",
            }
        }
    }))
    .expect("should deserialize event")
}

// A delete event revokes the recorded credential and logs the modification.
#[tokio::test]
async fn delete_propagates() {
    utils::init_tracer();
    let provider = ProviderImpl::new();
    provider.seed_credential(programme_credential("CRED-2", "P2"));

    events::programme_deleted(&provider, RecordDeleteEvent { tis_id: "P2".into() })
        .await
        .expect("should revoke");

    let record = provider
        .modification("P2", CredentialType::TrainingProgramme)
        .expect("should log modification");
    assert_eq!(record.entity_id, "P2");

    let revocations = provider.gateway.revocations();
    assert_eq!(revocations.len(), 1);
    assert_eq!(revocations[0].credential_template_name, "TrainingProgramme");
    assert_eq!(revocations[0].serial_number, "CRED-2");

    let stored = provider.credentials();
    assert!(stored[0].revoked_at.is_some());
}

// Revoking with nothing issued still records the modification.
#[tokio::test]
async fn delete_without_credentials_logs_modification() {
    utils::init_tracer();
    let provider = ProviderImpl::new();

    events::placement_deleted(&provider, RecordDeleteEvent { tis_id: "P9".into() })
        .await
        .expect("should succeed");

    assert!(provider.modification("P9", CredentialType::TrainingPlacement).is_some());
    assert!(provider.gateway.revocations().is_empty());
}

// Updates revoke unconditionally and attach a content fingerprint.
#[tokio::test]
async fn update_revokes_with_fingerprint() {
    utils::init_tracer();
    let provider = ProviderImpl::new();
    let mut placement = programme_credential("CRED-3", "P3");
    placement.credential_type = CredentialType::TrainingPlacement;
    provider.seed_credential(placement);

    events::placement_updated(&provider, update_event("P3")).await.expect("should revoke");

    let record = provider
        .modification("P3", CredentialType::TrainingPlacement)
        .expect("should log modification");
    let fingerprint = record.fingerprint.expect("should carry fingerprint");
    assert_eq!(fingerprint.len(), 32);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));

    assert_eq!(provider.gateway.revocations().len(), 1);
}

// A fingerprint field missing from the update rejects the event before any
// revocation.
#[tokio::test]
async fn update_missing_field_rejected() {
    utils::init_tracer();
    let provider = ProviderImpl::new();
    provider.seed_credential(programme_credential("CRED-4", "P4"));

    let mut event = update_event("P4");
    event.record.data.remove("grade");

    let err = events::placement_updated(&provider, event).await.expect_err("should reject");
    assert_eq!(err.status(), 400);
    assert!(provider.gateway.revocations().is_empty());
    assert!(provider.modification("P4", CredentialType::TrainingPlacement).is_none());
}

// Gateway failure propagates and leaves the local record untouched, so the
// message is redelivered.
#[tokio::test]
async fn gateway_failure_propagates() {
    utils::init_tracer();
    let provider = ProviderImpl::new();
    provider.seed_credential(programme_credential("CRED-5", "P5"));
    provider.gateway.fail_revocations();

    let err = events::programme_deleted(&provider, RecordDeleteEvent { tis_id: "P5".into() })
        .await
        .expect_err("should propagate");
    assert!(matches!(err, Error::GatewayFailure(_)));
    assert_eq!(err.status(), 500);

    // the row is not stamped: redelivery will retry the gateway call
    assert!(provider.credentials()[0].revoked_at.is_none());
}

// Rows already revoked are not revoked again.
#[tokio::test]
async fn revoked_rows_skipped() {
    utils::init_tracer();
    let provider = ProviderImpl::new();
    let mut revoked = programme_credential("CRED-6", "P6");
    revoked.revoked_at = Some(Utc::now());
    provider.seed_credential(revoked);

    revocation::revoke(&provider, "P6", CredentialType::TrainingProgramme, None, None)
        .await
        .expect("should succeed");
    assert!(provider.gateway.revocations().is_empty());
}

// Staleness is strict: a modification at the baseline instant is fresh.
#[tokio::test]
async fn equal_timestamps_not_stale() {
    utils::init_tracer();
    let provider = ProviderImpl::new();

    let baseline = Utc::now();
    revocation::revoke(
        &provider,
        "P7",
        CredentialType::TrainingPlacement,
        Some(baseline),
        None,
    )
    .await
    .expect("should record modification");

    let stale = revocation::revoke_if_stale(
        &provider,
        "CRED-7",
        "P7",
        CredentialType::TrainingPlacement,
        baseline,
    )
    .await
    .expect("should judge staleness");
    assert!(!stale);
    assert!(provider.gateway.revocations().is_empty());

    let stale = revocation::revoke_if_stale(
        &provider,
        "CRED-7",
        "P7",
        CredentialType::TrainingPlacement,
        baseline - Duration::seconds(1),
    )
    .await
    .expect("should judge staleness");
    assert!(stale);
    assert_eq!(provider.gateway.revocations().len(), 1);
}

// No modification record means nothing to judge: not stale.
#[tokio::test]
async fn unrecorded_entity_not_stale() {
    utils::init_tracer();
    let provider = ProviderImpl::new();

    let stale = revocation::revoke_if_stale(
        &provider,
        "CRED-8",
        "P8",
        CredentialType::TrainingPlacement,
        Utc::now(),
    )
    .await
    .expect("should judge staleness");
    assert!(!stale);
}

// The latest write wins for concurrent modification upserts.
#[tokio::test]
async fn modification_log_last_write_wins() {
    utils::init_tracer();
    let provider = ProviderImpl::new();

    let earlier = Utc::now();
    let later = earlier + Duration::minutes(5);
    revocation::revoke(&provider, "P10", CredentialType::TrainingProgramme, Some(earlier), None)
        .await
        .expect("should record");
    revocation::revoke(&provider, "P10", CredentialType::TrainingProgramme, Some(later), None)
        .await
        .expect("should record");

    let record = provider
        .modification("P10", CredentialType::TrainingProgramme)
        .expect("should log modification");
    assert_eq!(record.last_modified_at, later);
}
