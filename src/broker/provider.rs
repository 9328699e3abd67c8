//! # Provider
//!
//! Traits the host implements to supply the broker's externals: broker
//! configuration, short-lived correlation state, persisted credential
//! metadata, the modification log, the credential gateway, and wall-time.
//!
//! The traits are deliberately thin so hosts can back them with whatever
//! infrastructure they run (a relational store, a document store, a
//! key-value cache, an HTTP stack). The crate ships
//! [`HttpGateway`](crate::gateway::HttpGateway) as the wire implementation
//! of [`Gateway`].

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::broker::types::{Broker, CredentialMetadata, CredentialType, ModificationRecord};
use crate::gateway::{ParRequest, ParResponse, RevokeRequest, TokenRequest, TokenResponse};

/// Broker Provider trait.
pub trait Provider:
    Metadata + StateStore + CredentialStore + ModificationLog + Gateway + Clock + Clone
{
}

/// A blanket implementation for `Provider` trait so that any type
/// implementing the required super traits is considered a `Provider`.
impl<T> Provider for T where
    T: Metadata + StateStore + CredentialStore + ModificationLog + Gateway + Clock + Clone
{
}

/// The `Metadata` trait is used by implementers to provide broker
/// configuration to the library.
pub trait Metadata: Send + Sync {
    /// Broker configuration: gateway endpoints, client credentials,
    /// redirect URIs, signing parameters, and the envelope secret.
    fn broker(&self) -> impl Future<Output = Result<Broker>> + Send;
}

/// Wall-time for TTL and freshness checks.
///
/// The default reads the system clock; test providers override it to freeze
/// time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `StateStore` is used to store and retrieve server-side state between
/// legs of a flow.
///
/// Missing keys are `None`, never errors. Implementations must make `take`
/// atomic: when concurrent calls race on one key, exactly one caller
/// receives the value and all others receive `None`.
pub trait StateStore: Send + Sync {
    /// Store state using the provided key, retaining it until `expires_at`.
    fn put(
        &self, key: &str, state: impl Serialize + Send, expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Retrieve state without removing it.
    fn get<T: DeserializeOwned>(
        &self, key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Atomically remove and return state.
    fn take<T: DeserializeOwned>(
        &self, key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send;
}

/// Persistent store of issued-credential metadata.
pub trait CredentialStore: Send + Sync {
    /// Persist metadata for an issued credential.
    fn save(&self, credential: &CredentialMetadata) -> impl Future<Output = Result<()>> + Send;

    /// All credentials recorded for an upstream entity.
    fn find_by_entity(
        &self, credential_type: CredentialType, entity_id: &str,
    ) -> impl Future<Output = Result<Vec<CredentialMetadata>>> + Send;

    /// All credentials recorded for a trainee.
    fn find_by_subject(
        &self, credential_type: CredentialType, subject_id: &str,
    ) -> impl Future<Output = Result<Vec<CredentialMetadata>>> + Send;

    /// Stamp a credential as revoked.
    fn mark_revoked(
        &self, credential_id: &str, revoked_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Append/upsert store of the latest upstream modification per
/// `(entity, credential type)` pair.
///
/// Concurrent upserts for one key must all persist; the latest write wins.
pub trait ModificationLog: Send + Sync {
    /// Record a modification, replacing any earlier record for the pair.
    fn upsert(&self, record: &ModificationRecord) -> impl Future<Output = Result<()>> + Send;

    /// The latest modification recorded for the pair.
    fn get(
        &self, entity_id: &str, credential_type: CredentialType,
    ) -> impl Future<Output = Result<Option<ModificationRecord>>> + Send;
}

/// Wire operations against the external credential gateway.
///
/// Errors carry transport or status failures; callers decide whether to
/// degrade (PAR, token exchange) or propagate (revocation).
pub trait Gateway: Send + Sync {
    /// Push an authorization request; returns the opaque `request_uri`.
    fn par(
        &self, broker: &Broker, request: &ParRequest,
    ) -> impl Future<Output = Result<ParResponse>> + Send;

    /// Exchange an authorization code for an ID token.
    fn exchange(
        &self, broker: &Broker, request: &TokenRequest,
    ) -> impl Future<Output = Result<TokenResponse>> + Send;

    /// Revoke an issued credential.
    fn revoke(
        &self, broker: &Broker, request: &RevokeRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the gateway's JWKS document.
    fn jwks(&self, broker: &Broker) -> impl Future<Output = Result<JwkSet>> + Send;
}
