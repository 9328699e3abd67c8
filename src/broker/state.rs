//! # Correlation State
//!
//! Short-lived state bridging the asynchronous legs of a flow: the start leg
//! writes keyed entries, the callback leg consumes them. A single keyed
//! store is parameterised by [`Family`], which fixes each entry's TTL and
//! use policy.
//!
//! Single-use families are consumed with [`take`]: the first reader wins and
//! every later (or concurrent) reader sees `None`. Read-many families are
//! read with [`peek`] until they expire. Expiry is re-checked on every read
//! from the entry's own `expires_at`, so a backing store without native TTL
//! support still honours it.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::broker::Result;
use crate::broker::provider::{Clock, Provider, StateStore};
use crate::server;

/// TTL families for correlation entries.
pub enum Expire {
    /// Entries bridging one flow's start and callback legs.
    VerificationRequest,

    /// The verified-session marker written after a successful identity
    /// match.
    VerifiedSession,

    /// Public keys resolved from the gateway's JWKS document.
    PublicKey,
}

impl Expire {
    /// The family's time-to-live.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::VerificationRequest => Duration::minutes(10),
            Self::VerifiedSession => Duration::minutes(60),
            Self::PublicKey => Duration::hours(24),
        }
    }
}

/// Key families of the correlation store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// PKCE code verifier, keyed by `state`.
    CodeVerifier,

    /// Caller-supplied state, keyed by `state`.
    ClientState,

    /// Identity data awaiting verification, keyed by `nonce`.
    Identity,

    /// Credential data awaiting issuance, keyed by `nonce`.
    Credential,

    /// Trainee subject identifier, keyed by `state`.
    Subject,

    /// Issuance-start instant, keyed by `state`.
    IssuedAt,

    /// Session awaiting identity verification, keyed by `nonce`.
    UnverifiedSession,

    /// Verified session marker, keyed by session id.
    VerifiedSession,

    /// Resolved gateway public key, keyed by key id.
    PublicKey,
}

impl Family {
    /// The TTL family governing entries of this family.
    #[must_use]
    pub const fn expire(self) -> Expire {
        match self {
            Self::VerifiedSession => Expire::VerifiedSession,
            Self::PublicKey => Expire::PublicKey,
            _ => Expire::VerificationRequest,
        }
    }

    /// Whether reads consume the entry.
    #[must_use]
    pub const fn single_use(self) -> bool {
        !matches!(self, Self::VerifiedSession | Self::PublicKey)
    }

    const fn prefix(self) -> &'static str {
        match self {
            Self::CodeVerifier => "code_verifier",
            Self::ClientState => "client_state",
            Self::Identity => "identity",
            Self::Credential => "credential",
            Self::Subject => "subject",
            Self::IssuedAt => "issued_at",
            Self::UnverifiedSession => "unverified_session",
            Self::VerifiedSession => "verified_session",
            Self::PublicKey => "public_key",
        }
    }

    fn key(self, id: &str) -> String {
        format!("{}:{id}", self.prefix())
    }
}

/// A stored correlation entry. Expiry travels with the value so reads can
/// enforce it independently of the backing store.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Entry<T> {
    /// The time this entry ceases to be readable.
    pub expires_at: DateTime<Utc>,

    /// The stored value.
    pub value: T,
}

/// Store a correlation entry under its family's TTL.
///
/// # Errors
///
/// Returns `Error::ServerError` when the backing store fails.
pub async fn put<T: Serialize + Send + Sync>(
    provider: &impl Provider, family: Family, id: &str, value: T,
) -> Result<()> {
    put_with_ttl(provider, family, id, value, family.expire().duration()).await
}

/// Store a correlation entry with an explicit TTL overriding the family's.
///
/// # Errors
///
/// Returns `Error::ServerError` when the backing store fails.
pub async fn put_with_ttl<T: Serialize + Send + Sync>(
    provider: &impl Provider, family: Family, id: &str, value: T, ttl: Duration,
) -> Result<()> {
    let expires_at = Clock::now(provider) + ttl;
    let entry = Entry { expires_at, value };
    StateStore::put(provider, &family.key(id), &entry, expires_at)
        .await
        .map_err(|e| server!("issue saving state: {e}"))
}

/// Consume a single-use correlation entry. The first reader receives the
/// value; later and concurrent readers receive `None`.
///
/// # Errors
///
/// Returns `Error::ServerError` when the backing store fails.
pub async fn take<T: DeserializeOwned>(
    provider: &impl Provider, family: Family, id: &str,
) -> Result<Option<T>> {
    debug_assert!(family.single_use(), "take used on a read-many family");

    let entry = StateStore::take::<Entry<T>>(provider, &family.key(id))
        .await
        .map_err(|e| server!("issue taking state: {e}"))?;
    Ok(unexpired(provider, entry))
}

/// Read a read-many correlation entry without consuming it.
///
/// # Errors
///
/// Returns `Error::ServerError` when the backing store fails.
pub async fn peek<T: DeserializeOwned>(
    provider: &impl Provider, family: Family, id: &str,
) -> Result<Option<T>> {
    let entry = StateStore::get::<Entry<T>>(provider, &family.key(id))
        .await
        .map_err(|e| server!("issue reading state: {e}"))?;
    Ok(unexpired(provider, entry))
}

fn unexpired<T>(provider: &impl Provider, entry: Option<Entry<T>>) -> Option<T> {
    let entry = entry?;
    if entry.expires_at <= Clock::now(provider) {
        return None;
    }
    Some(entry.value)
}
