//! Opaque identifier generation.
//!
//! Correlation identifiers are UUIDv4 so they can never be predicted or
//! replayed across flows. The PKCE code verifier lives in [`crate::core::pkce`].

use uuid::Uuid;

/// Generate a nonce binding the authorize leg to the token leg of a flow.
#[must_use]
pub fn nonce() -> String {
    Uuid::new_v4().to_string()
}

/// Generate an OAuth `state` value correlating a callback with its start leg.
#[must_use]
pub fn state() -> String {
    Uuid::new_v4().to_string()
}
