//! A trust broker for the issuance, identity-verification, and revocation
//! lifecycle of verifiable credentials describing a trainee's programme
//! membership and clinical placements.
//!
//! The broker sits between an upstream record-of-truth service, an external
//! credential gateway speaking OpenID Connect-style PAR, authorization,
//! token, JWKS, and revocation endpoints, and trainee-facing clients that
//! initiate issuance and identity proofs.
//!
//! The crate is transport-agnostic: HTTP routing, body parsing,
//! configuration loading, persistence engines, and queue brokers live in the
//! host, wired in through the [`broker::provider`] traits. See [`broker`]
//! for the endpoint architecture.

pub mod broker;
pub mod core;
pub mod gateway;
pub mod token;

pub use crate::broker::{Error, Result};
