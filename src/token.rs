//! # Tokens
//!
//! JWT production and verification for the gateway exchange: outbound
//! credential-data tokens are signed with the shared symmetric key; inbound
//! ID tokens are verified against the gateway's JWKS document.

pub mod codec;
pub mod keys;
