//! # Core Utilities
//!
//! Small helpers shared across the broker: random identifier generation,
//! PKCE, string normalisation, and query-string assembly.

pub mod generate;
pub mod pkce;
pub mod strings;
pub mod urlencode;
