//! # Handlers
//!
//! One module per broker operation: the two flow start legs, their gateway
//! callbacks, the latest-credential listings, and the queue event consumers.

pub mod events;
mod issue_callback;
mod issue_credential;
mod latest_credentials;
mod verify_callback;
mod verify_identity;

use crate::broker::endpoint::Headers;
use crate::broker::types::BearerHeaders;

impl Headers for BearerHeaders {}
