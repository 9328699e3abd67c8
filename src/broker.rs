//! # Broker
//!
//! The authorization/session core of the credential broker: typed requests
//! for each operation, the admission gates, the correlation-state store, the
//! revocation engine, and the provider traits binding them to the host's
//! infrastructure.
//!
//! # Design
//!
//! **Endpoints**
//!
//! The library is architected around the broker's operations, each with its
//! own request and response types. The types serialise to and from JSON in
//! accordance with the wire formats of the upstream service and gateway.
//!
//! The endpoints are designed to be used with Rust-based HTTP servers, such
//! as [axum](https://docs.rs/axum/latest/axum/): the server maps each route
//! onto a request type and calls [`endpoint::handle`]. Queue consumers call
//! the [`events`] handlers directly and acknowledge on `Ok`.
//!
//! **Providers**
//!
//! Implementors supply `Provider` traits responsible for externals:
//! configuration, correlation state, credential metadata persistence, the
//! modification log, and the gateway wire protocol. See [`provider`].
//!
//! # Example
//!
//! ```rust,ignore
//! // Issuance callback endpoint
//! async fn issue_callback(
//!     State(provider): State<ProviderImpl>, Query(req): Query<IssueCallbackRequest>,
//! ) -> impl IntoResponse {
//!     let response = endpoint::handle(req, &provider).await?;
//!     Redirect::temporary(&response.body.location)
//! }
//! ```

pub mod client;
pub mod endpoint;
pub mod gate;
pub mod provider;
pub mod revocation;
pub mod state;
pub mod types;

mod error;
mod handlers;

pub use error::{Error, WWW_AUTHENTICATE};
pub use handlers::events;

/// Result type for broker operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
