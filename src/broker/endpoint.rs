//! # Endpoint
//!
//! Entry point for broker requests. Typed requests are routed to the handler
//! implemented for their request type; admission checks (envelope signature,
//! verified session) run in the handler's `validate` hook before any side
//! effect.
//!
//! The crate is transport-agnostic: an HTTP server (or queue consumer) maps
//! its wire request onto a request type and calls [`handle`], then maps the
//! returned [`Response`] back onto its own response type.

use std::fmt::Debug;

use http::HeaderMap;
use http::header::{HeaderValue, LOCATION, WWW_AUTHENTICATE};

use crate::broker::provider::Provider;
use crate::broker::types::{IssueStartResponse, LatestCredentialsResponse, Redirect};
use crate::broker::{Error, Result};

/// Handle an incoming request.
///
/// # Errors
///
/// Returns an error when admission fails (invalid envelope signature, stale
/// signed data, missing verified session) or when the handler itself fails.
/// See [`Error`] for the status each failure surfaces as.
pub async fn handle<B, H, U>(
    request: impl Into<Request<B, H>>, provider: &impl Provider,
) -> Result<Response<U>>
where
    B: Body,
    H: Headers,
    Request<B, H>: Handler<Response = U>,
{
    let request: Request<B, H> = request.into();
    request.validate(provider).await?;
    Ok(request.handle(provider).await?.into())
}

/// A request to process.
#[derive(Clone, Debug)]
pub struct Request<B, H = NoHeaders>
where
    B: Body,
    H: Headers,
{
    /// The request body.
    pub body: B,

    /// Headers associated with the request.
    pub headers: H,
}

impl<B, H> From<B> for Request<B, H>
where
    B: Body,
    H: Headers + Default,
{
    fn from(body: B) -> Self {
        Self {
            body,
            headers: H::default(),
        }
    }
}

/// Empty request headers implementation.
#[derive(Clone, Debug, Default)]
pub struct NoHeaders;
impl Headers for NoHeaders {}

/// A handler's reply, with the status and headers the transport should use.
#[derive(Clone, Debug)]
pub struct Response<T> {
    /// HTTP status code.
    pub status: u16,

    /// Headers to set on the response, if any.
    pub headers: Option<HeaderMap>,

    /// The response body.
    pub body: T,
}

impl From<LatestCredentialsResponse> for Response<LatestCredentialsResponse> {
    fn from(body: LatestCredentialsResponse) -> Self {
        Self {
            status: 200,
            headers: None,
            body,
        }
    }
}

impl From<Redirect> for Response<Redirect> {
    fn from(redirect: Redirect) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(location) = HeaderValue::from_str(&redirect.location) {
            headers.insert(LOCATION, location);
        }
        Self {
            status: 302,
            headers: Some(headers),
            body: redirect,
        }
    }
}

impl From<IssueStartResponse> for Response<IssueStartResponse> {
    fn from(start: IssueStartResponse) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(location) = start.location.as_deref().and_then(|l| HeaderValue::from_str(l).ok())
        {
            headers.insert(LOCATION, location);
        }
        Self {
            status: 201,
            headers: Some(headers),
            body: start,
        }
    }
}

/// Headers accompanying an [`Error`] response, notably the
/// `WWW-Authenticate` challenge on `401` responses for missing verified
/// sessions.
#[must_use]
pub fn error_headers(error: &Error) -> Option<HeaderMap> {
    if let Error::Unauthorized(_) = error {
        let mut headers = HeaderMap::new();
        if let Ok(challenge) = HeaderValue::from_str(crate::broker::error::WWW_AUTHENTICATE) {
            headers.insert(WWW_AUTHENTICATE, challenge);
        }
        return Some(headers);
    }
    None
}

/// Methods common to all request types.
///
/// The primary role of this trait is to provide a common interface so
/// requests can be processed by the [`handle`] method.
pub trait Handler: Clone + Debug + Send + Sync {
    /// The reply type specific to the implementing request.
    type Response;

    /// Routes the request to the concrete handler used to process it.
    fn handle(
        self, provider: &impl Provider,
    ) -> impl Future<Output = Result<impl Into<Response<Self::Response>>>> + Send;

    /// Admission checks performed before the handler runs.
    ///
    /// A failing `validate` never reaches `handle` and must have no side
    /// effects. The default accepts everything; gated requests override it.
    fn validate(&self, _provider: &impl Provider) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

pub(crate) use seal::{Body, Headers};
pub(crate) mod seal {
    use std::fmt::Debug;

    /// The `Body` trait restricts the types able to be a `Request` body. It
    /// is implemented by all `XxxRequest` types.
    pub trait Body: Clone + Debug + Send + Sync {}

    /// The `Headers` trait restricts the types able to be `Request` headers.
    pub trait Headers: Clone + Debug + Send + Sync {}
}
