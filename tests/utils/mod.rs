//! Shared test fixtures: an in-memory provider, a canned gateway, and token
//! helpers.

#![allow(dead_code)]

pub mod provider;
pub mod token;

use std::collections::HashMap;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub use provider::{ProviderImpl, StubGateway};

/// Shared envelope-sealing secret.
pub const ENVELOPE_SECRET: &str = "an envelope sealing secret";

/// Gateway host trusted as a token issuer.
pub const GATEWAY_HOST: &str = "https://gateway.example.com";

// initalise tracing once for all tests
static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be set.
pub fn init_tracer() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::ERROR).finish();
        tracing::subscriber::set_global_default(subscriber).expect("subscriber set");
    });
}

/// Split a URL into its base and decoded query parameters.
pub fn parse_query(url: &str) -> (String, HashMap<String, String>) {
    let Some((base, query)) = url.split_once('?') else {
        return (url.to_string(), HashMap::new());
    };

    let mut params = HashMap::new();
    for pair in query.split('&') {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(name.to_string(), decode(value));
    }
    (base.to_string(), params)
}

// form-decode a query value: `+` to space, `%XX` to the octet
fn decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' if index + 3 <= bytes.len() => {
                let hex = &value[index + 1..index + 3];
                let octet = u8::from_str_radix(hex, 16).expect("should be hex");
                decoded.push(octet);
                index += 2;
            }
            octet => decoded.push(octet),
        }
        index += 1;
    }
    String::from_utf8(decoded).expect("should be utf8")
}
