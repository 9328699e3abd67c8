//! String normalisation for identity matching.
//!
//! Claims returned by the gateway and identity data captured at flow start
//! may differ in case and incidental whitespace. Comparison requires exact
//! equality after normalisation.

/// Normalise a name or date string: trim, collapse internal whitespace runs
/// to a single space, and lowercase.
#[must_use]
pub fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Compare two strings for equality after [`normalize`].
#[must_use]
pub fn eq_normalized(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
