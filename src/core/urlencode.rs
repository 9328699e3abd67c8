//! Query-string assembly.
//!
//! Redirect targets and authorize URLs are built from ordered name/value
//! pairs. Values are form-encoded (`+` for spaces); pair order is preserved
//! so generated URLs are stable.

use urlencoding::encode;

/// Serialise ordered pairs into a query string (no leading `?`).
#[must_use]
pub fn to_query(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={}", encode(value).replace("%20", "+")))
        .collect::<Vec<_>>()
        .join("&")
}

/// Append a query string to a base URL, using `?` or `&` as appropriate.
#[must_use]
pub fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return base.to_string();
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{}", to_query(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_values() {
        let query = to_query(&[("error", "stale_data"), ("error_description", "data was stale")]);
        assert_eq!(query, "error=stale_data&error_description=data+was+stale");

        let scoped = to_query(&[("scope", "openid Identity")]);
        assert_eq!(scoped, "scope=openid+Identity");
    }

    #[test]
    fn appends_to_existing_query() {
        assert_eq!(with_query("/cb?a=1", &[("b", "2")]), "/cb?a=1&b=2");
        assert_eq!(with_query("/cb", &[("b", "2")]), "/cb?b=2");
    }

    #[test]
    fn empty_pairs_leave_base_untouched() {
        assert_eq!(with_query("/credential-issued", &[]), "/credential-issued");
    }
}
