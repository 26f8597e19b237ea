//! `.env` file parsing
//!
//! Lines are parsed by `dotenvy`: `export` prefixes, `#` comments, single and
//! double quoting, multi-line quoted values, escapes inside double quotes and
//! `$NAME` substitution. Lines that do not parse are skipped.

/// Parse `.env` content into `(name, value)` pairs in file order.
///
/// A name defined twice keeps both entries; callers that build a map decide
/// which one wins.
pub fn parse(content: &str) -> Vec<(String, String)> {
    dotenvy::from_read_iter(content.as_bytes())
        .filter_map(|entry| match entry {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::trace!(error = %e, "skipping env line");
                None
            }
        })
        .collect()
}
