//! Query-string splitting and decoding.

use std::borrow::Cow;

/// Split a query string into decoded key/value pairs.
///
/// Accepts an optional leading `?`. Pairs are separated by `&`; a bare `key`
/// with no `=` yields an empty-string value; empty segments are skipped, so
/// an empty query string yields no pairs. Keys and values are
/// percent-decoded.
pub fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(text: &str) -> String {
    match urlencoding::decode(text) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        // Invalid UTF-8 after decoding: keep the raw text.
        Err(_) => text.to_string(),
    }
}
