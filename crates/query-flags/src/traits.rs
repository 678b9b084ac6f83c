//! The parse/unparse trait table.
//!
//! One pure, stateless function pair per flag kind. Parsing hangs off
//! [`FlagKind`], unparsing off [`FlagValue`]. Only the json kind can fail to
//! parse; every other kind degrades to a sentinel value on malformed input
//! (see [`FlagValue`] for which sentinel each kind uses).

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::registry::FlagError;
use crate::value::{FlagKind, FlagValue};

impl FlagKind {
    /// Parse decoded query text into a value of this kind.
    pub fn parse(&self, text: &str) -> Result<FlagValue, FlagError> {
        Ok(match self {
            Self::Bool => FlagValue::Bool(parse_bool(text)),
            Self::String => FlagValue::String(text.to_string()),
            Self::Int => FlagValue::Int(parse_int_prefix(text)),
            Self::Float => FlagValue::Float(parse_float(text)),
            Self::Timestamp => FlagValue::Timestamp(parse_timestamp(text)),
            Self::Json => FlagValue::Json(serde_json::from_str(text)?),
        })
    }
}

impl FlagValue {
    /// Render the value back to query text.
    ///
    /// Total, and the left inverse of [`FlagKind::parse`] on well-formed
    /// input. The int and timestamp sentinels unparse to `"NaN"` and
    /// `"Invalid Date"`, both of which re-parse to the sentinel.
    pub fn unparse(&self) -> String {
        match self {
            Self::Bool(true) => "true".to_string(),
            Self::Bool(false) => "false".to_string(),
            Self::String(s) => s.clone(),
            Self::Int(Some(n)) => n.to_string(),
            Self::Int(None) => "NaN".to_string(),
            Self::Float(v) => v.to_string(),
            Self::Timestamp(Some(t)) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Timestamp(None) => "Invalid Date".to_string(),
            Self::Json(v) => v.to_string(),
        }
    }
}

/// Boolean text rules.
///
/// Empty text is `true` (a bare `?name` is a presence-only switch),
/// `"true"` is `true` case-insensitively, and anything else is `true` iff it
/// has a nonzero leading integer prefix.
pub fn parse_bool(text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    if text.eq_ignore_ascii_case("true") {
        return true;
    }
    matches!(parse_int_prefix(text), Some(n) if n != 0)
}

/// Base-10 parse of the leading `[+-]?digits` prefix, whitespace-trimmed.
///
/// `"123abc"` parses to `Some(123)`. No digit prefix (or an i64 overflow)
/// yields `None`, the not-a-number sentinel.
pub fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Whitespace-trimmed decimal parse, exponents accepted.
/// Malformed text yields `f64::NAN`.
pub fn parse_float(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

/// Free-form timestamp parse.
///
/// Tries RFC 3339, RFC 2822, then common date-time and date-only layouts
/// (date-only resolves to midnight UTC). Unrecognized text yields `None`,
/// the invalid-date sentinel.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(text) {
        return Some(t.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    None
}
