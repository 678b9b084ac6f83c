//! Typed value domain for flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of a flag. One kind per parse/unparse trait pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagKind {
    Bool,
    String,
    Int,
    Float,
    Timestamp,
    Json,
}

impl FlagKind {
    /// Lowercase name for log and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for FlagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A flag's value, tagged by kind.
///
/// The numeric and timestamp kinds carry their "invalid" result inside the
/// value domain rather than failing: `Int(None)` and `Timestamp(None)` are the
/// sentinels for malformed input, and `Float` uses `f64::NAN` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlagValue {
    Bool(bool),
    String(String),
    Int(Option<i64>),
    Float(f64),
    Timestamp(Option<DateTime<Utc>>),
    Json(serde_json::Value),
}

impl FlagValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> FlagKind {
        match self {
            Self::Bool(_) => FlagKind::Bool,
            Self::String(_) => FlagKind::String,
            Self::Int(_) => FlagKind::Int,
            Self::Float(_) => FlagKind::Float,
            Self::Timestamp(_) => FlagKind::Timestamp,
            Self::Json(_) => FlagKind::Json,
        }
    }
}

/// Types that can live in a flag cell.
///
/// Links a Rust type to its [`FlagKind`] and converts to and from the tagged
/// [`FlagValue`]. `from_value` is a checked variant match: a kind mismatch
/// yields `None`, which the registry surfaces as an explicit error instead of
/// misreading the cell.
pub trait FlagType: Sized {
    const KIND: FlagKind;

    fn into_value(self) -> FlagValue;
    fn from_value(value: FlagValue) -> Option<Self>;
}

impl FlagType for bool {
    const KIND: FlagKind = FlagKind::Bool;

    fn into_value(self) -> FlagValue {
        FlagValue::Bool(self)
    }

    fn from_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FlagType for String {
    const KIND: FlagKind = FlagKind::String;

    fn into_value(self) -> FlagValue {
        FlagValue::String(self)
    }

    fn from_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl FlagType for Option<i64> {
    const KIND: FlagKind = FlagKind::Int;

    fn into_value(self) -> FlagValue {
        FlagValue::Int(self)
    }

    fn from_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl FlagType for f64 {
    const KIND: FlagKind = FlagKind::Float;

    fn into_value(self) -> FlagValue {
        FlagValue::Float(self)
    }

    fn from_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl FlagType for Option<DateTime<Utc>> {
    const KIND: FlagKind = FlagKind::Timestamp;

    fn into_value(self) -> FlagValue {
        FlagValue::Timestamp(self)
    }

    fn from_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Timestamp(v) => Some(v),
            _ => None,
        }
    }
}

impl FlagType for serde_json::Value {
    const KIND: FlagKind = FlagKind::Json;

    fn into_value(self) -> FlagValue {
        FlagValue::Json(self)
    }

    fn from_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kind_tags() {
        assert_eq!(FlagValue::Bool(true).kind(), FlagKind::Bool);
        assert_eq!(FlagValue::Int(Some(1)).kind(), FlagKind::Int);
        assert_eq!(FlagValue::Json(serde_json::json!(null)).kind(), FlagKind::Json);
    }

    #[test]
    fn typed_roundtrip() {
        assert_eq!(bool::from_value(true.into_value()), Some(true));
        assert_eq!(
            String::from_value("hi".to_string().into_value()),
            Some("hi".to_string())
        );
        assert_eq!(<Option<i64>>::from_value(Some(7).into_value()), Some(Some(7)));
    }

    #[test]
    fn checked_extraction_rejects_wrong_kind() {
        assert_eq!(bool::from_value(FlagValue::Int(Some(1))), None);
        assert_eq!(<Option<i64>>::from_value(FlagValue::Bool(true)), None);
        assert_eq!(f64::from_value(FlagValue::String("1.5".into())), None);
    }

    #[test]
    fn kind_display_is_lowercase() {
        assert_eq!(FlagKind::Timestamp.to_string(), "timestamp");
        assert_eq!(FlagKind::Bool.to_string(), "bool");
    }
}
