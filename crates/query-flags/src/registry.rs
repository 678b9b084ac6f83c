//! The flag registry: definition, typed lookup, scoped overrides, and the
//! one-shot query-string parse pass.

use std::collections::HashMap;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::query::parse_query_pairs;
use crate::value::{FlagKind, FlagType, FlagValue};

/// Error from the flag registry.
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("flag already defined: {0}")]
    AlreadyDefined(String),

    #[error("flag not found: {0}")]
    NotFound(String),

    #[error("flag '{name}' is a {actual} flag, not {expected}")]
    TypeMismatch {
        name: String,
        expected: FlagKind,
        actual: FlagKind,
    },

    #[error("invalid JSON flag value: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Typed handle to a defined flag.
///
/// Returned by [`FlagRegistry::define`]. Carries the flag's name together
/// with its Rust type, so reads and writes through the handle stay checked at
/// compile time; name-based lookups re-check the kind at runtime instead.
#[derive(Debug, Clone)]
pub struct Flag<T> {
    name: String,
    _type: PhantomData<fn() -> T>,
}

impl<T> Flag<T> {
    /// The flag's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Read-only metadata for a defined flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagInfo {
    pub name: String,
    pub kind: FlagKind,
    pub description: String,
}

struct FlagCell {
    kind: FlagKind,
    description: String,
    default: FlagValue,
    value: FlagValue,
}

/// Registry of named, typed flags sourced from a URL query string.
///
/// Flags are defined once with a default value, optionally overridden by a
/// single [`parse`](Self::parse) pass over the query string, then read
/// through typed accessors. There is no process-wide instance; construct one
/// registry per test for isolation.
///
/// The registry assumes a single logical thread of control. Every mutation
/// goes through `&mut self` and nothing blocks.
#[derive(Default)]
pub struct FlagRegistry {
    flags: HashMap<String, FlagCell>,
    parsed: bool,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new flag with a default value. Returns a typed handle.
    ///
    /// Fails if the name is already taken; a flag's identity is write-once.
    /// Flags defined after the parse pass still register, but that pass will
    /// never revisit them, so they keep their default until set explicitly.
    pub fn define<T: FlagType>(
        &mut self,
        name: &str,
        default: T,
        description: &str,
    ) -> Result<Flag<T>, FlagError> {
        if self.flags.contains_key(name) {
            return Err(FlagError::AlreadyDefined(name.to_string()));
        }
        let default = default.into_value();
        self.flags.insert(
            name.to_string(),
            FlagCell {
                kind: T::KIND,
                description: description.to_string(),
                value: default.clone(),
                default,
            },
        );
        Ok(Flag {
            name: name.to_string(),
            _type: PhantomData,
        })
    }

    /// Register a boolean flag. A bare `?name` in the query turns it on.
    pub fn define_bool(
        &mut self,
        name: &str,
        default: bool,
        description: &str,
    ) -> Result<Flag<bool>, FlagError> {
        self.define(name, default, description)
    }

    /// Register a string flag.
    pub fn define_string(
        &mut self,
        name: &str,
        default: &str,
        description: &str,
    ) -> Result<Flag<String>, FlagError> {
        self.define(name, default.to_string(), description)
    }

    /// Register an integer flag. Malformed query text parses to the `None`
    /// sentinel rather than failing the parse pass.
    pub fn define_int(
        &mut self,
        name: &str,
        default: i64,
        description: &str,
    ) -> Result<Flag<Option<i64>>, FlagError> {
        self.define(name, Some(default), description)
    }

    /// Register a float flag. Malformed query text parses to `f64::NAN`.
    pub fn define_float(
        &mut self,
        name: &str,
        default: f64,
        description: &str,
    ) -> Result<Flag<f64>, FlagError> {
        self.define(name, default, description)
    }

    /// Register a timestamp flag. Unrecognized query text parses to the
    /// `None` (invalid date) sentinel.
    pub fn define_timestamp(
        &mut self,
        name: &str,
        default: DateTime<Utc>,
        description: &str,
    ) -> Result<Flag<Option<DateTime<Utc>>>, FlagError> {
        self.define(name, Some(default), description)
    }

    /// Register a structured (JSON) flag. Malformed query text is the one
    /// trait failure that aborts the parse pass.
    pub fn define_json(
        &mut self,
        name: &str,
        default: serde_json::Value,
        description: &str,
    ) -> Result<Flag<serde_json::Value>, FlagError> {
        self.define(name, default, description)
    }

    fn cell(&self, name: &str) -> Result<&FlagCell, FlagError> {
        self.flags
            .get(name)
            .ok_or_else(|| FlagError::NotFound(name.to_string()))
    }

    /// Look up a defined flag by name, checking that `T` matches its kind.
    pub fn flag<T: FlagType>(&self, name: &str) -> Result<Flag<T>, FlagError> {
        let cell = self.cell(name)?;
        if cell.kind != T::KIND {
            return Err(FlagError::TypeMismatch {
                name: name.to_string(),
                expected: T::KIND,
                actual: cell.kind,
            });
        }
        Ok(Flag {
            name: name.to_string(),
            _type: PhantomData,
        })
    }

    /// Current value of a flag. Before [`parse`](Self::parse) runs this is
    /// the default supplied at definition time.
    pub fn get<T: FlagType>(&self, flag: &Flag<T>) -> Result<T, FlagError> {
        self.get_by_name(&flag.name)
    }

    /// Current value of a flag looked up by name.
    pub fn get_by_name<T: FlagType>(&self, name: &str) -> Result<T, FlagError> {
        let cell = self.cell(name)?;
        T::from_value(cell.value.clone()).ok_or_else(|| FlagError::TypeMismatch {
            name: name.to_string(),
            expected: T::KIND,
            actual: cell.kind,
        })
    }

    /// Overwrite a flag's current value. No validation beyond the kind check.
    pub fn set<T: FlagType>(&mut self, flag: &Flag<T>, value: T) -> Result<(), FlagError> {
        self.set_by_name(&flag.name, value)
    }

    /// [`set`](Self::set) with a name lookup instead of a handle.
    pub fn set_by_name<T: FlagType>(&mut self, name: &str, value: T) -> Result<(), FlagError> {
        let cell = self
            .flags
            .get_mut(name)
            .ok_or_else(|| FlagError::NotFound(name.to_string()))?;
        if cell.kind != T::KIND {
            return Err(FlagError::TypeMismatch {
                name: name.to_string(),
                expected: T::KIND,
                actual: cell.kind,
            });
        }
        cell.value = value.into_value();
        Ok(())
    }

    /// Render a flag's current value back to query text via its unparse
    /// trait.
    pub fn unparse(&self, name: &str) -> Result<String, FlagError> {
        Ok(self.cell(name)?.value.unparse())
    }

    /// Override a flag for the duration of `f`, then restore the value the
    /// flag had on entry.
    ///
    /// Restoration happens on every exit path, including a panic inside `f`,
    /// so nested overrides unwind to the surrounding override rather than the
    /// original default. The override window is the synchronous extent of
    /// `f`; work `f` schedules for later runs after restoration.
    pub fn force<T: FlagType, R>(
        &mut self,
        flag: &Flag<T>,
        value: T,
        f: impl FnOnce(&mut Self) -> R,
    ) -> Result<R, FlagError> {
        self.force_by_name(&flag.name, value, f)
    }

    /// [`force`](Self::force) with a name lookup instead of a handle.
    pub fn force_by_name<T: FlagType, R>(
        &mut self,
        name: &str,
        value: T,
        f: impl FnOnce(&mut Self) -> R,
    ) -> Result<R, FlagError> {
        let saved = self.cell(name)?.value.clone();
        self.set_by_name(name, value)?;

        struct RestoreGuard<'a> {
            registry: &'a mut FlagRegistry,
            name: &'a str,
            saved: Option<FlagValue>,
        }

        impl Drop for RestoreGuard<'_> {
            fn drop(&mut self) {
                if let Some(saved) = self.saved.take() {
                    if let Some(cell) = self.registry.flags.get_mut(self.name) {
                        cell.value = saved;
                    }
                }
            }
        }

        let guard = RestoreGuard {
            registry: self,
            name,
            saved: Some(saved),
        };
        Ok(f(&mut *guard.registry))
    }

    /// One-shot parse pass over a query string.
    ///
    /// On the first call, splits the query into decoded key/value pairs and,
    /// for each pair whose key names a defined flag, stores the result of
    /// that flag's parse trait as its current value. Keys that name no flag
    /// are logged and skipped. Malformed JSON text aborts the pass with
    /// [`FlagError::InvalidJson`]; pairs already applied stay applied and the
    /// one-shot is still consumed. Later calls log and return without
    /// touching anything.
    ///
    /// A hosted environment would wire its "document loaded" hook to call
    /// this once with the document's query string; everywhere else the
    /// caller invokes it directly before reading parsed values.
    pub fn parse(&mut self, query: &str) -> Result<(), FlagError> {
        if self.parsed {
            tracing::debug!("flag parse pass already ran; ignoring");
            return Ok(());
        }
        self.parsed = true;
        for (key, value) in parse_query_pairs(query) {
            match self.flags.get_mut(&key) {
                Some(cell) => cell.value = cell.kind.parse(&value)?,
                None => tracing::warn!(key = %key, "query string names no defined flag"),
            }
        }
        Ok(())
    }

    /// Whether the one-shot parse pass has run.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Restore every flag to its definition-time default and re-arm the
    /// parse pass. Intended for test isolation.
    pub fn reset(&mut self) {
        for cell in self.flags.values_mut() {
            cell.value = cell.default.clone();
        }
        self.parsed = false;
    }

    /// Metadata for a defined flag.
    pub fn info(&self, name: &str) -> Result<FlagInfo, FlagError> {
        let cell = self.cell(name)?;
        Ok(FlagInfo {
            name: name.to_string(),
            kind: cell.kind,
            description: cell.description.clone(),
        })
    }

    /// Names of all defined flags, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.flags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_default_before_parse() {
        let mut reg = FlagRegistry::new();
        let verbose = reg.define_bool("verbose", false, "verbosity switch").unwrap();
        let retries = reg.define_int("retries", 3, "retry count").unwrap();
        assert!(!reg.get(&verbose).unwrap());
        assert_eq!(reg.get(&retries).unwrap(), Some(3));
        assert!(!reg.is_parsed());
    }

    #[test]
    fn define_duplicate_fails() {
        let mut reg = FlagRegistry::new();
        reg.define_bool("x", true, "").unwrap();
        // Same name with a different kind and default still fails.
        let err = reg.define_int("x", 1, "").unwrap_err();
        assert!(matches!(err, FlagError::AlreadyDefined(_)));
    }

    #[test]
    fn lookup_unknown_name_fails() {
        let reg = FlagRegistry::new();
        assert!(matches!(
            reg.flag::<bool>("missing").unwrap_err(),
            FlagError::NotFound(_)
        ));
        assert!(matches!(
            reg.get_by_name::<bool>("missing").unwrap_err(),
            FlagError::NotFound(_)
        ));
    }

    #[test]
    fn lookup_with_wrong_type_fails() {
        let mut reg = FlagRegistry::new();
        reg.define_int("n", 1, "").unwrap();
        let err = reg.flag::<bool>("n").unwrap_err();
        assert!(matches!(err, FlagError::TypeMismatch { .. }));
        let err = reg.set_by_name("n", true).unwrap_err();
        assert!(matches!(err, FlagError::TypeMismatch { .. }));
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let mut reg = FlagRegistry::new();
        let name = reg.define_string("name", "default", "").unwrap();
        reg.set(&name, "other".to_string()).unwrap();
        assert_eq!(reg.get(&name).unwrap(), "other");
    }

    #[test]
    fn unparse_renders_current_value() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 42, "").unwrap();
        assert_eq!(reg.unparse("n").unwrap(), "42");
        reg.set(&n, Some(7)).unwrap();
        assert_eq!(reg.unparse("n").unwrap(), "7");
    }

    #[test]
    fn force_restores_value_at_entry() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 42, "").unwrap();
        reg.set(&n, Some(12)).unwrap();
        let out = reg
            .force(&n, Some(34), |reg| {
                assert_eq!(reg.get_by_name::<Option<i64>>("n").unwrap(), Some(34));
                56
            })
            .unwrap();
        assert_eq!(out, 56);
        // Restores to the value at entry, not the original default.
        assert_eq!(reg.get(&n).unwrap(), Some(12));
    }

    #[test]
    fn force_restores_after_panic() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 1, "").unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = reg.force(&n, Some(2), |_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(reg.get(&n).unwrap(), Some(1));
    }

    #[test]
    fn force_nests() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 0, "").unwrap();
        reg.force(&n, Some(1), |reg| {
            reg.force_by_name("n", Some(2), |reg| {
                assert_eq!(reg.get_by_name::<Option<i64>>("n").unwrap(), Some(2));
            })
            .unwrap();
            assert_eq!(reg.get_by_name::<Option<i64>>("n").unwrap(), Some(1));
        })
        .unwrap();
        assert_eq!(reg.get(&n).unwrap(), Some(0));
    }

    #[test]
    fn force_on_unknown_flag_fails() {
        let mut reg = FlagRegistry::new();
        let err = reg.force_by_name("missing", true, |_| ()).unwrap_err();
        assert!(matches!(err, FlagError::NotFound(_)));
    }

    #[test]
    fn parse_applies_matching_keys() {
        let mut reg = FlagRegistry::new();
        let verbose = reg.define_bool("verbose", false, "").unwrap();
        let n = reg.define_int("n", 0, "").unwrap();
        reg.parse("?verbose&n=5").unwrap();
        assert!(reg.get(&verbose).unwrap());
        assert_eq!(reg.get(&n).unwrap(), Some(5));
        assert!(reg.is_parsed());
    }

    #[test]
    fn parse_is_one_shot() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 0, "").unwrap();
        reg.parse("n=5").unwrap();
        reg.set(&n, Some(9)).unwrap();
        // Second pass is a no-op, even with a different query.
        reg.parse("n=100").unwrap();
        assert_eq!(reg.get(&n).unwrap(), Some(9));
        assert!(reg.is_parsed());
    }

    #[test]
    fn parse_skips_unmatched_keys() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 7, "").unwrap();
        reg.parse("unknown=1&n=8&also_unknown").unwrap();
        assert_eq!(reg.get(&n).unwrap(), Some(8));
    }

    #[test]
    fn parse_empty_query_is_fine() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 7, "").unwrap();
        reg.parse("").unwrap();
        assert_eq!(reg.get(&n).unwrap(), Some(7));
        assert!(reg.is_parsed());
    }

    #[test]
    fn malformed_json_aborts_the_pass() {
        let mut reg = FlagRegistry::new();
        reg.define_json("cfg", serde_json::json!({}), "").unwrap();
        let err = reg.parse("cfg=%7Bnot-json").unwrap_err();
        assert!(matches!(err, FlagError::InvalidJson(_)));
        // The one-shot is still consumed.
        assert!(reg.is_parsed());
    }

    #[test]
    fn define_after_parse_keeps_default() {
        let mut reg = FlagRegistry::new();
        reg.parse("late=5").unwrap();
        let late = reg.define_int("late", 1, "").unwrap();
        assert_eq!(reg.get(&late).unwrap(), Some(1));
    }

    #[test]
    fn malformed_numeric_text_degrades_to_sentinel() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 3, "").unwrap();
        let x = reg.define_float("x", 1.0, "").unwrap();
        reg.parse("n=abc&x=abc").unwrap();
        assert_eq!(reg.get(&n).unwrap(), None);
        assert!(reg.get(&x).unwrap().is_nan());
    }

    #[test]
    fn reset_restores_defaults_and_rearms_parse() {
        let mut reg = FlagRegistry::new();
        let n = reg.define_int("n", 3, "").unwrap();
        reg.parse("n=9").unwrap();
        assert_eq!(reg.get(&n).unwrap(), Some(9));
        reg.reset();
        assert_eq!(reg.get(&n).unwrap(), Some(3));
        assert!(!reg.is_parsed());
        reg.parse("n=4").unwrap();
        assert_eq!(reg.get(&n).unwrap(), Some(4));
    }

    #[test]
    fn info_and_names() {
        let mut reg = FlagRegistry::new();
        reg.define_bool("b", false, "a switch").unwrap();
        reg.define_int("a", 0, "a number").unwrap();
        assert_eq!(reg.names(), vec!["a", "b"]);
        assert_eq!(reg.len(), 2);
        let info = reg.info("b").unwrap();
        assert_eq!(info.kind, FlagKind::Bool);
        assert_eq!(info.description, "a switch");
    }
}
