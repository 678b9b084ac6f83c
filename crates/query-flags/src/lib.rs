//! query-flags: typed, named parameters sourced from a URL query string.
//!
//! Flags are defined once with a default value, optionally overridden by a
//! one-shot parse pass over a query string, and read through typed accessors.
//! Values can also be temporarily overridden for the duration of a callback
//! with guaranteed restoration, which keeps tests isolated.
//!
//! # Example
//!
//! ```
//! use query_flags::FlagRegistry;
//!
//! let mut flags = FlagRegistry::new();
//! let verbose = flags.define_bool("verbose", false, "Enable verbose output").unwrap();
//! let retries = flags.define_int("retries", 3, "Number of retries").unwrap();
//!
//! flags.parse("?verbose&retries=5").unwrap();
//! assert!(flags.get(&verbose).unwrap());
//! assert_eq!(flags.get(&retries).unwrap(), Some(5));
//! ```

pub mod query;
pub mod registry;
pub mod traits;
pub mod value;

pub use query::*;
pub use registry::*;
pub use traits::*;
pub use value::*;
