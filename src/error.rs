//! Error types for fallible `LockMap` constructors.
//!
//! The error surface is intentionally tiny. Lookups on absent keys are
//! reported through `Option` or a caller-supplied default, never as an
//! error, and callback failures propagate as panics with the lock
//! released on unwind.

use thiserror::Error;

/// Errors returned by fallible `LockMap` constructors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The key and value sequences passed to
    /// [`from_keys_values`](crate::LockMapRaw::from_keys_values) differ
    /// in length, so they can not be zipped into entries.
    #[error("length mismatch: {keys} keys but {values} values")]
    LengthMismatch {
        /// Number of keys provided.
        keys: usize,
        /// Number of values provided.
        values: usize,
    },
}
