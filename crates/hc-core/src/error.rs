//! Simulator error type.
//!
//! Sub-crates may define their own error enums and convert them into
//! `HcError` via `From` impls, or wrap `HcError` as one variant.  Both
//! patterns are acceptable; prefer whichever keeps error sites clean.

use thiserror::Error;

/// The top-level error type for `hc-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum HcError {
    /// The input data is internally inconsistent (e.g. a patient with no
    /// feasible operator, an asymmetric commuting matrix).  The caller is
    /// expected to regenerate the data; the core does not recover.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for all `hc-*` crates.
pub type HcResult<T> = Result<T, HcError>;
