//! # Error Types
//!
//! Errors raised when parsing the wire representations defined in this crate.

use thiserror::Error;

/// A wire string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseSettingError {
    /// Which setting was being parsed (e.g. "aspect ratio").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseSettingError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
