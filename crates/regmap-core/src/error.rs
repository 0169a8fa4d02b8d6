//! # Error Types
//!
//! Errors raised by the foundational types. Higher crates wrap these in
//! their own `thiserror` enums rather than re-exporting them to callers.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Percentages and amounts must be integers (e.g. hundredths) or strings.
    #[error("float value {value} at {path} is not permitted in canonical form")]
    FloatRejected {
        /// JSON pointer to the offending value.
        path: String,
        /// The rejected value.
        value: f64,
    },

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// A string could not be parsed as a [`crate::ContentDigest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    /// Missing or unsupported algorithm prefix.
    #[error("unsupported digest algorithm in {0:?}; expected sha256:<hex>")]
    UnsupportedAlgorithm(String),

    /// The hex body is not 64 lowercase hex characters.
    #[error("malformed sha256 hex: {0:?}")]
    MalformedHex(String),
}

/// An identifier failed construction-time validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The identifier was empty or whitespace-only.
    #[error("{kind} must not be empty")]
    Empty {
        /// Identifier kind, e.g. `"mapping name"`.
        kind: &'static str,
    },

    /// The identifier exceeded the maximum length.
    #[error("{kind} exceeds {max} characters")]
    TooLong {
        /// Identifier kind.
        kind: &'static str,
        /// Maximum permitted length.
        max: usize,
    },

    /// A timestamp string was rejected.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}
