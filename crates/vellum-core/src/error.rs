//! # Error Types
//!
//! Errors raised while constructing core values. Component crates define
//! their own error enums and wrap these where needed.

use thiserror::Error;

/// Errors from constructing core values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A role name did not satisfy the role naming rules.
    #[error("invalid role name {0:?}: expected lowercase ascii letters, digits, '_' or '-'")]
    InvalidRole(String),

    /// An identity was presented without any roles.
    #[error("identity {0} carries no roles")]
    EmptyRoles(String),

    /// A subject identifier was empty.
    #[error("subject id must not be empty")]
    EmptySubject,

    /// A record identifier was empty.
    #[error("record id must not be empty")]
    EmptyRecordId,

    /// A timestamp could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
