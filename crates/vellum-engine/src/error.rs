//! Engine error taxonomy.

use thiserror::Error;
use vellum_core::RecordId;
use vellum_crypto::CryptoError;
use vellum_schema::{FieldError, SchemaError};

use crate::cancel::Interrupt;
use crate::hooks::HookPhase;

/// Why a content operation failed.
///
/// Validation and access errors always list every offending field.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("schema invalid: {0}")]
    SchemaInvalid(SchemaError),

    #[error("{0}")]
    SchemaNotFound(SchemaError),

    #[error("validation failed: {}", join(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("access denied on {}", .fields.join(", "))]
    AccessDenied { fields: Vec<String> },

    #[error("hook {hook} aborted {phase}: {reason}")]
    HookAborted {
        phase: HookPhase,
        hook: String,
        reason: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    /// Another writer changed the record first. Safe to retry from a fresh read.
    #[error("conflicting write on {schema}/{record}")]
    Conflict { schema: String, record: RecordId },

    #[error("record {schema}/{record} not found")]
    NotFound { schema: String, record: RecordId },

    #[error("audit unavailable: {0}")]
    AuditUnavailable(String),

    #[error(transparent)]
    Encryption(#[from] CryptoError),

    #[error("operation interrupted: {0}")]
    Interrupted(Interrupt),
}

impl EngineError {
    /// Whether the caller may retry without inspecting stored state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stable name for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaInvalid(_) => "schema_invalid",
            Self::SchemaNotFound(_) => "schema_not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::AccessDenied { .. } => "access_denied",
            Self::HookAborted { .. } => "hook_aborted",
            Self::Storage(_) => "storage_error",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::AuditUnavailable(_) => "audit_unavailable",
            Self::Encryption(_) => "encryption_error",
            Self::Interrupted(_) => "interrupted",
        }
    }
}

impl From<SchemaError> for EngineError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::NotFound { .. } | SchemaError::Inactive { .. } => Self::SchemaNotFound(e),
            _ => Self::SchemaInvalid(e),
        }
    }
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
