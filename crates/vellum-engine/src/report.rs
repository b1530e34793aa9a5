//! Operation results.

use serde::Serialize;
use vellum_core::{CorrelationId, FieldOutcome, OperationId, OperationState, RecordId};
use vellum_schema::Payload;

use crate::error::EngineError;
use crate::storage::Revision;

/// What happened to an operation's audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditStatus {
    Recorded,
    /// A read with nothing notable to audit.
    NotRequired,
    /// Recording failed under the `degrade` policy; the operation stands.
    Degraded { reason: String },
    /// Recording failed; see the accompanying error.
    Unavailable { reason: String },
    /// Recording was interrupted; a compensating entry is being written in
    /// the background.
    Compensating,
}

/// A finished operation.
///
/// `state` is `Complete`, or `Incomplete` when the write is durable but its
/// audit was interrupted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport<T> {
    pub operation_id: OperationId,
    pub correlation_id: CorrelationId,
    pub state: OperationState,
    pub audit: AuditStatus,
    pub fields: Vec<FieldOutcome>,
    pub warnings: Vec<String>,
    pub value: T,
}

impl<T> OperationReport<T> {
    pub fn is_complete(&self) -> bool {
        self.state == OperationState::Complete
    }
}

/// A failed operation.
///
/// `phase` is the last state reached before failing. A failure at or after
/// `Persisted` means the write is durable; retrying is the caller's call.
#[derive(Debug)]
pub struct OperationFailure {
    pub error: EngineError,
    pub operation_id: OperationId,
    pub correlation_id: CorrelationId,
    pub phase: OperationState,
    pub audit: AuditStatus,
}

impl OperationFailure {
    /// Whether the failed operation left a durable write behind.
    pub fn write_is_durable(&self) -> bool {
        matches!(
            self.phase,
            OperationState::Persisted | OperationState::Audited
        )
    }
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {}: {}",
            self.operation_id, self.phase, self.error
        )
    }
}

impl std::error::Error for OperationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Outcome of every engine operation.
pub type OperationResult<T> = Result<OperationReport<T>, OperationFailure>;

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Written {
    pub record_id: RecordId,
    pub schema_version: u32,
    pub revision: Revision,
}

/// Result of a read: the visible, decrypted fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    pub record_id: RecordId,
    pub schema_version: u32,
    pub revision: Revision,
    pub fields: Payload,
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub record_id: RecordId,
    pub revision: Revision,
}
