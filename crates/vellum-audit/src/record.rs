//! The audit record.

use serde::{Deserialize, Serialize};
use vellum_core::{
    AccessDecision, CorrelationId, FieldOutcome, Identity, OperationId, OperationKind,
    OperationState, RecordId, SubjectId, Timestamp,
};

/// How the audited operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// Refused by access control. No write happened.
    Denied,
    Failure { reason: String },
}

/// One append-only audit entry.
///
/// Field values, plaintext or ciphertext, are never part of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: Timestamp,
    pub operation_id: OperationId,
    pub correlation_id: CorrelationId,
    pub subject: SubjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub schema: String,
    /// Absent when the operation failed before its schema resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    pub kind: OperationKind,
    pub fields: Vec<FieldOutcome>,
    pub outcome: AuditOutcome,
    /// Last pipeline state the operation reached.
    pub phase: OperationState,
    /// Written after the original audit attempt was interrupted.
    #[serde(default)]
    pub compensating: bool,
}

impl AuditRecord {
    /// Start a record for an operation. Defaults to success at `Received`.
    pub fn new(
        operation_id: OperationId,
        correlation_id: CorrelationId,
        identity: &Identity,
        schema: impl Into<String>,
        schema_version: Option<u32>,
        kind: OperationKind,
    ) -> Self {
        Self {
            timestamp: Timestamp::now(),
            operation_id,
            correlation_id,
            subject: identity.subject().clone(),
            tenant: identity.tenant().map(str::to_string),
            schema: schema.into(),
            schema_version,
            record_id: None,
            kind,
            fields: Vec::new(),
            outcome: AuditOutcome::Success,
            phase: OperationState::Received,
            compensating: false,
        }
    }

    pub fn with_record(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldOutcome>) -> Self {
        self.fields = fields;
        self
    }

    pub fn at_phase(mut self, phase: OperationState) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Mark as the compensating entry for an interrupted audit.
    pub fn compensating(mut self) -> Self {
        self.compensating = true;
        self
    }

    /// Whether any field outcome is a `Deny`.
    pub fn has_denial(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.decision == AccessDecision::Deny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::{CanonicalBytes, Role};

    fn record() -> AuditRecord {
        let identity = Identity::new(SubjectId::new("alice").unwrap(), [Role::new("user").unwrap()])
            .unwrap()
            .with_tenant("acme");
        AuditRecord::new(
            OperationId::new(),
            CorrelationId::new("req-1"),
            &identity,
            "article",
            Some(2),
            OperationKind::Create,
        )
    }

    #[test]
    fn carries_identity_and_target() {
        let r = record().with_record(RecordId::new("a-1").unwrap());
        assert_eq!(r.subject.as_str(), "alice");
        assert_eq!(r.tenant.as_deref(), Some("acme"));
        assert_eq!(r.schema_version, Some(2));
        assert_eq!(r.record_id.as_ref().map(RecordId::as_str), Some("a-1"));
    }

    #[test]
    fn denial_detection() {
        let r = record().with_fields(vec![
            FieldOutcome::new("title", AccessDecision::Allow),
            FieldOutcome::new("content", AccessDecision::Deny),
        ]);
        assert!(r.has_denial());
    }

    #[test]
    fn canonicalizes_without_floats() {
        let r = record()
            .with_outcome(AuditOutcome::Failure {
                reason: "storage".into(),
            })
            .at_phase(OperationState::Encoded);
        assert!(CanonicalBytes::new(&r).is_ok());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["outcome"]["status"], "failure");
        assert_eq!(json["phase"], "encoded");
    }
}
