//! # Operation Vocabulary
//!
//! Shared names for what an operation is, where in the pipeline it got to,
//! and what happened to each field it touched.
//!
//! ## Pipeline States
//!
//! ```text
//! Received ──▶ Validated ──▶ AccessChecked ──▶ Encoded ──▶ Persisted ──▶ Audited ──▶ Complete
//!     │            │               │              │            │
//!     └────────────┴───────────────┴──────────────┴────────────┴──▶ Failed
//!                                                              │
//!                                                              └──▶ Incomplete
//! ```
//!
//! States only move forward. Reads and deletes skip the states that do not
//! apply to them (a delete has nothing to encode), which is why
//! [`OperationState::can_advance_to`] accepts any forward jump rather than
//! only the immediate successor.

use serde::{Deserialize, Serialize};

// ─── Operation Kind ──────────────────────────────────────────────────

/// The four content operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a new record.
    Create,
    /// Read an existing record.
    Read,
    /// Patch an existing record.
    Update,
    /// Delete an existing record.
    Delete,
}

impl OperationKind {
    /// Whether the operation changes stored content.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Operation State ─────────────────────────────────────────────────

/// Position of an operation in the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Request accepted, schema resolved.
    Received,
    /// Payload validated against the schema.
    Validated,
    /// Every touched field evaluated by the access evaluator.
    AccessChecked,
    /// Marked fields encrypted (write) or decrypted (read).
    Encoded,
    /// Storage collaborator confirmed the write.
    Persisted,
    /// Audit record appended.
    Audited,
    /// Terminal: all steps finished.
    Complete,
    /// Terminal: the write is durable but auditing was interrupted.
    Incomplete,
    /// Terminal: the operation failed.
    Failed,
}

impl OperationState {
    fn ordinal(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Validated => 1,
            Self::AccessChecked => 2,
            Self::Encoded => 3,
            Self::Persisted => 4,
            Self::Audited => 5,
            Self::Complete | Self::Incomplete => 6,
            Self::Failed => 7,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Incomplete | Self::Failed)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// `Failed` is reachable from every non-terminal state. `Incomplete`
    /// is only reachable once the write is durable.
    pub fn can_advance_to(&self, next: OperationState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Incomplete => *self == Self::Persisted,
            _ => next.ordinal() > self.ordinal(),
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::AccessChecked => "access_checked",
            Self::Encoded => "encoded",
            Self::Persisted => "persisted",
            Self::Audited => "audited",
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Access Decisions ────────────────────────────────────────────────

/// Outcome of evaluating one field for one identity and operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    /// The field may be read or written.
    Allow,
    /// The write must not proceed.
    Deny,
    /// The read proceeds but the field is omitted from the response.
    AllowRedacted,
}

impl AccessDecision {
    /// Whether the field's value may be exposed or written.
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::AllowRedacted => "allow_redacted",
        })
    }
}

/// Extra facts recorded against a field outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldNote {
    /// Access was granted by the super-admin role.
    SuperAdminBypass,
    /// The value was encrypted before persistence.
    Encrypted,
    /// The value was decrypted for the response.
    Decrypted,
    /// Decryption failed; the field was redacted.
    DecryptionFailed,
}

/// What happened to one field (or composite sub-field) in an operation.
///
/// Never carries the field's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOutcome {
    /// Dotted path, e.g. `address.city`.
    pub path: String,
    /// The access decision.
    pub decision: AccessDecision,
    /// Additional facts, in the order they happened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<FieldNote>,
}

impl FieldOutcome {
    /// An outcome without notes.
    pub fn new(path: impl Into<String>, decision: AccessDecision) -> Self {
        Self {
            path: path.into(),
            decision,
            notes: Vec::new(),
        }
    }

    /// Append a note.
    pub fn note(&mut self, note: FieldNote) {
        self.notes.push(note);
    }

    /// Whether the field was left out of a read response.
    pub fn is_redacted(&self) -> bool {
        self.decision == AccessDecision::AllowRedacted
            || self.notes.contains(&FieldNote::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        use OperationState::*;
        assert!(Received.can_advance_to(Validated));
        assert!(Received.can_advance_to(AccessChecked));
        assert!(Persisted.can_advance_to(Audited));
        assert!(!Audited.can_advance_to(Persisted));
        assert!(!Validated.can_advance_to(Validated));
    }

    #[test]
    fn failed_reachable_from_any_live_state() {
        use OperationState::*;
        for s in [Received, Validated, AccessChecked, Encoded, Persisted, Audited] {
            assert!(s.can_advance_to(Failed), "{s} -> failed");
        }
        assert!(!Complete.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn incomplete_only_after_persist() {
        use OperationState::*;
        assert!(Persisted.can_advance_to(Incomplete));
        assert!(!Encoded.can_advance_to(Incomplete));
        assert!(!Audited.can_advance_to(Incomplete));
    }

    #[test]
    fn mutating_kinds() {
        assert!(OperationKind::Create.is_mutating());
        assert!(OperationKind::Update.is_mutating());
        assert!(OperationKind::Delete.is_mutating());
        assert!(!OperationKind::Read.is_mutating());
    }

    #[test]
    fn outcome_serialization_omits_empty_notes() {
        let o = FieldOutcome::new("title", AccessDecision::Allow);
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json, serde_json::json!({"path": "title", "decision": "allow"}));
    }

    #[test]
    fn decryption_failure_counts_as_redaction() {
        let mut o = FieldOutcome::new("secret", AccessDecision::Allow);
        assert!(!o.is_redacted());
        o.note(FieldNote::DecryptionFailed);
        assert!(o.is_redacted());
    }
}
