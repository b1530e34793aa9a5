//! Per-field access evaluation.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use vellum_core::{AccessDecision, FieldNote, FieldOutcome, Identity, OperationKind, Role};
use vellum_schema::{Field, Payload, Schema};

// ---------------------------------------------------------------------------
// AccessReport
// ---------------------------------------------------------------------------

/// Outcomes for every field an operation touched, parents before children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    outcomes: Vec<FieldOutcome>,
}

impl AccessReport {
    pub fn outcomes(&self) -> &[FieldOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<FieldOutcome> {
        self.outcomes
    }

    /// Paths whose decision is `Deny`.
    pub fn denied(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.decision == AccessDecision::Deny)
            .map(|o| o.path.clone())
            .collect()
    }

    pub fn is_denied(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.decision == AccessDecision::Deny)
    }

    /// Whether any field was left out of a read, by access or by decryption.
    pub fn any_redacted(&self) -> bool {
        self.outcomes.iter().any(FieldOutcome::is_redacted)
    }

    /// Whether the super-admin role granted access anywhere.
    pub fn bypassed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.notes.contains(&FieldNote::SuperAdminBypass))
    }

    pub fn decision(&self, path: &str) -> Option<AccessDecision> {
        self.outcome(path).map(|o| o.decision)
    }

    pub fn outcome(&self, path: &str) -> Option<&FieldOutcome> {
        self.outcomes.iter().find(|o| o.path == path)
    }

    /// Attach a note to the outcome at `path`. Returns false if absent.
    pub fn note(&mut self, path: &str, note: FieldNote) -> bool {
        match self.outcomes.iter_mut().find(|o| o.path == path) {
            Some(outcome) => {
                outcome.note(note);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// AccessEvaluator
// ---------------------------------------------------------------------------

/// Effective rule for one field after inheritance.
struct Rule<'a> {
    allow: &'a BTreeSet<Role>,
    deny: BTreeSet<Role>,
}

impl<'a> Rule<'a> {
    fn root(schema: &'a Schema) -> Self {
        Self {
            allow: schema.roles(),
            deny: BTreeSet::new(),
        }
    }

    fn child(&self, field: &'a Field) -> Rule<'a> {
        let allow = if field.roles.is_empty() {
            self.allow
        } else {
            &field.roles
        };
        let mut deny = self.deny.clone();
        deny.extend(field.deny_roles.iter().cloned());
        Rule { allow, deny }
    }
}

/// Stateless field-level access evaluator.
#[derive(Debug, Clone, Default)]
pub struct AccessEvaluator {
    super_admin: Option<Role>,
}

impl AccessEvaluator {
    /// An evaluator with an optional super-admin role.
    pub fn new(super_admin: Option<Role>) -> Self {
        Self { super_admin }
    }

    pub fn super_admin(&self) -> Option<&Role> {
        self.super_admin.as_ref()
    }

    /// Decide one field addressed by dotted path.
    ///
    /// Paths that do not name a declared field are refused.
    pub fn evaluate(
        &self,
        identity: &Identity,
        schema: &Schema,
        path: &str,
        kind: OperationKind,
    ) -> AccessDecision {
        self.evaluate_path(identity, schema, path, kind).decision
    }

    /// Like [`evaluate`](Self::evaluate), with notes.
    pub fn evaluate_path(
        &self,
        identity: &Identity,
        schema: &Schema,
        path: &str,
        kind: OperationKind,
    ) -> FieldOutcome {
        let mut rule = Rule::root(schema);
        let mut fields = schema.fields();
        for part in path.split('.') {
            match fields.iter().find(|f| f.name == part) {
                Some(field) => {
                    rule = rule.child(field);
                    fields = &field.fields;
                }
                None => return FieldOutcome::new(path, refusal(kind)),
            }
        }
        self.decide(identity, &rule, path, kind)
    }

    /// Evaluate every field present in `payload`, recursing into composite
    /// values whose parent is allowed.
    ///
    /// Keys the schema does not declare are refused.
    pub fn evaluate_payload(
        &self,
        identity: &Identity,
        schema: &Schema,
        payload: &Payload,
        kind: OperationKind,
    ) -> AccessReport {
        let mut report = AccessReport::default();
        self.walk(
            identity,
            schema.fields(),
            payload,
            &Rule::root(schema),
            "",
            kind,
            &mut report,
        );
        report
    }

    /// Evaluate every top-level field of the schema, as a delete does.
    pub fn evaluate_all(
        &self,
        identity: &Identity,
        schema: &Schema,
        kind: OperationKind,
    ) -> AccessReport {
        let root = Rule::root(schema);
        let outcomes = schema
            .fields()
            .iter()
            .map(|field| self.decide(identity, &root.child(field), &field.name, kind))
            .collect();
        AccessReport { outcomes }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        identity: &Identity,
        fields: &[Field],
        payload: &Payload,
        parent: &Rule<'_>,
        prefix: &str,
        kind: OperationKind,
        report: &mut AccessReport,
    ) {
        for field in fields {
            let Some(value) = payload.get(&field.name) else {
                continue;
            };
            let path = join(prefix, &field.name);
            let rule = parent.child(field);
            let outcome = self.decide(identity, &rule, &path, kind);
            let descend = outcome.decision.is_allow();
            report.outcomes.push(outcome);

            if let (true, Value::Object(inner)) = (descend, value) {
                self.walk(identity, &field.fields, inner, &rule, &path, kind, report);
            }
        }

        for key in payload.keys() {
            if !fields.iter().any(|f| &f.name == key) {
                report
                    .outcomes
                    .push(FieldOutcome::new(join(prefix, key), refusal(kind)));
            }
        }
    }

    fn decide(
        &self,
        identity: &Identity,
        rule: &Rule<'_>,
        path: &str,
        kind: OperationKind,
    ) -> FieldOutcome {
        if let Some(admin) = &self.super_admin {
            if identity.holds(admin) {
                let mut outcome = FieldOutcome::new(path, AccessDecision::Allow);
                outcome.note(FieldNote::SuperAdminBypass);
                return outcome;
            }
        }

        let allowed = identity.holds_any(rule.allow);
        let denied = identity.holds_any(&rule.deny);
        let decision = if allowed && !denied {
            AccessDecision::Allow
        } else {
            refusal(kind)
        };
        FieldOutcome::new(path, decision)
    }
}

/// Refusal is fail-closed for writes and per-field redaction for reads.
fn refusal(kind: OperationKind) -> AccessDecision {
    if kind.is_mutating() {
        AccessDecision::Deny
    } else {
        AccessDecision::AllowRedacted
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
