//! # Content Operation Orchestrator
//!
//! One pipeline for create, read, update and delete:
//!
//! ```text
//! Received ─▶ Validated ─▶ AccessChecked ─▶ Encoded ─▶ Persisted ─▶ Audited ─▶ Complete
//! ```
//!
//! Any step may end in `Failed`. Reads skip validation and persistence;
//! deletes skip validation and encoding.
//!
//! ## Write path
//!
//! 1. `BeforeValidate` hooks (may edit the payload), then validation.
//! 2. `AfterValidate` hooks, then per-field access evaluation. Any `Deny`
//!    fails the whole operation before anything is written.
//! 3. `BeforePersist` hooks (may edit the payload). Edited payloads are
//!    validated and access-checked again.
//! 4. Encrypted fields are sealed. Plaintext never reaches storage.
//! 5. Under the `abort` policy the audit sink is probed, then the store
//!    write runs under the operation deadline and cancel signal.
//! 6. The audit record is written, then `AfterPersist`/`AfterDelete` hooks
//!    run; their failures are logged only.
//!
//! ## Audit guarantees
//!
//! Every mutating operation produces one audit record, success or failure,
//! including access denials. Reads are audited when a field was redacted,
//! a super-admin bypass applied, or the schema asks for it. If auditing a
//! durable write is interrupted, the report is `Incomplete` and a
//! compensating record is written from a background task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;
use vellum_access::{redact, AccessEvaluator, AccessReport};
use vellum_audit::{
    AuditFailurePolicy, AuditOutcome, AuditRecord, AuditRecorder, AuditSink,
};
use vellum_core::{
    CoreError, FieldNote, FieldOutcome, Identity, OperationId, OperationKind, OperationState,
    RecordId, Role,
};
use vellum_crypto::{CryptoError, FieldCodec};
use vellum_schema::{
    validate, validate_patch, Field, FieldType, Payload, Schema, SchemaDefinition, SchemaError,
    SchemaRegistry,
};

use crate::cancel::{bounded, OperationContext};
use crate::config::{resolve_identity, EngineConfig};
use crate::error::EngineError;
use crate::hooks::{Dispatch, HookDispatcher, HookFailure, HookPhase};
use crate::report::{
    AuditStatus, ContentRecord, Deleted, OperationFailure, OperationReport, OperationResult,
    Written,
};
use crate::storage::{ContentStore, Precondition, Revision, StorageError, StoredRecord};

// ---------------------------------------------------------------------------
// Operation tracking
// ---------------------------------------------------------------------------

/// Per-operation bookkeeping.
struct Op<'c> {
    id: OperationId,
    kind: OperationKind,
    ctx: &'c OperationContext,
    deadline: Instant,
    schema_name: String,
    schema: Option<Arc<Schema>>,
    record_id: Option<RecordId>,
    state: OperationState,
    fields: Vec<FieldOutcome>,
}

impl<'c> Op<'c> {
    fn advance(&mut self, next: OperationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn identity(&self) -> &'c Identity {
        self.ctx.identity()
    }

    /// Await `fut` within the deadline and cancel signal.
    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, EngineError> {
        bounded(self.deadline, self.ctx.cancel_signal(), fut)
            .await
            .map_err(EngineError::Interrupted)
    }

    fn dispatch<'a>(&'a self, schema: &'a Schema) -> Dispatch<'a> {
        Dispatch {
            operation_id: self.id,
            kind: self.kind,
            schema,
            identity: self.ctx.identity(),
            record_id: self.record_id.as_ref(),
        }
    }

    fn storage_error(&self, e: StorageError) -> EngineError {
        let record = self.record_id.clone().unwrap_or_else(RecordId::generate);
        match e {
            StorageError::NotFound => EngineError::NotFound {
                schema: self.schema_name.clone(),
                record,
            },
            StorageError::Conflict { .. } => EngineError::Conflict {
                schema: self.schema_name.clone(),
                record,
            },
            StorageError::Backend(msg) => EngineError::Storage(msg),
        }
    }

    fn audit_record(&self, outcome: AuditOutcome) -> AuditRecord {
        let record = AuditRecord::new(
            self.id,
            self.ctx.correlation_id().clone(),
            self.ctx.identity(),
            &self.schema_name,
            self.schema.as_ref().map(|s| s.version()),
            self.kind,
        )
        .with_fields(self.fields.clone())
        .at_phase(self.state)
        .with_outcome(outcome);
        match &self.record_id {
            Some(id) => record.with_record(id.clone()),
            None => record,
        }
    }
}

/// Why a pipeline stopped.
enum Halt {
    /// Fail and audit the failure (mutating operations).
    Fail(EngineError),
    /// Fail; the audit status is already settled.
    Settled(EngineError, AuditStatus),
}

impl From<EngineError> for Halt {
    fn from(e: EngineError) -> Self {
        Halt::Fail(e)
    }
}

impl From<SchemaError> for Halt {
    fn from(e: SchemaError) -> Self {
        Halt::Fail(e.into())
    }
}

fn aborted(f: HookFailure) -> EngineError {
    EngineError::HookAborted {
        phase: f.phase,
        hook: f.hook,
        reason: f.reason,
    }
}

/// A pipeline that reached its end.
struct Settled<T> {
    value: T,
    audit: AuditStatus,
    warnings: Vec<String>,
}

enum AuditAttempt {
    Failed(String),
    Interrupted(EngineError),
}

// ---------------------------------------------------------------------------
// ContentEngine
// ---------------------------------------------------------------------------

/// The entry point for content operations.
///
/// Owns the schema registry, hook dispatcher, access evaluator and codec.
/// Share it behind an `Arc`; every method takes `&self`.
pub struct ContentEngine {
    registry: SchemaRegistry,
    access: AccessEvaluator,
    codec: FieldCodec,
    recorder: AuditRecorder,
    audit_policy: AuditFailurePolicy,
    hooks: HookDispatcher,
    store: Arc<dyn ContentStore>,
    operation_timeout: Duration,
    default_role: Option<Role>,
}

impl ContentEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ContentStore>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        let EngineConfig {
            roles,
            super_admin_role,
            default_role,
            master_secret,
            audit_failure_policy,
            operation_timeout,
            audit_retry_backoff,
        } = config;
        tracing::info!(
            roles = roles.len(),
            audit_failure_policy = %audit_failure_policy,
            super_admin = super_admin_role.is_some(),
            "content engine initialised"
        );
        Self {
            registry: SchemaRegistry::new(roles),
            access: AccessEvaluator::new(super_admin_role),
            codec: FieldCodec::new(master_secret),
            recorder: AuditRecorder::new(audit_sink, audit_retry_backoff),
            audit_policy: audit_failure_policy,
            hooks: HookDispatcher::new(),
            store,
            operation_timeout,
            default_role,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    pub fn audit_policy(&self) -> AuditFailurePolicy {
        self.audit_policy
    }

    /// Publish a schema definition as the next version of its name.
    pub fn publish(&self, definition: &SchemaDefinition) -> Result<Arc<Schema>, EngineError> {
        Ok(self.registry.publish(definition)?)
    }

    /// Retire a schema version. Content written under it stays readable.
    pub fn deactivate(&self, schema: &str, version: u32) -> Result<(), EngineError> {
        Ok(self.registry.deactivate(schema, version)?)
    }

    /// Build an identity, substituting the configured default role when
    /// `roles` is empty.
    pub fn identity(
        &self,
        subject: &str,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<Identity, CoreError> {
        resolve_identity(self.default_role.as_ref(), subject, roles)
    }

    // ── Public operations ──────────────────────────────────────────

    /// Create a record. A generated id is used when `id` is `None`.
    pub async fn create(
        &self,
        ctx: &OperationContext,
        schema: &str,
        id: Option<RecordId>,
        payload: Payload,
    ) -> OperationResult<Written> {
        let mut op = self.begin(ctx, OperationKind::Create, schema);
        op.record_id = Some(id.unwrap_or_else(RecordId::generate));
        let span = span(&op);
        async move {
            let result = self.create_steps(&mut op, payload).await;
            self.finish(op, result).await
        }
        .instrument(span)
        .await
    }

    /// Read a record with every field the identity may not see removed.
    pub async fn read(
        &self,
        ctx: &OperationContext,
        schema: &str,
        id: &RecordId,
    ) -> OperationResult<ContentRecord> {
        let mut op = self.begin(ctx, OperationKind::Read, schema);
        op.record_id = Some(id.clone());
        let span = span(&op);
        async move {
            let result = self.read_steps(&mut op).await;
            self.finish(op, result).await
        }
        .instrument(span)
        .await
    }

    /// Apply a partial update. `expected` pins the revision the caller read.
    pub async fn update(
        &self,
        ctx: &OperationContext,
        schema: &str,
        id: &RecordId,
        patch: Payload,
        expected: Option<Revision>,
    ) -> OperationResult<Written> {
        let mut op = self.begin(ctx, OperationKind::Update, schema);
        op.record_id = Some(id.clone());
        let span = span(&op);
        async move {
            let result = self.update_steps(&mut op, patch, expected).await;
            self.finish(op, result).await
        }
        .instrument(span)
        .await
    }

    /// Delete a record. Requires write access to every top-level field.
    pub async fn delete(
        &self,
        ctx: &OperationContext,
        schema: &str,
        id: &RecordId,
        expected: Option<Revision>,
    ) -> OperationResult<Deleted> {
        let mut op = self.begin(ctx, OperationKind::Delete, schema);
        op.record_id = Some(id.clone());
        let span = span(&op);
        async move {
            let result = self.delete_steps(&mut op, expected).await;
            self.finish(op, result).await
        }
        .instrument(span)
        .await
    }

    // ── Pipelines ──────────────────────────────────────────────────

    async fn create_steps(
        &self,
        op: &mut Op<'_>,
        payload: Payload,
    ) -> Result<Settled<Written>, Halt> {
        let schema = self.registry.resolve_active(&op.schema_name, None)?;
        op.schema = Some(Arc::clone(&schema));

        let (visible, mut encoded, mut report) = self.prepare_write(op, &schema, payload, false)?;
        let sealed = self.seal(&schema, schema.fields(), &mut encoded, "", &mut report);
        op.fields = report.into_outcomes();
        sealed.map_err(EngineError::from)?;
        op.advance(OperationState::Encoded);

        self.preflight(op).await?;
        let Some(record_id) = op.record_id.clone() else {
            return Err(EngineError::Storage("record id missing".into()).into());
        };
        let revision = match op
            .bounded(self.store.put(
                schema.name(),
                schema.version(),
                &record_id,
                &encoded,
                Precondition::MustNotExist,
            ))
            .await?
        {
            Ok(revision) => revision,
            Err(e) => return Err(self.storage_failed(op, &schema, visible, e)),
        };

        let written = Written {
            record_id,
            schema_version: schema.version(),
            revision,
        };
        self.settle(op, &schema, visible, HookPhase::AfterPersist, written)
            .await
    }

    async fn read_steps(&self, op: &mut Op<'_>) -> Result<Settled<ContentRecord>, Halt> {
        let (schema, record_id, stored) = self.load(op).await?;

        let identity = op.identity();
        let mut fields = stored.fields;
        let first = self
            .access
            .evaluate_payload(identity, &schema, &fields, OperationKind::Read);
        let notes = self.open(&schema, schema.fields(), &mut fields, "", &first);
        // Decrypted composites expose sub-fields; evaluate them too.
        let mut report = self
            .access
            .evaluate_payload(identity, &schema, &fields, OperationKind::Read);
        for (path, note) in notes {
            report.note(&path, note);
        }
        op.advance(OperationState::AccessChecked);

        let removed = redact(&mut fields, &report);
        if !removed.is_empty() {
            tracing::debug!(redacted = ?removed, "fields redacted from read");
        }
        op.advance(OperationState::Encoded);

        let must_audit = report.any_redacted() || report.bypassed() || schema.audit();
        op.fields = report.into_outcomes();

        let value = ContentRecord {
            record_id,
            schema_version: schema.version(),
            revision: stored.revision,
            fields,
        };
        if !must_audit {
            return Ok(Settled {
                value,
                audit: AuditStatus::NotRequired,
                warnings: Vec::new(),
            });
        }

        let record = op.audit_record(AuditOutcome::Success);
        match self.try_audit(op, &record).await {
            Ok(()) => {
                op.advance(OperationState::Audited);
                Ok(Settled {
                    value,
                    audit: AuditStatus::Recorded,
                    warnings: Vec::new(),
                })
            }
            Err(AuditAttempt::Failed(reason)) => match self.audit_policy {
                AuditFailurePolicy::Abort => Err(Halt::Settled(
                    EngineError::AuditUnavailable(reason.clone()),
                    AuditStatus::Unavailable { reason },
                )),
                AuditFailurePolicy::Degrade => Ok(Settled {
                    value,
                    warnings: vec![format!("audit degraded: {reason}")],
                    audit: AuditStatus::Degraded { reason },
                }),
            },
            Err(AuditAttempt::Interrupted(error)) => {
                self.spawn_compensating(record.compensating());
                Err(Halt::Settled(error, AuditStatus::Compensating))
            }
        }
    }

    async fn update_steps(
        &self,
        op: &mut Op<'_>,
        patch: Payload,
        expected: Option<Revision>,
    ) -> Result<Settled<Written>, Halt> {
        let (schema, record_id, stored) = self.load(op).await?;
        if let Some(stale) = expected.filter(|rev| *rev != stored.revision) {
            tracing::debug!(expected = %stale, found = %stored.revision, "stale revision");
            return Err(op
                .storage_error(StorageError::Conflict {
                    expected: Precondition::Revision(stale),
                    found: Some(stored.revision),
                })
                .into());
        }

        let (visible, mut encoded, mut report) = self.prepare_write(op, &schema, patch, true)?;
        let sealed = self.seal(&schema, schema.fields(), &mut encoded, "", &mut report);
        op.fields = report.into_outcomes();
        sealed.map_err(EngineError::from)?;

        let mut merged = stored.fields;
        for (name, value) in encoded {
            if value.is_null() {
                merged.remove(&name);
            } else {
                merged.insert(name, value);
            }
        }
        op.advance(OperationState::Encoded);

        self.preflight(op).await?;
        let revision = match op
            .bounded(self.store.put(
                schema.name(),
                schema.version(),
                &record_id,
                &merged,
                Precondition::Revision(stored.revision),
            ))
            .await?
        {
            Ok(revision) => revision,
            Err(e) => return Err(self.storage_failed(op, &schema, visible, e)),
        };

        let written = Written {
            record_id,
            schema_version: schema.version(),
            revision,
        };
        self.settle(op, &schema, visible, HookPhase::AfterPersist, written)
            .await
    }

    async fn delete_steps(
        &self,
        op: &mut Op<'_>,
        expected: Option<Revision>,
    ) -> Result<Settled<Deleted>, Halt> {
        let (schema, record_id, stored) = self.load(op).await?;
        if let Some(stale) = expected.filter(|rev| *rev != stored.revision) {
            tracing::debug!(expected = %stale, found = %stored.revision, "stale revision");
            return Err(op
                .storage_error(StorageError::Conflict {
                    expected: Precondition::Revision(stale),
                    found: Some(stored.revision),
                })
                .into());
        }

        let report = self
            .access
            .evaluate_all(op.identity(), &schema, OperationKind::Delete);
        let denied = report.denied();
        op.fields = report.into_outcomes();
        if !denied.is_empty() {
            return Err(EngineError::AccessDenied { fields: denied }.into());
        }
        op.advance(OperationState::AccessChecked);

        let mut snapshot = stored.fields;
        self.hooks
            .run(HookPhase::BeforeDelete, &op.dispatch(&schema), &mut snapshot)
            .map_err(aborted)?;

        self.preflight(op).await?;
        if let Err(e) = op
            .bounded(self.store.delete(
                schema.name(),
                &record_id,
                Precondition::Revision(stored.revision),
            ))
            .await?
        {
            return Err(self.storage_failed(op, &schema, snapshot, e));
        }

        let deleted = Deleted {
            record_id,
            revision: stored.revision,
        };
        self.settle(op, &schema, snapshot, HookPhase::AfterDelete, deleted)
            .await
    }

    // ── Shared steps ───────────────────────────────────────────────

    fn begin<'c>(&self, ctx: &'c OperationContext, kind: OperationKind, schema: &str) -> Op<'c> {
        Op {
            id: OperationId::new(),
            kind,
            ctx,
            deadline: ctx
                .deadline()
                .unwrap_or_else(|| Instant::now() + self.operation_timeout),
            schema_name: schema.to_string(),
            schema: None,
            record_id: None,
            state: OperationState::Received,
            fields: Vec::new(),
        }
    }

    /// Fetch an existing record and the schema version it was written under.
    async fn load(
        &self,
        op: &mut Op<'_>,
    ) -> Result<(Arc<Schema>, RecordId, StoredRecord), Halt> {
        if self.registry.versions(&op.schema_name).is_empty() {
            return Err(SchemaError::NotFound {
                name: op.schema_name.clone(),
                version: None,
            }
            .into());
        }
        let Some(record_id) = op.record_id.clone() else {
            return Err(EngineError::Storage("record id missing".into()).into());
        };
        let stored = op
            .bounded(self.store.get(&op.schema_name, &record_id))
            .await?
            .map_err(|e| op.storage_error(e))?;
        let schema = self
            .registry
            .resolve(&op.schema_name, Some(stored.schema_version))?;
        op.schema = Some(Arc::clone(&schema));
        Ok((schema, record_id, stored))
    }

    /// Hooks, validation and access up to `AccessChecked`.
    ///
    /// Returns the plaintext payload twice (one copy to encode, one for
    /// post-write hooks) and the access report.
    fn prepare_write(
        &self,
        op: &mut Op<'_>,
        schema: &Schema,
        mut payload: Payload,
        patch: bool,
    ) -> Result<(Payload, Payload, AccessReport), EngineError> {
        let check = |payload: &Payload| {
            let v = if patch {
                validate_patch(schema, payload)
            } else {
                validate(schema, payload)
            };
            v.into_result().map_err(EngineError::ValidationFailed)
        };

        self.hooks
            .run(HookPhase::BeforeValidate, &op.dispatch(schema), &mut payload)
            .map_err(aborted)?;
        let mut normalized = check(&payload)?;
        op.advance(OperationState::Validated);

        self.hooks
            .run(HookPhase::AfterValidate, &op.dispatch(schema), &mut normalized)
            .map_err(aborted)?;
        let mut report = self.check_access(op, schema, &normalized)?;
        op.advance(OperationState::AccessChecked);

        let changed = self
            .hooks
            .run(HookPhase::BeforePersist, &op.dispatch(schema), &mut normalized)
            .map_err(aborted)?;
        if changed {
            normalized = check(&normalized)?;
            report = self.check_access(op, schema, &normalized)?;
        }
        Ok((normalized.clone(), normalized, report))
    }

    fn check_access(
        &self,
        op: &mut Op<'_>,
        schema: &Schema,
        payload: &Payload,
    ) -> Result<AccessReport, EngineError> {
        let report = self
            .access
            .evaluate_payload(op.identity(), schema, payload, op.kind);
        op.fields = report.outcomes().to_vec();
        let denied = report.denied();
        if denied.is_empty() {
            Ok(report)
        } else {
            Err(EngineError::AccessDenied { fields: denied })
        }
    }

    /// Seal every encrypted field present in `payload`, recursing into
    /// plain composites.
    fn seal(
        &self,
        schema: &Schema,
        fields: &[Field],
        payload: &mut Payload,
        prefix: &str,
        report: &mut AccessReport,
    ) -> Result<(), CryptoError> {
        for field in fields {
            let Some(value) = payload.get_mut(&field.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let path = join(prefix, &field.name);
            if field.encrypted {
                *value = self.codec.encrypt(schema.name(), &path, value)?;
                report.note(&path, FieldNote::Encrypted);
            } else if let (FieldType::Composite, Value::Object(inner)) = (field.field_type, value) {
                self.seal(schema, &field.fields, inner, &path, report)?;
            }
        }
        Ok(())
    }

    /// Decrypt every allowed encrypted field in place. Returns notes to
    /// attach by path; a failed field keeps its envelope and is redacted
    /// later.
    fn open(
        &self,
        schema: &Schema,
        fields: &[Field],
        payload: &mut Payload,
        prefix: &str,
        report: &AccessReport,
    ) -> Vec<(String, FieldNote)> {
        let mut notes = Vec::new();
        for field in fields {
            let Some(value) = payload.get_mut(&field.name) else {
                continue;
            };
            let path = join(prefix, &field.name);
            if !matches!(report.decision(&path), Some(d) if d.is_allow()) {
                continue;
            }
            if field.encrypted {
                match self.codec.decrypt(schema.name(), &path, value) {
                    Ok(plain) => {
                        *value = plain;
                        notes.push((path, FieldNote::Decrypted));
                    }
                    Err(e) => {
                        tracing::warn!(field = %path, error = %e, "field redacted after decryption failure");
                        notes.push((path, FieldNote::DecryptionFailed));
                    }
                }
            } else if let (FieldType::Composite, Value::Object(inner)) = (field.field_type, value) {
                notes.extend(self.open(schema, &field.fields, inner, &path, report));
            }
        }
        notes
    }

    /// Under `abort`, refuse to write while the audit trail is down.
    async fn preflight(&self, op: &Op<'_>) -> Result<(), EngineError> {
        if self.audit_policy != AuditFailurePolicy::Abort {
            return Ok(());
        }
        op.bounded(self.recorder.health_check())
            .await?
            .map_err(|e| EngineError::AuditUnavailable(e.to_string()))
    }

    /// Signal `PersistFailed` hooks and map the storage error.
    fn storage_failed(
        &self,
        op: &Op<'_>,
        schema: &Schema,
        mut payload: Payload,
        e: StorageError,
    ) -> Halt {
        self.hooks
            .run_best_effort(HookPhase::PersistFailed, &op.dispatch(schema), &mut payload);
        Halt::Fail(op.storage_error(e))
    }

    /// `Persisted → Audited → Complete`, or `Incomplete` if auditing the
    /// durable write was interrupted.
    async fn settle<T>(
        &self,
        op: &mut Op<'_>,
        schema: &Schema,
        mut payload: Payload,
        after: HookPhase,
        value: T,
    ) -> Result<Settled<T>, Halt> {
        op.advance(OperationState::Persisted);
        let record = op.audit_record(AuditOutcome::Success);
        let mut warnings = Vec::new();

        let audit = match self.try_audit(op, &record).await {
            Ok(()) => {
                op.advance(OperationState::Audited);
                AuditStatus::Recorded
            }
            Err(AuditAttempt::Failed(reason)) => match self.audit_policy {
                AuditFailurePolicy::Abort => {
                    self.hooks.run_best_effort(
                        HookPhase::PersistFailed,
                        &op.dispatch(schema),
                        &mut payload,
                    );
                    return Err(Halt::Settled(
                        EngineError::AuditUnavailable(reason.clone()),
                        AuditStatus::Unavailable { reason },
                    ));
                }
                AuditFailurePolicy::Degrade => {
                    tracing::warn!(reason = %reason, "write stands without audit record");
                    warnings.push(format!("audit degraded: {reason}"));
                    AuditStatus::Degraded { reason }
                }
            },
            Err(AuditAttempt::Interrupted(error)) => {
                self.spawn_compensating(record.compensating());
                op.advance(OperationState::Incomplete);
                warnings.push(format!("audit {error}; compensating entry scheduled"));
                return Ok(Settled {
                    value,
                    audit: AuditStatus::Compensating,
                    warnings,
                });
            }
        };

        self.hooks
            .run_best_effort(after, &op.dispatch(schema), &mut payload);
        Ok(Settled {
            value,
            audit,
            warnings,
        })
    }

    async fn try_audit(&self, op: &Op<'_>, record: &AuditRecord) -> Result<(), AuditAttempt> {
        match op.bounded(self.recorder.record(record)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                metrics::counter!("vellum_audit_failures_total").increment(1);
                Err(AuditAttempt::Failed(e.to_string()))
            }
            Err(interrupted) => Err(AuditAttempt::Interrupted(interrupted)),
        }
    }

    fn spawn_compensating(&self, record: AuditRecord) {
        let recorder = self.recorder.clone();
        tokio::spawn(async move {
            match recorder.record(&record).await {
                Ok(()) => tracing::info!(
                    operation_id = %record.operation_id,
                    "compensating audit recorded"
                ),
                Err(e) => {
                    metrics::counter!("vellum_audit_failures_total").increment(1);
                    tracing::error!(
                        operation_id = %record.operation_id,
                        error = %e,
                        "compensating audit failed"
                    );
                }
            }
        });
    }

    /// Audit a failed mutating operation once.
    async fn audit_failure(&self, op: &Op<'_>, error: &EngineError) -> AuditStatus {
        let outcome = match error {
            EngineError::AccessDenied { .. } => AuditOutcome::Denied,
            other => AuditOutcome::Failure {
                reason: other.to_string(),
            },
        };
        let record = op.audit_record(outcome);
        if matches!(error, EngineError::Interrupted(_)) {
            // The operation's own deadline or signal has already fired.
            self.spawn_compensating(record.compensating());
            return AuditStatus::Compensating;
        }
        match self.try_audit(op, &record).await {
            Ok(()) => AuditStatus::Recorded,
            Err(AuditAttempt::Failed(reason)) => AuditStatus::Unavailable { reason },
            Err(AuditAttempt::Interrupted(_)) => {
                self.spawn_compensating(record.compensating());
                AuditStatus::Compensating
            }
        }
    }

    async fn finish<T>(
        &self,
        mut op: Op<'_>,
        result: Result<Settled<T>, Halt>,
    ) -> OperationResult<T> {
        match result {
            Ok(settled) => {
                if !op.state.is_terminal() {
                    op.advance(OperationState::Complete);
                }
                count(&op, op.state);
                tracing::info!(state = %op.state, audit = ?settled.audit, "operation finished");
                Ok(OperationReport {
                    operation_id: op.id,
                    correlation_id: op.ctx.correlation_id().clone(),
                    state: op.state,
                    audit: settled.audit,
                    fields: op.fields,
                    warnings: settled.warnings,
                    value: settled.value,
                })
            }
            Err(halt) => {
                let (error, audit) = match halt {
                    Halt::Settled(error, audit) => (error, audit),
                    Halt::Fail(error) if op.kind.is_mutating() => {
                        let audit = self.audit_failure(&op, &error).await;
                        (error, audit)
                    }
                    Halt::Fail(error) => (error, AuditStatus::NotRequired),
                };
                count(&op, OperationState::Failed);
                tracing::warn!(
                    phase = %op.state,
                    error = %error,
                    code = error.code(),
                    audit = ?audit,
                    "operation failed"
                );
                Err(OperationFailure {
                    error,
                    operation_id: op.id,
                    correlation_id: op.ctx.correlation_id().clone(),
                    phase: op.state,
                    audit,
                })
            }
        }
    }
}

impl std::fmt::Debug for ContentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEngine")
            .field("schemas", &self.registry.names())
            .field("audit_policy", &self.audit_policy)
            .field("operation_timeout", &self.operation_timeout)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

fn span(op: &Op<'_>) -> tracing::Span {
    tracing::info_span!(
        "content_operation",
        operation_id = %op.id,
        correlation_id = %op.ctx.correlation_id(),
        kind = %op.kind,
        schema = %op.schema_name,
    )
}

fn count(op: &Op<'_>, outcome: OperationState) {
    metrics::counter!(
        "vellum_operations_total",
        "kind" => op.kind.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
