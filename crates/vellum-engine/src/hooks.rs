//! # Lifecycle Hooks
//!
//! Ordered callbacks around a content operation.
//!
//! Hooks for a phase run in ascending priority; equal priorities run in
//! registration order. The first hook that returns a [`HookAbort`] stops
//! the phase. Only `BeforeValidate` and `BeforePersist` hooks may change
//! the payload: [`HookContext::payload_mut`] fails in every other phase.
//!
//! Each dispatcher belongs to one engine. There is no global registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use vellum_core::{Identity, OperationId, OperationKind, RecordId};
use vellum_schema::{Payload, Schema};

/// Points in the pipeline where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    BeforeValidate,
    AfterValidate,
    BeforePersist,
    AfterPersist,
    BeforeDelete,
    AfterDelete,
    /// Storage failed, or the write stood but its audit was aborted.
    PersistFailed,
}

impl HookPhase {
    /// Whether hooks in this phase may change the payload.
    pub fn allows_mutation(&self) -> bool {
        matches!(self, Self::BeforeValidate | Self::BeforePersist)
    }

    /// Whether an abort in this phase fails the operation.
    ///
    /// Phases after the write only log hook failures.
    pub fn can_abort(&self) -> bool {
        !matches!(
            self,
            Self::AfterPersist | Self::AfterDelete | Self::PersistFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeValidate => "before_validate",
            Self::AfterValidate => "after_validate",
            Self::BeforePersist => "before_persist",
            Self::AfterPersist => "after_persist",
            Self::BeforeDelete => "before_delete",
            Self::AfterDelete => "after_delete",
            Self::PersistFailed => "persist_failed",
        }
    }
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which schemas a hook applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookTarget {
    Any,
    Schema(String),
}

impl HookTarget {
    fn matches(&self, schema: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Schema(name) => name == schema,
        }
    }
}

impl From<&str> for HookTarget {
    /// `"*"` is the wildcard.
    fn from(s: &str) -> Self {
        if s == "*" {
            Self::Any
        } else {
            Self::Schema(s.to_string())
        }
    }
}

/// A hook's refusal to let the operation continue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct HookAbort {
    pub reason: String,
}

impl HookAbort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Returned by [`HookContext::payload_mut`] outside the mutable phases.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("payload is read-only during {0}")]
pub struct PayloadLocked(pub HookPhase);

impl From<PayloadLocked> for HookAbort {
    fn from(e: PayloadLocked) -> Self {
        HookAbort::new(e.to_string())
    }
}

/// What a hook sees.
pub struct HookContext<'a> {
    pub operation_id: OperationId,
    pub phase: HookPhase,
    pub kind: OperationKind,
    pub schema: &'a Schema,
    pub identity: &'a Identity,
    pub record_id: Option<&'a RecordId>,
    payload: &'a mut Payload,
    changed: bool,
}

impl HookContext<'_> {
    pub fn payload(&self) -> &Payload {
        &*self.payload
    }

    /// Mutable access to the payload in `BeforeValidate`/`BeforePersist`.
    pub fn payload_mut(&mut self) -> Result<&mut Payload, PayloadLocked> {
        if !self.phase.allows_mutation() {
            return Err(PayloadLocked(self.phase));
        }
        self.changed = true;
        Ok(&mut *self.payload)
    }
}

type Callback = Arc<dyn Fn(&mut HookContext<'_>) -> Result<(), HookAbort> + Send + Sync>;

/// Handle for [`HookDispatcher::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

struct Registration {
    id: HookId,
    name: String,
    phase: HookPhase,
    target: HookTarget,
    priority: i32,
    callback: Callback,
}

/// Inputs shared by every hook of one dispatch.
pub(crate) struct Dispatch<'a> {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub schema: &'a Schema,
    pub identity: &'a Identity,
    pub record_id: Option<&'a RecordId>,
}

/// A hook that stopped its phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HookFailure {
    pub phase: HookPhase,
    pub hook: String,
    pub reason: String,
}

/// Ordered hook registry for one engine.
#[derive(Default)]
pub struct HookDispatcher {
    next_id: AtomicU64,
    hooks: RwLock<Vec<Registration>>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. `target` is a schema name or `"*"`.
    pub fn register<F>(
        &self,
        phase: HookPhase,
        target: impl Into<HookTarget>,
        priority: i32,
        name: impl Into<String>,
        callback: F,
    ) -> HookId
    where
        F: Fn(&mut HookContext<'_>) -> Result<(), HookAbort> + Send + Sync + 'static,
    {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        tracing::debug!(hook = %name, %phase, priority, "hook registered");
        let mut hooks = self.hooks.write();
        hooks.push(Registration {
            id,
            name,
            phase,
            target: target.into(),
            priority,
            callback: Arc::new(callback),
        });
        // Stable sort keeps registration order among equal priorities.
        hooks.sort_by_key(|r| r.priority);
        id
    }

    /// Remove a hook. Returns whether it was registered.
    pub fn unregister(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|r| r.id != id);
        hooks.len() != before
    }

    /// Number of hooks registered for `phase`.
    pub fn count(&self, phase: HookPhase) -> usize {
        self.hooks.read().iter().filter(|r| r.phase == phase).count()
    }

    /// Run every matching hook for `phase` in order.
    ///
    /// Returns whether any hook took mutable access to the payload.
    pub(crate) fn run(
        &self,
        phase: HookPhase,
        dispatch: &Dispatch<'_>,
        payload: &mut Payload,
    ) -> Result<bool, HookFailure> {
        // Snapshot so callbacks can register or unregister without deadlock.
        let selected: Vec<(String, Callback)> = self
            .hooks
            .read()
            .iter()
            .filter(|r| r.phase == phase && r.target.matches(dispatch.schema.name()))
            .map(|r| (r.name.clone(), Arc::clone(&r.callback)))
            .collect();

        let mut changed = false;
        for (name, callback) in selected {
            let mut ctx = HookContext {
                operation_id: dispatch.operation_id,
                phase,
                kind: dispatch.kind,
                schema: dispatch.schema,
                identity: dispatch.identity,
                record_id: dispatch.record_id,
                payload: &mut *payload,
                changed: false,
            };
            let result = callback(&mut ctx);
            changed |= ctx.changed;
            match result {
                Ok(()) => {}
                Err(abort) if !phase.can_abort() => {
                    tracing::warn!(
                        operation_id = %dispatch.operation_id,
                        %phase,
                        hook = %name,
                        reason = %abort.reason,
                        "hook failed after write; operation stands"
                    );
                }
                Err(abort) => {
                    return Err(HookFailure {
                        phase,
                        hook: name,
                        reason: abort.reason,
                    });
                }
            }
        }
        Ok(changed)
    }

    /// Run hooks in a phase that cannot fail the operation.
    pub(crate) fn run_best_effort(
        &self,
        phase: HookPhase,
        dispatch: &Dispatch<'_>,
        payload: &mut Payload,
    ) {
        debug_assert!(!phase.can_abort(), "{phase} hooks can abort");
        // Aborts in these phases are logged by `run` and never surface.
        let _ = self.run(phase, dispatch, payload);
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("hooks", &self.hooks.read().len())
            .finish()
    }
}
