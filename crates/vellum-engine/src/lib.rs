//! # vellum-engine — Content Operation Orchestrator
//!
//! Composes the schema registry, field access control, field encryption,
//! lifecycle hooks, a content store and the audit trail into one pipeline
//! per content operation.
//!
//! ## Usage
//!
//! ```ignore
//! let config = EngineConfig::from_env()?;
//! let engine = ContentEngine::new(config, store, audit_sink);
//! engine.publish(&SchemaDefinition::from_yaml_str(ARTICLE)?)?;
//!
//! let ctx = OperationContext::new(engine.identity("u-42", roles)?);
//! let report = engine.create(&ctx, "article", None, payload).await?;
//! ```
//!
//! ## Modules
//!
//! - `orchestrator`: [`ContentEngine`] and the create/read/update/delete
//!   pipelines.
//! - `hooks`: the lifecycle hook registry.
//! - `storage`: the [`ContentStore`] seam and an in-memory implementation.
//! - `cancel`: per-operation deadlines and cancellation.
//! - `report`: operation reports and failures.
//! - `config`: environment configuration.
//! - `telemetry`: optional tracing subscriber setup.
//!
//! ## Crate Policy
//!
//! - Every mutating operation is audited exactly once, including failures.
//! - No lock is held across an `.await`.
//! - No `.unwrap()` outside tests.

pub mod cancel;
pub mod config;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod report;
pub mod storage;
pub mod telemetry;

pub use cancel::{CancelHandle, CancelSignal, Interrupt, OperationContext};
pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use hooks::{HookAbort, HookContext, HookDispatcher, HookId, HookPhase, HookTarget, PayloadLocked};
pub use orchestrator::ContentEngine;
pub use report::{
    AuditStatus, ContentRecord, Deleted, OperationFailure, OperationReport, OperationResult,
    Written,
};
pub use storage::{
    ContentStore, MemoryContentStore, Precondition, Revision, StorageError, StoredRecord,
};
