//! # vellum-audit — Audit Recorder
//!
//! Every mutating operation and every denied access attempt leaves exactly
//! one [`AuditRecord`].
//!
//! ## Components
//!
//! - [`AuditRecord`] (`record.rs`): who did what to which schema version,
//!   the per-field outcomes, and how it ended. Never carries field values.
//! - [`AuditSink`] (`sink.rs`): the append-only storage boundary. Each
//!   `append` is atomic with respect to concurrent appends.
//! - [`MemoryAuditSink`] (`sink.rs`): a hash-chained reference sink. Each
//!   entry stores the previous entry's digest, so [`MemoryAuditSink::verify_chain`]
//!   detects any rewritten entry.
//! - [`AuditRecorder`] (`recorder.rs`): retries a failed append once after
//!   a backoff and reports persistent failure as [`AuditError::Unavailable`].
//!   What the caller does with that is an explicit [`AuditFailurePolicy`].

pub mod error;
pub mod record;
pub mod recorder;
pub mod sink;

pub use error::AuditError;
pub use record::{AuditOutcome, AuditRecord};
pub use recorder::{AuditFailurePolicy, AuditRecorder};
pub use sink::{AuditSink, ChainedEntry, MemoryAuditSink};
