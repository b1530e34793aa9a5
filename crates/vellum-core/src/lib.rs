//! # vellum-core — Foundational Types
//!
//! The leaf crate of the vellum workspace. Every other `vellum-*` crate
//! depends on it; it depends on nothing internal.
//!
//! ## Contents
//!
//! - **Identifiers** (`identity.rs`): `RecordId`, `OperationId`,
//!   `CorrelationId`, `SubjectId` newtypes. No bare strings or UUIDs cross
//!   component boundaries.
//!
//! - **Roles and identities** (`identity.rs`): `Role` is validated at
//!   construction; `RoleSet` is the configured closed set of roles that
//!   schemas may reference; `Identity` is the read-only capability an
//!   authentication collaborator hands to the engine for one operation.
//!
//! - **Timestamps** (`temporal.rs`): UTC-only, seconds precision.
//!
//! - **Canonical digests** (`canonical.rs`, `digest.rs`): JCS bytes and
//!   SHA-256 digests, used by the audit chain.
//!
//! - **Operation vocabulary** (`operation.rs`): operation kinds, pipeline
//!   states, access decisions and per-field outcomes. These live here so the
//!   audit crate can record them without depending on the engine.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vellum-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod operation;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, CoreError};
pub use identity::{CorrelationId, Identity, OperationId, RecordId, Role, RoleSet, SubjectId};
pub use operation::{AccessDecision, FieldNote, FieldOutcome, OperationKind, OperationState};
pub use temporal::Timestamp;
