//! # vellum-access — Access Control Evaluator
//!
//! Decides, for one identity and one operation, what happens to each field
//! the operation touches.
//!
//! ## Resolution
//!
//! 1. An identity holding the configured super-admin role is allowed on
//!    every field. The outcome carries a `SuperAdminBypass` note so the
//!    engine always audits it.
//! 2. A field with a non-empty `roles` set requires one of those roles;
//!    otherwise the parent's effective set applies (the schema's roles for
//!    top-level fields).
//! 3. `deny_roles` accumulate from parent to child. Holding a denied role
//!    loses against any allow.
//! 4. No match is `Deny` on writes and `AllowRedacted` on reads.
//!
//! ## Determinism
//!
//! The evaluator holds no mutable state and performs no I/O. Payload walks
//! follow schema declaration order, so the same inputs always produce the
//! same outcome list.

pub mod evaluator;
pub mod redact;

pub use evaluator::{AccessEvaluator, AccessReport};
pub use redact::redact;
