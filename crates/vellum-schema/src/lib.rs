//! # vellum-schema — Schema Registry & Validation Engine
//!
//! Runtime-defined content shapes.
//!
//! ## Definitions (`definition`)
//!
//! [`SchemaDefinition`] is the loadable, untyped shape of a content type:
//! field types are plain strings and roles are plain names. Definitions
//! loaded from JSON or YAML are first checked against an embedded JSON
//! Schema meta-schema so structural mistakes are reported with their
//! instance paths before anything is published.
//!
//! ## Registry (`registry`)
//!
//! [`SchemaRegistry::publish`] turns a definition into an immutable
//! [`Schema`] snapshot with the next version number for its name. A failed
//! publish never consumes a version number. Published snapshots are shared
//! as `Arc<Schema>`; a new version supersedes but never mutates an old one.
//!
//! ## Validation (`validate`)
//!
//! [`validate`] and [`validate_patch`] check a payload against a schema and
//! return every field error found, together with the normalized payload.
//! Validation is pure: no storage, no encryption, no access control.
//!
//! ## Crate Policy
//!
//! - Depends only on `vellum-core` internally.
//! - Unknown fields never pass through validation silently.

pub mod definition;
pub mod error;
pub mod field;
pub mod registry;
pub mod schema;
pub mod validate;

pub use definition::{FieldDefinition, SchemaDefinition};
pub use error::{SchemaError, SchemaProblem, Violation};
pub use field::{Field, FieldType};
pub use registry::{SchemaRegistry, SchemaVersionInfo};
pub use schema::Schema;
pub use validate::{validate, validate_patch, FieldError, FieldErrorKind, Payload, Validation};
