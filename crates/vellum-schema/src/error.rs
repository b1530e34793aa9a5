//! # Schema Errors
//!
//! `SchemaError::Invalid` enumerates every problem found in a definition,
//! never just the first, so an author can fix a definition in one pass.

use std::fmt;

use thiserror::Error;

/// Errors raised by the schema registry and definition loader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The definition was rejected at publish time.
    #[error("schema '{schema}' is invalid: {}", join_problems(.problems))]
    Invalid {
        /// Name of the rejected schema.
        schema: String,
        /// Every problem found.
        problems: Vec<SchemaProblem>,
    },

    /// No schema (or no such version) exists.
    #[error("schema '{name}' not found{}", at_version(.version))]
    NotFound {
        /// Requested schema name.
        name: String,
        /// Requested version, if any.
        version: Option<u32>,
    },

    /// The requested version has been deactivated.
    #[error("schema '{name}' version {version} is inactive")]
    Inactive {
        /// Schema name.
        name: String,
        /// The inactive version.
        version: u32,
    },

    /// A definition document did not conform to the meta-schema.
    #[error("schema definition rejected:\n{}", join_violations(.violations))]
    DefinitionRejected {
        /// Structural violations, with instance paths.
        violations: Vec<Violation>,
    },

    /// A definition document could not be parsed at all.
    #[error("schema definition could not be parsed: {0}")]
    Parse(String),
}

/// One reason a definition cannot be published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaProblem {
    /// Schema names are lowercase identifiers.
    #[error("invalid schema name {0:?}")]
    InvalidSchemaName(String),

    /// A schema must allow at least one role.
    #[error("schema declares no roles")]
    NoRoles,

    /// Field names are identifiers and may not contain '.'.
    #[error("invalid field name at {0:?}")]
    InvalidFieldName(String),

    /// Two fields share a name at the same level.
    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    /// The declared type is not one of the fixed set.
    #[error("field '{path}' declares unknown type '{declared}'")]
    UnknownFieldType {
        /// Field path.
        path: String,
        /// The declared type string.
        declared: String,
    },

    /// A role name is malformed.
    #[error("malformed role name {0:?}")]
    MalformedRole(String),

    /// A role is not in the configured role set.
    #[error("role '{role}' referenced by {location} is not configured")]
    UndeclaredRole {
        /// `schema` or the field path.
        location: String,
        /// The offending role.
        role: String,
    },

    /// Composite fields need sub-fields.
    #[error("composite field '{0}' declares no sub-fields")]
    CompositeWithoutFields(String),

    /// Only composite fields may declare sub-fields.
    #[error("field '{0}' declares sub-fields but is not composite")]
    FieldsOnScalar(String),

    /// `max_length` only applies to string and text.
    #[error("field '{0}' declares max_length but is not string or text")]
    MaxLengthOnNonString(String),

    /// `target` only applies to reference fields.
    #[error("field '{0}' declares a target but is not a reference")]
    TargetOnNonReference(String),
}

/// A meta-schema violation with structured context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer to the violating location in the document.
    pub instance_path: String,
    /// JSON Pointer within the meta-schema that triggered the error.
    pub schema_path: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "  (root): {}", self.message)
        } else {
            write!(f, "  {}: {}", self.instance_path, self.message)
        }
    }
}

fn at_version(version: &Option<u32>) -> String {
    match version {
        Some(v) => format!(" at version {v}"),
        None => String::new(),
    }
}

fn join_problems(problems: &[SchemaProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
