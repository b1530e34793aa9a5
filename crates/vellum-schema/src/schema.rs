//! # Immutable Schema Snapshots
//!
//! A `Schema` is one published version of a content type. It has no
//! mutating methods; the registry hands it out as `Arc<Schema>` and an
//! in-flight operation keeps its `Arc` for its whole lifetime, so a newer
//! version published mid-operation is never observed by that operation.

use std::collections::BTreeSet;

use serde::Serialize;
use vellum_core::{Role, Timestamp};

use crate::field::Field;

/// One published version of a content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    name: String,
    version: u32,
    description: Option<String>,
    fields: Vec<Field>,
    roles: BTreeSet<Role>,
    audit: bool,
    published_at: Timestamp,
}

impl Schema {
    pub(crate) fn new(
        name: String,
        version: u32,
        description: Option<String>,
        fields: Vec<Field>,
        roles: BTreeSet<Role>,
        audit: bool,
    ) -> Self {
        Self {
            name,
            version,
            description,
            fields,
            roles,
            audit,
            published_at: Timestamp::now(),
        }
    }

    /// Unique schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version number, starting at 1.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Free-form description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Top-level fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Roles allowed on the schema as a whole.
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Whether full-access reads are audited as well as writes.
    pub fn audit(&self) -> bool {
        self.audit
    }

    /// When this version was published.
    pub fn published_at(&self) -> Timestamp {
        self.published_at
    }

    /// Look up a top-level field.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by dotted path (`address.city`).
    pub fn field_at(&self, path: &str) -> Option<&Field> {
        let mut parts = path.split('.');
        let mut current = self.field(parts.next()?)?;
        for part in parts {
            current = current.sub_field(part)?;
        }
        Some(current)
    }

    /// Whether any field at any depth is encrypted.
    pub fn has_encrypted_fields(&self) -> bool {
        self.fields.iter().any(Field::has_encrypted)
    }

    /// `name@version`, for logs and error messages.
    pub fn label(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}
