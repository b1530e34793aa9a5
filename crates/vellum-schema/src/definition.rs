//! # Schema Definition Documents
//!
//! The untyped, author-facing shape of a schema. Field types and roles are
//! plain strings here; they are only checked against the fixed type set and
//! the configured role set when the registry publishes the definition.
//!
//! ## Loading
//!
//! [`SchemaDefinition::from_json_str`] and [`SchemaDefinition::from_yaml_str`]
//! check the document against the embedded meta-schema
//! (`schemas/schema-definition.schema.json`, JSON Schema draft 2020-12)
//! before deserializing. Every violation is reported with its instance
//! path, matching the way module descriptors are validated elsewhere in
//! the stack. Meta-schema validation is structural only: an unknown type
//! name such as `"blob"` passes here and is rejected at publish time as
//! `SchemaInvalid`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, Violation};

/// The embedded meta-schema for definition documents.
const META_SCHEMA: &str = include_str!("../schemas/schema-definition.schema.json");

/// A content type as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Schema name; lowercase identifier.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Roles allowed on the schema as a whole.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Audit full-access reads as well as writes.
    #[serde(default)]
    pub audit: bool,
    /// Ordered field definitions.
    pub fields: Vec<FieldDefinition>,
}

/// A field as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name, unique among its siblings.
    pub name: String,
    /// Declared type name.
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub encrypted: bool,
    /// Roles allowed on this field. Empty inherits from the parent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Roles refused on this field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Sub-fields of a composite.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
}

impl SchemaDefinition {
    /// Start a definition with no roles and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            roles: Vec::new(),
            audit: false,
            fields: Vec::new(),
        }
    }

    /// Set the schema-level roles.
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Append a field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Enable auditing of full-access reads.
    pub fn audited(mut self) -> Self {
        self.audit = true;
        self
    }

    /// Set the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Load a definition from JSON, checking it against the meta-schema.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Load a definition from YAML, checking it against the meta-schema.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        let value: Value =
            serde_yaml::from_str(yaml).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Check a parsed document against the meta-schema and deserialize it.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let violations = check_document(&value)?;
        if !violations.is_empty() {
            return Err(SchemaError::DefinitionRejected { violations });
        }
        serde_json::from_value(value).map_err(|e| SchemaError::Parse(e.to_string()))
    }
}

impl FieldDefinition {
    /// A field with the given name and type name.
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: false,
            encrypted: false,
            roles: Vec::new(),
            deny_roles: Vec::new(),
            max_length: None,
            target: None,
            fields: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Restrict the field to these roles.
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Refuse the field to these roles.
    pub fn deny_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn target(mut self, schema: impl Into<String>) -> Self {
        self.target = Some(schema.into());
        self
    }

    /// Append a composite sub-field.
    pub fn sub_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }
}

/// Validate a document against the embedded meta-schema.
fn check_document(instance: &Value) -> Result<Vec<Violation>, SchemaError> {
    let meta: Value = serde_json::from_str(META_SCHEMA)
        .map_err(|e| SchemaError::Parse(format!("embedded meta-schema: {e}")))?;

    let mut opts = jsonschema::options();
    opts.with_draft(jsonschema::Draft::Draft202012);
    let validator = opts
        .build(&meta)
        .map_err(|e| SchemaError::Parse(format!("embedded meta-schema: {e}")))?;

    Ok(validator
        .iter_errors(instance)
        .map(|e| Violation {
            instance_path: e.instance_path.to_string(),
            schema_path: e.schema_path.to_string(),
            message: e.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_YAML: &str = r#"
name: article
description: Blog article
roles: [user, editor, admin]
fields:
  - name: title
    type: string
    required: true
  - name: content
    type: text
    encrypted: true
    roles: [editor, admin]
  - name: author
    type: composite
    fields:
      - name: name
        type: string
      - name: email
        type: string
        roles: [admin]
"#;

    #[test]
    fn loads_yaml_definition() {
        let def = SchemaDefinition::from_yaml_str(ARTICLE_YAML).unwrap();
        assert_eq!(def.name, "article");
        assert_eq!(def.fields.len(), 3);
        assert!(def.fields[1].encrypted);
        assert_eq!(def.fields[1].roles, vec!["editor", "admin"]);
        assert_eq!(def.fields[2].fields.len(), 2);
        assert!(!def.audit);
    }

    #[test]
    fn loads_json_definition() {
        let def = SchemaDefinition::from_json_str(
            r#"{"name": "page", "roles": ["user"], "audit": true,
                "fields": [{"name": "slug", "type": "string", "required": true}]}"#,
        )
        .unwrap();
        assert!(def.audit);
        assert!(def.fields[0].required);
    }

    #[test]
    fn unknown_type_passes_meta_schema() {
        let def = SchemaDefinition::from_json_str(
            r#"{"name": "x", "fields": [{"name": "blob", "type": "binary"}]}"#,
        )
        .unwrap();
        assert_eq!(def.fields[0].field_type, "binary");
    }

    #[test]
    fn reports_every_structural_violation() {
        let err = SchemaDefinition::from_json_str(
            r#"{"name": "x", "fields": [{"name": "a"}, {"type": "string", "colour": "red"}]}"#,
        )
        .unwrap_err();
        match err {
            SchemaError::DefinitionRejected { violations } => {
                assert!(violations.len() >= 3, "got {violations:?}");
                assert!(violations.iter().any(|v| v.instance_path == "/fields/0"));
                assert!(violations.iter().any(|v| v.instance_path == "/fields/1"));
            }
            other => panic!("expected DefinitionRejected, got {other:?}"),
        }
    }

    #[test]
    fn missing_fields_key_rejected() {
        let err = SchemaDefinition::from_json_str(r#"{"name": "x"}"#).unwrap_err();
        assert!(matches!(err, SchemaError::DefinitionRejected { .. }));
    }

    #[test]
    fn unparsable_document() {
        let err = SchemaDefinition::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SchemaError::Parse(_)));
    }

    #[test]
    fn builder_produces_same_shape_as_document() {
        let built = SchemaDefinition::new("page")
            .roles(["user"])
            .audited()
            .field(FieldDefinition::new("slug", "string").required());
        let loaded = SchemaDefinition::from_json_str(
            r#"{"name": "page", "roles": ["user"], "audit": true,
                "fields": [{"name": "slug", "type": "string", "required": true}]}"#,
        )
        .unwrap();
        assert_eq!(built, loaded);
    }
}
