//! Typed field definitions.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vellum_core::Role;

/// Default maximum length, in characters, of a `string` field.
pub const DEFAULT_STRING_MAX: usize = 255;

/// The fixed set of field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Short single-value text, 255 characters unless `max_length` says otherwise.
    String,
    /// Long-form text, unbounded unless `max_length` is set.
    Text,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// RFC 3339 timestamp or `YYYY-MM-DD` calendar date.
    Date,
    /// Identifier of another record.
    Reference,
    /// Nested object with its own declared sub-fields.
    Composite,
}

impl FieldType {
    /// Every member of the fixed set.
    pub const ALL: [FieldType; 7] = [
        Self::String,
        Self::Text,
        Self::Number,
        Self::Boolean,
        Self::Date,
        Self::Reference,
        Self::Composite,
    ];

    /// The name used in definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Reference => "reference",
            Self::Composite => "composite",
        }
    }

    /// Whether the type holds character data subject to `max_length`.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Text)
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published field. Only reachable through an immutable `Schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    /// Unique within its parent.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether the field must be present on create.
    pub required: bool,
    /// Whether the value is encrypted at rest.
    pub encrypted: bool,
    /// Roles allowed to read/write this field. Empty means inherit.
    pub roles: BTreeSet<Role>,
    /// Roles explicitly refused on this field, whatever else they hold.
    pub deny_roles: BTreeSet<Role>,
    /// Character limit for string/text fields.
    pub max_length: Option<usize>,
    /// Target schema for reference fields (informational).
    pub target: Option<String>,
    /// Sub-fields of a composite, in declaration order.
    pub fields: Vec<Field>,
}

impl Field {
    /// Look up a direct sub-field.
    pub fn sub_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The effective character limit, if the type has one.
    pub fn effective_max_length(&self) -> Option<usize> {
        match self.field_type {
            FieldType::String => Some(self.max_length.unwrap_or(DEFAULT_STRING_MAX)),
            FieldType::Text => self.max_length,
            _ => None,
        }
    }

    /// Whether this field, or any sub-field, is encrypted.
    pub fn has_encrypted(&self) -> bool {
        self.encrypted || self.fields.iter().any(Field::has_encrypted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_type_name() {
        for t in FieldType::ALL {
            assert_eq!(t.as_str().parse::<FieldType>(), Ok(t));
        }
        assert_eq!("blob".parse::<FieldType>(), Err("blob".to_string()));
        assert!("String".parse::<FieldType>().is_err());
    }

    #[test]
    fn string_has_default_limit() {
        let mut f = Field {
            name: "title".into(),
            field_type: FieldType::String,
            required: true,
            encrypted: false,
            roles: BTreeSet::new(),
            deny_roles: BTreeSet::new(),
            max_length: None,
            target: None,
            fields: Vec::new(),
        };
        assert_eq!(f.effective_max_length(), Some(DEFAULT_STRING_MAX));
        f.field_type = FieldType::Text;
        assert_eq!(f.effective_max_length(), None);
        f.max_length = Some(10);
        assert_eq!(f.effective_max_length(), Some(10));
    }
}
