//! # Payload Validation
//!
//! Checks a candidate payload against a published [`Schema`] and returns the
//! normalized payload together with every field error found.
//!
//! ## Normalization
//!
//! - Undeclared fields are reported as `Unknown` and dropped.
//! - `null` on an optional field is dropped (full documents) or kept as a
//!   clear instruction (patches).
//! - Every other value passes through unchanged, so validating a normalized
//!   payload again yields the same normalized payload.
//!
//! Validation never short-circuits: a caller always sees the complete list.

use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::field::{Field, FieldType};
use crate::schema::Schema;

/// A content payload: field name to JSON value.
pub type Payload = Map<String, Value>;

/// Why a field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// A required field is absent or `null`.
    Missing,
    /// The value's JSON type does not match the declared type.
    TypeMismatch {
        expected: FieldType,
        found: &'static str,
    },
    /// The field is not declared by the schema.
    Unknown,
    /// A string/text value exceeds its character limit.
    TooLong { max: usize, actual: usize },
}

/// A single validation failure, addressed by dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    #[serde(flatten)]
    pub kind: FieldErrorKind,
}

impl FieldError {
    fn new(path: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldErrorKind::Missing => write!(f, "{}: required field missing", self.path),
            FieldErrorKind::TypeMismatch { expected, found } => {
                write!(f, "{}: expected {expected}, found {found}", self.path)
            }
            FieldErrorKind::Unknown => write!(f, "{}: field not declared by schema", self.path),
            FieldErrorKind::TooLong { max, actual } => {
                write!(f, "{}: {actual} characters exceeds limit of {max}", self.path)
            }
        }
    }
}

/// Outcome of validating one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// The payload with unknown fields and optional nulls removed.
    pub normalized: Payload,
    /// Every problem found, in schema order followed by unknown fields.
    pub errors: Vec<FieldError>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The normalized payload, or every error if there were any.
    pub fn into_result(self) -> Result<Payload, Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(self.normalized)
        } else {
            Err(self.errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Full,
    Patch,
}

/// Validate a complete document (create).
pub fn validate(schema: &Schema, payload: &Payload) -> Validation {
    run(schema.fields(), payload, Mode::Full)
}

/// Validate a partial update.
///
/// Absent required fields are not errors; the stored value is kept. A
/// `null` clears an optional field and is `Missing` on a required one.
/// Composite values replace the stored composite wholesale and are checked
/// as complete documents.
pub fn validate_patch(schema: &Schema, patch: &Payload) -> Validation {
    run(schema.fields(), patch, Mode::Patch)
}

fn run(fields: &[Field], payload: &Payload, mode: Mode) -> Validation {
    let mut out = Validation {
        normalized: Map::new(),
        errors: Vec::new(),
    };
    check_object(fields, payload, "", mode, &mut out.normalized, &mut out.errors);
    out
}

fn check_object(
    fields: &[Field],
    payload: &Payload,
    prefix: &str,
    mode: Mode,
    normalized: &mut Payload,
    errors: &mut Vec<FieldError>,
) {
    for field in fields {
        let path = join(prefix, &field.name);
        match payload.get(&field.name) {
            None => {
                if field.required && mode == Mode::Full {
                    errors.push(FieldError::new(path, FieldErrorKind::Missing));
                }
            }
            Some(Value::Null) => {
                if field.required {
                    errors.push(FieldError::new(path, FieldErrorKind::Missing));
                } else if mode == Mode::Patch {
                    normalized.insert(field.name.clone(), Value::Null);
                }
            }
            Some(value) => {
                let value = check_value(field, value, &path, errors);
                normalized.insert(field.name.clone(), value);
            }
        }
    }

    for name in payload.keys() {
        if !fields.iter().any(|f| &f.name == name) {
            errors.push(FieldError::new(join(prefix, name), FieldErrorKind::Unknown));
        }
    }
}

fn check_value(field: &Field, value: &Value, path: &str, errors: &mut Vec<FieldError>) -> Value {
    let mismatch = |errors: &mut Vec<FieldError>| {
        errors.push(FieldError::new(
            path,
            FieldErrorKind::TypeMismatch {
                expected: field.field_type,
                found: json_kind(value),
            },
        ))
    };

    match (field.field_type, value) {
        (FieldType::String | FieldType::Text, Value::String(s)) => {
            if let Some(max) = field.effective_max_length() {
                let actual = s.chars().count();
                if actual > max {
                    errors.push(FieldError::new(path, FieldErrorKind::TooLong { max, actual }));
                }
            }
        }
        (FieldType::Number, Value::Number(_)) | (FieldType::Boolean, Value::Bool(_)) => {}
        (FieldType::Date, Value::String(s)) if is_date(s) => {}
        (FieldType::Reference, Value::String(s)) if !s.trim().is_empty() => {}
        (FieldType::Composite, Value::Object(inner)) => {
            // Sub-documents are always complete.
            let mut sub = Map::new();
            check_object(&field.fields, inner, path, Mode::Full, &mut sub, errors);
            return Value::Object(sub);
        }
        _ => mismatch(errors),
    }
    value.clone()
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
