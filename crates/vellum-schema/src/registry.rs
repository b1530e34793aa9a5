//! # Schema Registry
//!
//! Holds every published version of every schema as an arena of immutable
//! snapshots, looked up by name and version.
//!
//! ## Concurrency
//!
//! The outer map is behind a `parking_lot::RwLock` that is only
//! write-locked to insert a new schema name. Each name owns its own
//! lineage lock, so publishing `article` never waits on a publish of
//! `page`. Within one name, publishes are serialized by the lineage write
//! lock, which is what keeps version numbers gap-free and monotonic.
//!
//! ## Version Allocation
//!
//! A definition is compiled and checked in full before any lock is taken.
//! A rejected definition therefore never consumes a version number.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use vellum_core::{Role, RoleSet, Timestamp};

use crate::definition::{FieldDefinition, SchemaDefinition};
use crate::error::{SchemaError, SchemaProblem};
use crate::field::{Field, FieldType};
use crate::schema::Schema;

/// Summary of one version in a lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaVersionInfo {
    pub version: u32,
    pub active: bool,
    pub published_at: Timestamp,
}

#[derive(Debug)]
struct VersionSlot {
    schema: Arc<Schema>,
    active: bool,
}

#[derive(Debug, Default)]
struct Lineage {
    versions: RwLock<Vec<VersionSlot>>,
}

/// Versioned store of published schemas.
#[derive(Debug)]
pub struct SchemaRegistry {
    roles: RoleSet,
    lineages: RwLock<HashMap<String, Arc<Lineage>>>,
}

impl SchemaRegistry {
    /// Create a registry that accepts roles from `roles`.
    pub fn new(roles: RoleSet) -> Self {
        Self {
            roles,
            lineages: RwLock::new(HashMap::new()),
        }
    }

    /// The configured role set.
    pub fn role_set(&self) -> &RoleSet {
        &self.roles
    }

    /// Publish a definition as the next version of its schema.
    ///
    /// # Errors
    ///
    /// `SchemaError::Invalid` listing every problem found: malformed names,
    /// duplicate field names at any nesting level, type names outside the
    /// fixed set, roles outside the configured role set, an empty
    /// schema-level role set, and attribute/type mismatches.
    pub fn publish(&self, definition: &SchemaDefinition) -> Result<Arc<Schema>, SchemaError> {
        let compiled = compile(definition, &self.roles)?;
        let lineage = self.lineage_or_insert(&definition.name);

        let mut versions = lineage.versions.write();
        let version = versions.len() as u32 + 1;
        let schema = Arc::new(Schema::new(
            compiled.name,
            version,
            compiled.description,
            compiled.fields,
            compiled.roles,
            compiled.audit,
        ));
        versions.push(VersionSlot {
            schema: Arc::clone(&schema),
            active: true,
        });
        drop(versions);

        tracing::info!(schema = %schema.name(), version, "schema published");
        Ok(schema)
    }

    /// Resolve a schema.
    ///
    /// With `version = None`, returns the latest active version. With an
    /// explicit version, returns that version even if it has been
    /// deactivated, so stored content can always be read with the version
    /// it was written under.
    pub fn resolve(&self, name: &str, version: Option<u32>) -> Result<Arc<Schema>, SchemaError> {
        let not_found = || SchemaError::NotFound {
            name: name.to_string(),
            version,
        };
        let lineage = self.lineage(name).ok_or_else(not_found)?;
        let versions = lineage.versions.read();
        let slot = match version {
            Some(v) => v
                .checked_sub(1)
                .and_then(|idx| versions.get(idx as usize)),
            None => versions.iter().rev().find(|slot| slot.active),
        };
        slot.map(|s| Arc::clone(&s.schema)).ok_or_else(not_found)
    }

    /// Resolve a schema that new content may be written against.
    ///
    /// Like [`resolve`](Self::resolve), but an explicitly requested
    /// inactive version is rejected with `SchemaError::Inactive`.
    pub fn resolve_active(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Arc<Schema>, SchemaError> {
        let schema = self.resolve(name, version)?;
        if !self.is_active(name, schema.version()) {
            return Err(SchemaError::Inactive {
                name: name.to_string(),
                version: schema.version(),
            });
        }
        Ok(schema)
    }

    /// Mark a version inactive. Existing content keeps referencing it.
    ///
    /// Deactivating an already inactive version is a no-op.
    pub fn deactivate(&self, name: &str, version: u32) -> Result<(), SchemaError> {
        let not_found = || SchemaError::NotFound {
            name: name.to_string(),
            version: Some(version),
        };
        let lineage = self.lineage(name).ok_or_else(not_found)?;
        let mut versions = lineage.versions.write();
        let slot = version
            .checked_sub(1)
            .and_then(|idx| versions.get_mut(idx as usize))
            .ok_or_else(not_found)?;
        if slot.active {
            slot.active = false;
            tracing::info!(schema = %name, version, "schema version deactivated");
        }
        Ok(())
    }

    /// Whether a version exists and is active.
    pub fn is_active(&self, name: &str, version: u32) -> bool {
        self.lineage(name)
            .and_then(|lineage| {
                let versions = lineage.versions.read();
                version
                    .checked_sub(1)
                    .and_then(|idx| versions.get(idx as usize))
                    .map(|slot| slot.active)
            })
            .unwrap_or(false)
    }

    /// Every version of a schema, oldest first.
    pub fn versions(&self, name: &str) -> Vec<SchemaVersionInfo> {
        self.lineage(name)
            .map(|lineage| {
                lineage
                    .versions
                    .read()
                    .iter()
                    .map(|slot| SchemaVersionInfo {
                        version: slot.schema.version(),
                        active: slot.active,
                        published_at: slot.schema.published_at(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every schema name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lineages.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn lineage(&self, name: &str) -> Option<Arc<Lineage>> {
        self.lineages.read().get(name).cloned()
    }

    fn lineage_or_insert(&self, name: &str) -> Arc<Lineage> {
        if let Some(existing) = self.lineage(name) {
            return existing;
        }
        let mut lineages = self.lineages.write();
        Arc::clone(lineages.entry(name.to_string()).or_default())
    }
}

// ─── Compilation ─────────────────────────────────────────────────────

struct Compiled {
    name: String,
    description: Option<String>,
    fields: Vec<Field>,
    roles: BTreeSet<Role>,
    audit: bool,
}

fn compile(def: &SchemaDefinition, configured: &RoleSet) -> Result<Compiled, SchemaError> {
    let mut problems = Vec::new();

    if !is_schema_name(&def.name) {
        problems.push(SchemaProblem::InvalidSchemaName(def.name.clone()));
    }
    let roles = compile_roles(&def.roles, "schema", configured, &mut problems);
    if def.roles.is_empty() {
        problems.push(SchemaProblem::NoRoles);
    }
    let fields = compile_fields(&def.fields, "", configured, &mut problems);

    if problems.is_empty() {
        Ok(Compiled {
            name: def.name.clone(),
            description: def.description.clone(),
            fields,
            roles,
            audit: def.audit,
        })
    } else {
        Err(SchemaError::Invalid {
            schema: def.name.clone(),
            problems,
        })
    }
}

fn compile_fields(
    defs: &[FieldDefinition],
    prefix: &str,
    configured: &RoleSet,
    problems: &mut Vec<SchemaProblem>,
) -> Vec<Field> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(defs.len());

    for def in defs {
        let path = join_path(prefix, &def.name);
        if !is_field_name(&def.name) {
            problems.push(SchemaProblem::InvalidFieldName(path.clone()));
        }
        if !seen.insert(def.name.as_str()) {
            problems.push(SchemaProblem::DuplicateField(path.clone()));
        }

        let roles = compile_roles(&def.roles, &path, configured, problems);
        let deny_roles = compile_roles(&def.deny_roles, &path, configured, problems);
        let sub_fields = compile_fields(&def.fields, &path, configured, problems);

        let field_type = match def.field_type.parse::<FieldType>() {
            Ok(t) => t,
            Err(declared) => {
                problems.push(SchemaProblem::UnknownFieldType {
                    path: path.clone(),
                    declared,
                });
                continue;
            }
        };

        match (field_type, def.fields.is_empty()) {
            (FieldType::Composite, true) => {
                problems.push(SchemaProblem::CompositeWithoutFields(path.clone()))
            }
            (t, false) if t != FieldType::Composite => {
                problems.push(SchemaProblem::FieldsOnScalar(path.clone()))
            }
            _ => {}
        }
        if def.max_length.is_some() && !field_type.is_textual() {
            problems.push(SchemaProblem::MaxLengthOnNonString(path.clone()));
        }
        if def.target.is_some() && field_type != FieldType::Reference {
            problems.push(SchemaProblem::TargetOnNonReference(path.clone()));
        }

        fields.push(Field {
            name: def.name.clone(),
            field_type,
            required: def.required,
            encrypted: def.encrypted,
            roles,
            deny_roles,
            max_length: def.max_length,
            target: def.target.clone(),
            fields: sub_fields,
        });
    }

    fields
}

fn compile_roles(
    names: &[String],
    location: &str,
    configured: &RoleSet,
    problems: &mut Vec<SchemaProblem>,
) -> BTreeSet<Role> {
    let mut roles = BTreeSet::new();
    for name in names {
        match Role::new(name.as_str()) {
            Ok(role) if configured.contains(&role) => {
                roles.insert(role);
            }
            Ok(role) => problems.push(SchemaProblem::UndeclaredRole {
                location: location.to_string(),
                role: role.to_string(),
            }),
            Err(_) => problems.push(SchemaProblem::MalformedRole(name.clone())),
        }
    }
    roles
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn is_schema_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::FieldDefinition;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(RoleSet::parse_list("admin,editor,user").unwrap())
    }

    fn article() -> SchemaDefinition {
        SchemaDefinition::new("article")
            .roles(["user", "editor", "admin"])
            .field(FieldDefinition::new("title", "string").required())
            .field(
                FieldDefinition::new("content", "text")
                    .encrypted()
                    .roles(["editor", "admin"]),
            )
    }

    fn problems(err: SchemaError) -> Vec<SchemaProblem> {
        match err {
            SchemaError::Invalid { problems, .. } => problems,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn publish_assigns_sequential_versions() {
        let reg = registry();
        assert_eq!(reg.publish(&article()).unwrap().version(), 1);
        assert_eq!(reg.publish(&article()).unwrap().version(), 2);
        assert_eq!(reg.resolve("article", None).unwrap().version(), 2);
        assert_eq!(reg.resolve("article", Some(1)).unwrap().version(), 1);
    }

    #[test]
    fn duplicate_field_rejected_without_consuming_version() {
        let reg = registry();
        let bad = SchemaDefinition::new("article")
            .roles(["user"])
            .field(FieldDefinition::new("title", "string"))
            .field(FieldDefinition::new("title", "text"));
        let probs = problems(reg.publish(&bad).unwrap_err());
        assert_eq!(probs, vec![SchemaProblem::DuplicateField("title".into())]);
        assert!(reg.versions("article").is_empty());

        assert_eq!(reg.publish(&article()).unwrap().version(), 1);
    }

    #[test]
    fn duplicate_nested_field_rejected() {
        let reg = registry();
        let bad = SchemaDefinition::new("profile").roles(["user"]).field(
            FieldDefinition::new("address", "composite")
                .sub_field(FieldDefinition::new("city", "string"))
                .sub_field(FieldDefinition::new("city", "string")),
        );
        let probs = problems(reg.publish(&bad).unwrap_err());
        assert_eq!(probs, vec![SchemaProblem::DuplicateField("address.city".into())]);
    }

    #[test]
    fn same_name_at_different_levels_is_fine() {
        let reg = registry();
        let def = SchemaDefinition::new("profile")
            .roles(["user"])
            .field(FieldDefinition::new("name", "string"))
            .field(
                FieldDefinition::new("company", "composite")
                    .sub_field(FieldDefinition::new("name", "string")),
            );
        assert!(reg.publish(&def).is_ok());
    }

    #[test]
    fn unknown_type_and_undeclared_role_reported_together() {
        let reg = registry();
        let bad = SchemaDefinition::new("article")
            .roles(["user", "auditor"])
            .field(FieldDefinition::new("body", "blob"))
            .field(FieldDefinition::new("title", "string").roles(["ghost"]));
        let probs = problems(reg.publish(&bad).unwrap_err());
        assert!(probs.contains(&SchemaProblem::UndeclaredRole {
            location: "schema".into(),
            role: "auditor".into()
        }));
        assert!(probs.contains(&SchemaProblem::UnknownFieldType {
            path: "body".into(),
            declared: "blob".into()
        }));
        assert!(probs.contains(&SchemaProblem::UndeclaredRole {
            location: "title".into(),
            role: "ghost".into()
        }));
    }

    #[test]
    fn structural_mismatches_rejected() {
        let reg = registry();
        let bad = SchemaDefinition::new("thing")
            .roles(["user"])
            .field(FieldDefinition::new("empty", "composite"))
            .field(
                FieldDefinition::new("count", "number")
                    .max_length(3)
                    .sub_field(FieldDefinition::new("x", "string")),
            )
            .field(FieldDefinition::new("flag", "boolean").target("page"))
            .field(FieldDefinition::new("bad.name", "string"));
        let probs = problems(reg.publish(&bad).unwrap_err());
        assert!(probs.contains(&SchemaProblem::CompositeWithoutFields("empty".into())));
        assert!(probs.contains(&SchemaProblem::FieldsOnScalar("count".into())));
        assert!(probs.contains(&SchemaProblem::MaxLengthOnNonString("count".into())));
        assert!(probs.contains(&SchemaProblem::TargetOnNonReference("flag".into())));
        assert!(probs.contains(&SchemaProblem::InvalidFieldName("bad.name".into())));
    }

    #[test]
    fn schema_requires_roles_and_valid_name() {
        let reg = registry();
        let bad = SchemaDefinition::new("Bad Name").field(FieldDefinition::new("a", "string"));
        let probs = problems(reg.publish(&bad).unwrap_err());
        assert!(probs.contains(&SchemaProblem::NoRoles));
        assert!(probs.contains(&SchemaProblem::InvalidSchemaName("Bad Name".into())));
    }

    #[test]
    fn resolve_unknown_schema() {
        let reg = registry();
        assert_eq!(
            reg.resolve("nope", None).unwrap_err(),
            SchemaError::NotFound {
                name: "nope".into(),
                version: None
            }
        );
        reg.publish(&article()).unwrap();
        assert!(reg.resolve("article", Some(0)).is_err());
        assert!(reg.resolve("article", Some(7)).is_err());
    }

    #[test]
    fn deactivate_falls_back_to_previous_active_version() {
        let reg = registry();
        reg.publish(&article()).unwrap();
        reg.publish(&article()).unwrap();
        reg.deactivate("article", 2).unwrap();

        assert_eq!(reg.resolve("article", None).unwrap().version(), 1);
        // Explicit lookups still see the retired version.
        assert_eq!(reg.resolve("article", Some(2)).unwrap().version(), 2);
        assert_eq!(
            reg.resolve_active("article", Some(2)).unwrap_err(),
            SchemaError::Inactive {
                name: "article".into(),
                version: 2
            }
        );

        reg.deactivate("article", 1).unwrap();
        assert!(matches!(
            reg.resolve("article", None),
            Err(SchemaError::NotFound { .. })
        ));
        assert!(reg.deactivate("article", 3).is_err());
    }

    #[test]
    fn old_snapshot_unchanged_by_new_version() {
        let reg = registry();
        let v1 = reg.publish(&article()).unwrap();
        let v2_def = article().field(FieldDefinition::new("summary", "text"));
        let v2 = reg.publish(&v2_def).unwrap();
        assert_eq!(v1.fields().len(), 2);
        assert_eq!(v2.fields().len(), 3);
        assert_eq!(reg.resolve("article", Some(1)).unwrap().fields().len(), 2);
    }

    #[test]
    fn versions_and_names_listing() {
        let reg = registry();
        reg.publish(&article()).unwrap();
        reg.publish(&SchemaDefinition::new("page").roles(["user"]).field(
            FieldDefinition::new("slug", "string"),
        ))
        .unwrap();
        reg.deactivate("article", 1).unwrap();
        assert_eq!(reg.names(), vec!["article".to_string(), "page".to_string()]);
        let versions = reg.versions("article");
        assert_eq!(versions.len(), 1);
        assert!(!versions[0].active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_produce_gap_free_versions() {
        let reg = Arc::new(registry());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                reg.publish(&article()).unwrap().version()
            }));
        }
        let mut versions = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=32).collect::<Vec<u32>>());
    }
}
