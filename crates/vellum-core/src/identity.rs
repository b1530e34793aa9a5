//! # Identifiers, Roles and Identities
//!
//! Newtype wrappers for every identifier that crosses a component
//! boundary, plus the role vocabulary the access evaluator compares.
//!
//! ## Security Invariant
//!
//! Roles are a closed, explicit set of validated names. An `Identity`
//! always holds at least one role; construction fails otherwise, so the
//! evaluator never has to decide what an empty role set means.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ─── Identifiers ─────────────────────────────────────────────────────

/// Identifier of a stored content record.
///
/// Opaque to the engine. Callers may supply their own (slugs, external
/// keys) or let the engine generate a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::EmptyRecordId);
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of one pass through the operation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Generate a new random operation identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op:{}", self.0)
    }
}

/// Caller-supplied identifier tying an operation to an outer request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an upstream request identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a correlation id when the caller has none.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque subject identifier issued by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    /// Wrap a subject identifier. Empty identifiers are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::EmptySubject);
        }
        Ok(Self(id))
    }

    /// Borrow the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Roles ───────────────────────────────────────────────────────────

/// A validated role name.
///
/// Role names are lowercase ASCII letters, digits, `_` and `-`, starting
/// with a letter. Comparison is exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
    /// Validate and wrap a role name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_head = chars.next().is_some_and(|c| c.is_ascii_lowercase());
        let valid_tail =
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if valid_head && valid_tail {
            Ok(Self(name))
        } else {
            Err(CoreError::InvalidRole(name))
        }
    }

    /// Borrow the role name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Role {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The configured closed set of roles.
///
/// Schemas may only reference roles in this set; publish fails otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// Build a role set from validated roles.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    /// Parse a comma-separated list (`"admin, editor,user"`).
    ///
    /// Blank entries are skipped; any invalid name fails the whole list.
    pub fn parse_list(list: &str) -> Result<Self, CoreError> {
        let roles = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Role::new)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self(roles))
    }

    /// Whether the set contains `role`.
    pub fn contains(&self, role: &Role) -> bool {
        self.0.contains(role)
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    /// Number of roles.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a role.
    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }
}

// ─── Identity ────────────────────────────────────────────────────────

/// The authenticated subject of one operation.
///
/// Supplied by the authentication collaborator and treated as read-only
/// for the duration of the operation. The role set is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    subject: SubjectId,
    roles: BTreeSet<Role>,
    tenant: Option<String>,
}

impl Identity {
    /// Build an identity.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyRoles` if `roles` is empty.
    pub fn new(
        subject: SubjectId,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<Self, CoreError> {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        if roles.is_empty() {
            return Err(CoreError::EmptyRoles(subject.to_string()));
        }
        Ok(Self {
            subject,
            roles,
            tenant: None,
        })
    }

    /// Attach a tenant/scope tag.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// The subject identifier.
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// The assigned roles, sorted.
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// The tenant tag, if any.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Whether the identity holds `role`.
    pub fn holds(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Whether the identity holds at least one role in `roles`.
    pub fn holds_any(&self, roles: &BTreeSet<Role>) -> bool {
        // Iterate the smaller side.
        if self.roles.len() <= roles.len() {
            self.roles.iter().any(|r| roles.contains(r))
        } else {
            roles.iter().any(|r| self.roles.contains(r))
        }
    }
}
