//! Engine configuration.
//!
//! Read once when the engine is built and never re-read mid-operation.
//!
//! Variables:
//! - `VELLUM_ROLES` (required): comma-separated role set
//! - `VELLUM_SUPER_ADMIN_ROLE`: bypass role, must be in the role set
//! - `VELLUM_DEFAULT_ROLE`: role for identities presented without roles
//! - `VELLUM_MASTER_SECRET` (required): base64, at least 32 bytes decoded
//! - `VELLUM_AUDIT_FAILURE_POLICY` (required): `abort` or `degrade`
//! - `VELLUM_OPERATION_TIMEOUT_MS` (default: 30000)
//! - `VELLUM_AUDIT_RETRY_BACKOFF_MS` (default: 50)

use std::collections::HashMap;
use std::time::Duration;

use vellum_audit::AuditFailurePolicy;
use vellum_core::{CoreError, Identity, Role, RoleSet, SubjectId};
use vellum_crypto::{CryptoError, MasterSecret};

pub const ROLES: &str = "VELLUM_ROLES";
pub const SUPER_ADMIN_ROLE: &str = "VELLUM_SUPER_ADMIN_ROLE";
pub const DEFAULT_ROLE: &str = "VELLUM_DEFAULT_ROLE";
pub const MASTER_SECRET: &str = "VELLUM_MASTER_SECRET";
pub const AUDIT_FAILURE_POLICY: &str = "VELLUM_AUDIT_FAILURE_POLICY";
pub const OPERATION_TIMEOUT_MS: &str = "VELLUM_OPERATION_TIMEOUT_MS";
pub const AUDIT_RETRY_BACKOFF_MS: &str = "VELLUM_AUDIT_RETRY_BACKOFF_MS";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_BACKOFF_MS: u64 = 50;

/// Configuration for a [`ContentEngine`](crate::ContentEngine).
///
/// Custom `Debug` implementation redacts the master secret.
pub struct EngineConfig {
    /// Roles schemas may reference.
    pub roles: RoleSet,
    /// Role that bypasses field and schema checks (still audited).
    pub super_admin_role: Option<Role>,
    /// Role substituted when an identity arrives with none.
    pub default_role: Option<Role>,
    /// Root of every field encryption key.
    pub master_secret: MasterSecret,
    /// What mutating operations do when auditing fails.
    pub audit_failure_policy: AuditFailurePolicy,
    /// Deadline applied when the caller sets none.
    pub operation_timeout: Duration,
    /// Wait before the single audit retry.
    pub audit_retry_backoff: Duration,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("roles", &self.roles)
            .field("super_admin_role", &self.super_admin_role)
            .field("default_role", &self.default_role)
            .field("master_secret", &"[REDACTED]")
            .field("audit_failure_policy", &self.audit_failure_policy)
            .field("operation_timeout", &self.operation_timeout)
            .field("audit_retry_backoff", &self.audit_retry_backoff)
            .finish()
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from explicit key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| lookup(&vars, key);

        let roles = RoleSet::parse_list(get(ROLES).ok_or(ConfigError::Missing(ROLES))?)
            .map_err(|e| ConfigError::invalid(ROLES, e))?;
        if roles.is_empty() {
            return Err(ConfigError::Missing(ROLES));
        }
        let super_admin_role = get(SUPER_ADMIN_ROLE)
            .map(|r| declared_role(SUPER_ADMIN_ROLE, r, &roles))
            .transpose()?;
        let default_role = get(DEFAULT_ROLE)
            .map(|r| declared_role(DEFAULT_ROLE, r, &roles))
            .transpose()?;

        let master_secret = get(MASTER_SECRET)
            .ok_or(ConfigError::Missing(MASTER_SECRET))
            .and_then(|raw| MasterSecret::from_base64(raw).map_err(ConfigError::Secret))?;

        let audit_failure_policy: AuditFailurePolicy = get(AUDIT_FAILURE_POLICY)
            .ok_or(ConfigError::Missing(AUDIT_FAILURE_POLICY))?
            .parse()
            .map_err(|v: String| {
                ConfigError::invalid(
                    AUDIT_FAILURE_POLICY,
                    format!("expected abort or degrade, got {v:?}"),
                )
            })?;

        Ok(Self {
            roles,
            super_admin_role,
            default_role,
            master_secret,
            audit_failure_policy,
            operation_timeout: millis(
                OPERATION_TIMEOUT_MS,
                get(OPERATION_TIMEOUT_MS),
                DEFAULT_TIMEOUT_MS,
            )?,
            audit_retry_backoff: millis(
                AUDIT_RETRY_BACKOFF_MS,
                get(AUDIT_RETRY_BACKOFF_MS),
                DEFAULT_BACKOFF_MS,
            )?,
        })
    }

    /// Build an identity, substituting the default role when `roles` is empty.
    pub fn identity(
        &self,
        subject: &str,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<Identity, CoreError> {
        resolve_identity(self.default_role.as_ref(), subject, roles)
    }
}

pub(crate) fn resolve_identity(
    default_role: Option<&Role>,
    subject: &str,
    roles: impl IntoIterator<Item = Role>,
) -> Result<Identity, CoreError> {
    let mut roles: Vec<Role> = roles.into_iter().collect();
    if roles.is_empty() {
        roles.extend(default_role.cloned());
    }
    Identity::new(SubjectId::new(subject)?, roles)
}

/// A set, non-blank value.
fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn declared_role(key: &'static str, raw: &str, roles: &RoleSet) -> Result<Role, ConfigError> {
    let role = Role::new(raw).map_err(|e| ConfigError::invalid(key, e))?;
    if !roles.contains(&role) {
        return Err(ConfigError::invalid(key, format!("{role} is not in {ROLES}")));
    }
    Ok(role)
}

fn millis(key: &'static str, raw: Option<&str>, default: u64) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(Duration::from_millis(default)),
        Some(v) => v
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::invalid(key, e)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("invalid VELLUM_MASTER_SECRET: {0}")]
    Secret(CryptoError),
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            reason: reason.to_string(),
        }
    }
}
