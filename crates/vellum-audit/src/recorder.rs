//! Retrying recorder and failure policy.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::record::AuditRecord;
use crate::sink::AuditSink;

/// What a mutating operation does when the audit trail is unavailable.
///
/// There is deliberately no `Default`: deployments must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailurePolicy {
    /// Fail the operation. Before the write, nothing is persisted.
    Abort,
    /// Let the operation stand and report a degraded audit.
    Degrade,
}

impl AuditFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Degrade => "degrade",
        }
    }
}

impl FromStr for AuditFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "degrade" => Ok(Self::Degrade),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for AuditFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes records to a sink, retrying once after `backoff`.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    backoff: Duration,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, backoff: Duration) -> Self {
        Self { sink, backoff }
    }

    /// Append `record`, retrying once.
    ///
    /// # Errors
    ///
    /// `AuditError::Unavailable` when both attempts fail.
    pub async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let first = match self.sink.append(record).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(
            operation_id = %record.operation_id,
            error = %first,
            backoff_ms = self.backoff.as_millis() as u64,
            "audit append failed, retrying once"
        );
        tokio::time::sleep(self.backoff).await;

        self.sink.append(record).await.map_err(|last| {
            tracing::error!(
                operation_id = %record.operation_id,
                error = %last,
                "audit append failed after retry"
            );
            AuditError::Unavailable {
                attempts: 2,
                last: last.to_string(),
            }
        })
    }

    /// Probe the sink.
    pub async fn health_check(&self) -> Result<(), AuditError> {
        self.sink
            .health_check()
            .await
            .map_err(|e| AuditError::Unavailable {
                attempts: 1,
                last: e.to_string(),
            })
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
