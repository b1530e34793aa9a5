//! Shared fixtures for the engine scenario tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use vellum_audit::{AuditError, AuditRecord, AuditSink, MemoryAuditSink};
use vellum_core::{RecordId, Role};
use vellum_engine::config;
use vellum_engine::{
    ContentEngine, ContentStore, EngineConfig, MemoryContentStore, OperationContext,
    Precondition, Revision, StorageError, StoredRecord,
};
use vellum_schema::{FieldDefinition, Payload, SchemaDefinition};

pub fn secret() -> String {
    STANDARD.encode([0x5a_u8; 32])
}

pub fn config(policy: &str) -> EngineConfig {
    let secret = secret();
    EngineConfig::from_vars([
        (config::ROLES, "admin,editor,user,root"),
        (config::SUPER_ADMIN_ROLE, "root"),
        (config::DEFAULT_ROLE, "user"),
        (config::MASTER_SECRET, secret.as_str()),
        (config::AUDIT_FAILURE_POLICY, policy),
        (config::AUDIT_RETRY_BACKOFF_MS, "1"),
    ])
    .expect("test config")
}

/// `title` is open to every schema role; `content` is encrypted and
/// restricted to editors and admins.
pub fn article() -> SchemaDefinition {
    SchemaDefinition::new("article")
        .roles(["admin", "editor", "user"])
        .field(FieldDefinition::new("title", "string").required())
        .field(
            FieldDefinition::new("content", "text")
                .encrypted()
                .roles(["editor", "admin"]),
        )
}

pub struct Harness {
    pub engine: Arc<ContentEngine>,
    pub store: MemoryContentStore,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn harness(policy: &str) -> Harness {
    let audit = Arc::new(MemoryAuditSink::new());
    let store = MemoryContentStore::new();
    let engine = engine_with(policy, Arc::new(store.clone()), audit.clone());
    Harness {
        engine,
        store,
        audit,
    }
}

pub fn engine_with(
    policy: &str,
    store: Arc<dyn ContentStore>,
    sink: Arc<dyn AuditSink>,
) -> Arc<ContentEngine> {
    let engine = ContentEngine::new(config(policy), store, sink);
    engine.publish(&article()).expect("publish article");
    Arc::new(engine)
}

pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().expect("object payload")
}

pub fn ctx(engine: &ContentEngine, subject: &str, role: &str) -> OperationContext {
    let identity = engine
        .identity(subject, [Role::new(role).expect("role")])
        .expect("identity");
    OperationContext::new(identity)
}

pub fn record_id(id: &str) -> RecordId {
    RecordId::new(id).expect("record id")
}

/// Wait for background audit writes to land.
pub async fn wait_for_len(sink: &MemoryAuditSink, len: usize) {
    for _ in 0..200 {
        if sink.len() >= len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("audit sink never reached {len} records (has {})", sink.len());
}

// ─── Audit sinks ────────────────────────────────────────────────────

/// Refuses everything.
pub struct DownSink;

#[async_trait]
impl AuditSink for DownSink {
    async fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Sink("connection refused".into()))
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        Err(AuditError::Sink("connection refused".into()))
    }
}

/// Reports healthy, then fails every append.
pub struct AppendFailsSink;

#[async_trait]
impl AuditSink for AppendFailsSink {
    async fn append(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::Sink("disk full".into()))
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Hangs on the first append, then behaves like the inner sink.
pub struct StallOnceSink {
    pub inner: MemoryAuditSink,
    stalled: AtomicBool,
}

impl StallOnceSink {
    pub fn new() -> Self {
        Self {
            inner: MemoryAuditSink::new(),
            stalled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AuditSink for StallOnceSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.append(record).await
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

// ─── Stores ─────────────────────────────────────────────────────────

/// A store whose writes never finish.
#[derive(Default)]
pub struct HangingStore {
    pub inner: MemoryContentStore,
}

#[async_trait]
impl ContentStore for HangingStore {
    async fn put(
        &self,
        _schema: &str,
        _schema_version: u32,
        _id: &RecordId,
        _fields: &Payload,
        _precondition: Precondition,
    ) -> Result<Revision, StorageError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(StorageError::Backend("unreachable".into()))
    }

    async fn get(&self, schema: &str, id: &RecordId) -> Result<StoredRecord, StorageError> {
        self.inner.get(schema, id).await
    }

    async fn delete(
        &self,
        schema: &str,
        id: &RecordId,
        precondition: Precondition,
    ) -> Result<(), StorageError> {
        self.inner.delete(schema, id, precondition).await
    }
}

/// A store whose backend is down for writes.
#[derive(Default)]
pub struct BrokenStore;

#[async_trait]
impl ContentStore for BrokenStore {
    async fn put(
        &self,
        _schema: &str,
        _schema_version: u32,
        _id: &RecordId,
        _fields: &Payload,
        _precondition: Precondition,
    ) -> Result<Revision, StorageError> {
        Err(StorageError::Backend("primary unavailable".into()))
    }

    async fn get(&self, _schema: &str, _id: &RecordId) -> Result<StoredRecord, StorageError> {
        Err(StorageError::NotFound)
    }

    async fn delete(
        &self,
        _schema: &str,
        _id: &RecordId,
        _precondition: Precondition,
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("primary unavailable".into()))
    }
}
