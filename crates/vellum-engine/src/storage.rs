//! # Storage Collaborator
//!
//! The engine never talks to a database directly. It hands encoded fields
//! (encrypted values already sealed) to a [`ContentStore`] and relies on
//! the store's optimistic concurrency control for same-record ordering.
//!
//! [`MemoryContentStore`] is the in-process reference implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use vellum_core::RecordId;
use vellum_schema::Payload;

/// Monotonic per-record revision, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Revision(pub u64);

impl Revision {
    pub const FIRST: Revision = Revision(1);

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Condition a write must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Create: the record must not exist yet.
    MustNotExist,
    /// The stored revision must equal this one.
    Revision(Revision),
    /// Unconditional.
    Any,
}

/// A record as the store holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Schema version the record was last written under.
    pub schema_version: u32,
    pub revision: Revision,
    /// Encoded fields: encrypted values are envelopes.
    pub fields: Payload,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    /// The precondition did not hold.
    #[error("write conflict: expected {expected:?}, found {found:?}")]
    Conflict {
        expected: Precondition,
        found: Option<Revision>,
    },
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Storage collaborator contract.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write `fields` for `(schema, id)` if `precondition` holds.
    async fn put(
        &self,
        schema: &str,
        schema_version: u32,
        id: &RecordId,
        fields: &Payload,
        precondition: Precondition,
    ) -> Result<Revision, StorageError>;

    /// Fetch the record.
    ///
    /// Callers do not pass a schema version: a record is stored under the
    /// version it was written with, and that version comes back in
    /// [`StoredRecord::schema_version`] so the caller can resolve the
    /// matching schema.
    async fn get(&self, schema: &str, id: &RecordId) -> Result<StoredRecord, StorageError>;

    /// Remove the record if `precondition` holds.
    async fn delete(
        &self,
        schema: &str,
        id: &RecordId,
        precondition: Precondition,
    ) -> Result<(), StorageError>;
}

// -- In-Memory Store ----------------------------------------------------------

type Key = (String, RecordId);

/// Thread-safe, cloneable in-memory content store.
///
/// The lock is `parking_lot` and never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    data: Arc<RwLock<HashMap<Key, StoredRecord>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored (encoded) record, for inspection.
    pub fn raw(&self, schema: &str, id: &RecordId) -> Option<StoredRecord> {
        self.data.read().get(&key(schema, id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

fn key(schema: &str, id: &RecordId) -> Key {
    (schema.to_string(), id.clone())
}

fn check(precondition: Precondition, current: Option<Revision>) -> Result<(), StorageError> {
    let ok = match precondition {
        Precondition::Any => true,
        Precondition::MustNotExist => current.is_none(),
        Precondition::Revision(expected) => current == Some(expected),
    };
    if ok {
        Ok(())
    } else {
        Err(StorageError::Conflict {
            expected: precondition,
            found: current,
        })
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(
        &self,
        schema: &str,
        schema_version: u32,
        id: &RecordId,
        fields: &Payload,
        precondition: Precondition,
    ) -> Result<Revision, StorageError> {
        let mut data = self.data.write();
        let key = key(schema, id);
        let current = data.get(&key).map(|r| r.revision);
        check(precondition, current)?;
        let revision = current.map_or(Revision::FIRST, Revision::next);
        data.insert(
            key,
            StoredRecord {
                schema_version,
                revision,
                fields: fields.clone(),
            },
        );
        Ok(revision)
    }

    async fn get(&self, schema: &str, id: &RecordId) -> Result<StoredRecord, StorageError> {
        self.raw(schema, id).ok_or(StorageError::NotFound)
    }

    async fn delete(
        &self,
        schema: &str,
        id: &RecordId,
        precondition: Precondition,
    ) -> Result<(), StorageError> {
        let mut data = self.data.write();
        let key = key(schema, id);
        let current = data.get(&key).map(|r| r.revision);
        if current.is_none() {
            return Err(StorageError::NotFound);
        }
        check(precondition, current)?;
        data.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn fields(title: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("title".into(), json!(title));
        p
    }

    #[tokio::test]
    async fn create_then_conflict_on_recreate() {
        let store = MemoryContentStore::new();
        let rev = store
            .put("article", 1, &id("a"), &fields("x"), Precondition::MustNotExist)
            .await
            .unwrap();
        assert_eq!(rev, Revision::FIRST);
        let err = store
            .put("article", 1, &id("a"), &fields("y"), Precondition::MustNotExist)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::Conflict {
                expected: Precondition::MustNotExist,
                found: Some(Revision(1))
            }
        );
    }

    #[tokio::test]
    async fn revision_preconditions() {
        let store = MemoryContentStore::new();
        store
            .put("article", 1, &id("a"), &fields("x"), Precondition::Any)
            .await
            .unwrap();
        let r2 = store
            .put("article", 2, &id("a"), &fields("y"), Precondition::Revision(Revision(1)))
            .await
            .unwrap();
        assert_eq!(r2, Revision(2));
        assert!(store
            .put("article", 2, &id("a"), &fields("z"), Precondition::Revision(Revision(1)))
            .await
            .is_err());
        let got = store.get("article", &id("a")).await.unwrap();
        assert_eq!(got.schema_version, 2);
        assert_eq!(got.fields["title"], json!("y"));
    }

    #[tokio::test]
    async fn delete_semantics() {
        let store = MemoryContentStore::new();
        assert_eq!(
            store.delete("article", &id("a"), Precondition::Any).await,
            Err(StorageError::NotFound)
        );
        store
            .put("article", 1, &id("a"), &fields("x"), Precondition::Any)
            .await
            .unwrap();
        assert!(store
            .delete("article", &id("a"), Precondition::Revision(Revision(9)))
            .await
            .is_err());
        store
            .delete("article", &id("a"), Precondition::Revision(Revision(1)))
            .await
            .unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get("article", &id("a")).await, Err(StorageError::NotFound));
    }

    #[tokio::test]
    async fn schemas_are_separate_namespaces() {
        let store = MemoryContentStore::new();
        store
            .put("article", 1, &id("a"), &fields("x"), Precondition::MustNotExist)
            .await
            .unwrap();
        store
            .put("page", 1, &id("a"), &fields("y"), Precondition::MustNotExist)
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }
}
