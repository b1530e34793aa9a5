//! Audit sinks.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use vellum_core::{sha256_digest, CanonicalBytes, ContentDigest};

use crate::error::AuditError;
use crate::record::AuditRecord;

/// Append-only destination for audit records.
///
/// Implementations must make each `append` atomic: concurrent appends may
/// land in any order but never interleave within one record.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Durably append one record.
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Cheap probe of whether an append would currently succeed.
    async fn health_check(&self) -> Result<(), AuditError>;
}

// ---------------------------------------------------------------------------
// MemoryAuditSink
// ---------------------------------------------------------------------------

/// A stored record with its position in the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainedEntry {
    pub seq: u64,
    pub prev: Option<ContentDigest>,
    pub digest: ContentDigest,
    pub record: AuditRecord,
}

/// The part of an entry its digest covers.
#[derive(Serialize)]
struct Link<'a> {
    seq: u64,
    prev: Option<&'a ContentDigest>,
    record: &'a AuditRecord,
}

fn link_digest(
    seq: u64,
    prev: Option<&ContentDigest>,
    record: &AuditRecord,
) -> Result<ContentDigest, AuditError> {
    let canonical = CanonicalBytes::new(&Link { seq, prev, record })?;
    Ok(sha256_digest(&canonical))
}

/// In-process, hash-chained audit sink.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<ChainedEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.entries.read().iter().map(|e| e.record.clone()).collect()
    }

    /// Snapshot of every chained entry, oldest first.
    pub fn entries(&self) -> Vec<ChainedEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Digest of the newest entry.
    pub fn head(&self) -> Option<ContentDigest> {
        self.entries.read().last().map(|e| e.digest)
    }

    /// Recompute every digest and back-link.
    pub fn verify_chain(&self) -> Result<(), AuditError> {
        verify(&self.entries.read())
    }

    #[cfg(test)]
    fn tamper<F: FnOnce(&mut ChainedEntry)>(&self, index: usize, f: F) {
        if let Some(entry) = self.entries.write().get_mut(index) {
            f(entry);
        }
    }
}

fn verify(entries: &[ChainedEntry]) -> Result<(), AuditError> {
    let mut prev: Option<ContentDigest> = None;
    for (index, entry) in entries.iter().enumerate() {
        let broken = AuditError::ChainBroken { seq: entry.seq };
        if entry.seq != index as u64 || entry.prev != prev {
            return Err(broken);
        }
        if link_digest(entry.seq, entry.prev.as_ref(), &entry.record)? != entry.digest {
            return Err(broken);
        }
        prev = Some(entry.digest);
    }
    Ok(())
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        // The write lock spans digest and push so the chain stays linear.
        let mut entries = self.entries.write();
        let seq = entries.len() as u64;
        let prev = entries.last().map(|e| e.digest);
        let digest = link_digest(seq, prev.as_ref(), record)?;
        entries.push(ChainedEntry {
            seq,
            prev,
            digest,
            record: record.clone(),
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AuditError> {
        Ok(())
    }
}
