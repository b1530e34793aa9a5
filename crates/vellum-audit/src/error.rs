//! Audit errors.

use thiserror::Error;
use vellum_core::CanonicalizationError;

#[derive(Error, Debug)]
pub enum AuditError {
    /// The sink rejected or could not accept a record.
    #[error("audit sink error: {0}")]
    Sink(String),

    /// Recording failed after the retry.
    #[error("audit trail unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },

    /// A record could not be canonicalized for hashing.
    #[error("audit record canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// An entry's digest or back-link does not match.
    #[error("audit chain broken at sequence {seq}")]
    ChainBroken { seq: u64 },
}
