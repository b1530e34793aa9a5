//! Master secret, per-field key derivation and the derived-key cache.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use parking_lot::RwLock;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of a derived field key in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// Minimum accepted master secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// HKDF salt. Changing it changes every derived key.
const DERIVATION_SALT: &[u8] = b"vellum/field-key/v1";

// ---------------------------------------------------------------------------
// MasterSecret
// ---------------------------------------------------------------------------

/// The root secret every field key is derived from.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    bytes: Vec<u8>,
}

impl MasterSecret {
    /// Wrap raw secret bytes.
    ///
    /// # Errors
    ///
    /// `SecretTooShort` below [`MIN_SECRET_LEN`] bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SECRET_LEN {
            let actual = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(CryptoError::SecretTooShort {
                min: MIN_SECRET_LEN,
                actual,
            });
        }
        Ok(Self { bytes })
    }

    /// Decode a standard base64 secret.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::SecretEncoding)?;
        Self::from_bytes(bytes)
    }

    /// Derive the key for one schema field.
    pub fn derive(&self, schema: &str, field_path: &str) -> Result<FieldKey, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(Some(DERIVATION_SALT), &self.bytes);
        let context = key_context(schema, field_path);
        let mut okm = [0u8; KEY_SIZE];
        hkdf.expand(context.as_bytes(), &mut okm)
            .map_err(|_| CryptoError::KeyDerivation { context })?;
        Ok(FieldKey { bytes: okm })
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// `schema/field-path`: the HKDF info string and the AEAD associated data.
pub(crate) fn key_context(schema: &str, field_path: &str) -> String {
    format!("{schema}/{field_path}")
}

// ---------------------------------------------------------------------------
// FieldKey
// ---------------------------------------------------------------------------

/// A derived per-field key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey {
    bytes: [u8; KEY_SIZE],
}

impl FieldKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KeyCache
// ---------------------------------------------------------------------------

/// Read-mostly cache of derived keys keyed by `(schema, field path)`.
///
/// Lookups take the read lock. A miss takes the write lock and checks
/// again before deriving, so each key is derived once however many
/// operations miss on it at the same time.
#[derive(Debug)]
pub struct KeyCache {
    master: MasterSecret,
    keys: RwLock<HashMap<(String, String), Arc<FieldKey>>>,
}

impl KeyCache {
    pub fn new(master: MasterSecret) -> Self {
        Self {
            master,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch or derive the key for one schema field.
    pub fn key_for(&self, schema: &str, field_path: &str) -> Result<Arc<FieldKey>, CryptoError> {
        let lookup = (schema.to_string(), field_path.to_string());
        if let Some(key) = self.keys.read().get(&lookup) {
            return Ok(Arc::clone(key));
        }

        let mut keys = self.keys.write();
        if let Some(key) = keys.get(&lookup) {
            return Ok(Arc::clone(key));
        }
        let key = Arc::new(self.master.derive(schema, field_path)?);
        tracing::debug!(schema, field = field_path, "derived field key");
        keys.insert(lookup, Arc::clone(&key));
        Ok(key)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
