//! Errors from key handling and field sealing.

use thiserror::Error;

/// Encryption codec failures.
///
/// Messages name the field but never include key bytes or plaintext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The master secret is shorter than the minimum length.
    #[error("master secret must be at least {min} bytes, got {actual}")]
    SecretTooShort { min: usize, actual: usize },

    /// The master secret is not valid base64.
    #[error("master secret is not valid base64")]
    SecretEncoding,

    /// HKDF refused the requested output length.
    #[error("key derivation failed for {context}")]
    KeyDerivation { context: String },

    /// The AEAD refused to seal, or the value could not be encoded.
    #[error("encryption failed for {field}: {reason}")]
    EncryptionFailed { field: String, reason: String },

    /// Wrong key, tampered ciphertext, a malformed envelope, or a value
    /// that was never sealed.
    #[error("decryption failed for {field}: {reason}")]
    DecryptionFailed { field: String, reason: &'static str },
}
