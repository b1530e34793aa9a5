//! # vellum-crypto — Field Encryption Codec
//!
//! Encrypts individual field values at rest.
//!
//! - **Keys** (`key.rs`): a [`MasterSecret`] never leaves this crate's
//!   types. Each schema + field path gets its own 256-bit key derived with
//!   HKDF-SHA256. Derived keys are cached in a [`KeyCache`] that is
//!   read-mostly and populated with double-checked initialization.
//! - **Cipher** (`cipher.rs`): ChaCha20-Poly1305 with a random 96-bit
//!   nonce. The associated data is `schema/field-path`, so a ciphertext
//!   copied into another field does not decrypt.
//! - **Codec** (`codec.rs`): [`FieldCodec`] seals a JSON value into an
//!   envelope string `vellum:enc:v1:<base64>` and opens it again.
//!
//! ## Crate Policy
//!
//! - Key material and plaintext are never logged and never appear in
//!   `Debug` output.
//! - Decryption failure is an error value for one field, never a panic.

pub mod cipher;
pub mod codec;
pub mod error;
pub mod key;

pub use codec::{FieldCodec, ENVELOPE_PREFIX};
pub use error::CryptoError;
pub use key::{FieldKey, KeyCache, MasterSecret, KEY_SIZE, MIN_SECRET_LEN};
