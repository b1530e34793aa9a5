//! Sealing JSON field values into envelope strings.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use crate::cipher;
use crate::error::CryptoError;
use crate::key::{key_context, KeyCache, MasterSecret};

/// Prefix of every sealed value as stored.
pub const ENVELOPE_PREFIX: &str = "vellum:enc:v1:";

/// Encrypts and decrypts field values for one master secret.
#[derive(Debug)]
pub struct FieldCodec {
    keys: KeyCache,
}

impl FieldCodec {
    pub fn new(master: MasterSecret) -> Self {
        Self {
            keys: KeyCache::new(master),
        }
    }

    /// Whether `value` is a sealed envelope.
    pub fn is_sealed(value: &Value) -> bool {
        matches!(value, Value::String(s) if s.starts_with(ENVELOPE_PREFIX))
    }

    /// Seal a value of any JSON type into an envelope string.
    ///
    /// The plaintext is the value's JSON encoding; the associated data is
    /// `schema/field_path`.
    pub fn encrypt(
        &self,
        schema: &str,
        field_path: &str,
        value: &Value,
    ) -> Result<Value, CryptoError> {
        let failed = |reason: String| CryptoError::EncryptionFailed {
            field: key_context(schema, field_path),
            reason,
        };
        let key = self.keys.key_for(schema, field_path)?;
        let plaintext = serde_json::to_vec(value).map_err(|e| failed(e.to_string()))?;
        let aad = key_context(schema, field_path);
        let sealed = cipher::seal(&key, aad.as_bytes(), &plaintext).map_err(failed)?;
        Ok(Value::String(format!(
            "{ENVELOPE_PREFIX}{}",
            STANDARD.encode(sealed)
        )))
    }

    /// Open an envelope produced by [`encrypt`](Self::encrypt) for the same
    /// schema and field path.
    ///
    /// # Errors
    ///
    /// `DecryptionFailed` if the value is not an envelope, the payload is
    /// not base64, the key or associated data do not match, or the
    /// ciphertext was altered.
    pub fn decrypt(
        &self,
        schema: &str,
        field_path: &str,
        value: &Value,
    ) -> Result<Value, CryptoError> {
        let failed = |reason: &'static str| CryptoError::DecryptionFailed {
            field: key_context(schema, field_path),
            reason,
        };
        let encoded = match value {
            Value::String(s) => s.strip_prefix(ENVELOPE_PREFIX),
            _ => None,
        }
        .ok_or_else(|| failed("value is not sealed"))?;
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|_| failed("envelope is not base64"))?;

        let key = self.keys.key_for(schema, field_path)?;
        let aad = key_context(schema, field_path);
        let plaintext = cipher::open(&key, aad.as_bytes(), &sealed)
            .ok_or_else(|| failed("wrong key or tampered data"))?;
        serde_json::from_slice(&plaintext).map_err(|_| failed("plaintext is not JSON"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec(fill: u8) -> FieldCodec {
        FieldCodec::new(MasterSecret::from_bytes(vec![fill; 32]).unwrap())
    }

    #[test]
    fn any_json_type_round_trips() {
        let c = codec(1);
        for v in [json!("body"), json!(42), json!(true), json!({"a": [1, 2]}), json!("")] {
            let sealed = c.encrypt("article", "content", &v).unwrap();
            assert!(FieldCodec::is_sealed(&sealed));
            assert_eq!(c.decrypt("article", "content", &sealed).unwrap(), v);
        }
    }

    #[test]
    fn moved_ciphertext_does_not_open() {
        let c = codec(1);
        let sealed = c.encrypt("article", "content", &json!("secret")).unwrap();
        assert!(matches!(
            c.decrypt("article", "summary", &sealed),
            Err(CryptoError::DecryptionFailed { .. })
        ));
        assert!(c.decrypt("page", "content", &sealed).is_err());
    }

    #[test]
    fn other_master_secret_fails() {
        let sealed = codec(1).encrypt("a", "b", &json!("x")).unwrap();
        assert_eq!(
            codec(2).decrypt("a", "b", &sealed).unwrap_err(),
            CryptoError::DecryptionFailed {
                field: "a/b".into(),
                reason: "wrong key or tampered data"
            }
        );
    }

    #[test]
    fn unsealed_and_malformed_values_fail() {
        let c = codec(1);
        for v in [json!("plain text"), json!(7), json!("vellum:enc:v1:@@@")] {
            assert!(matches!(
                c.decrypt("a", "b", &v),
                Err(CryptoError::DecryptionFailed { .. })
            ));
        }
    }

    #[test]
    fn error_messages_never_carry_plaintext() {
        let c = codec(1);
        let sealed = c.encrypt("a", "b", &json!("hunter2")).unwrap();
        let err = codec(3).decrypt("a", "b", &sealed).unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_json() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                ".*".prop_map(Value::String),
            ];
            leaf.prop_recursive(2, 12, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn decrypt_inverts_encrypt(v in arb_json()) {
                let c = codec(7);
                let sealed = c.encrypt("doc", "body", &v).unwrap();
                prop_assert_eq!(c.decrypt("doc", "body", &sealed).unwrap(), v);
            }

            #[test]
            fn ciphertext_differs_from_plaintext(s in ".+") {
                let c = codec(7);
                let v = Value::String(s);
                let sealed = c.encrypt("doc", "body", &v).unwrap();
                prop_assert_ne!(sealed, v);
            }
        }
    }
}
