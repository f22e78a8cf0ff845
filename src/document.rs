//! YAML documents to and from token payloads
//!
//! The token layer only ever sees bytes; this module turns any serde type
//! (typically a [`serde_yaml::Value`]) into the YAML text that gets sealed,
//! and back.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ErrorCategory, ErrorKind, Result, SealdocError};
use crate::key::Key;
use crate::token::{self, Freshness};

/// Serialize a document to YAML bytes.
pub fn to_payload<T: Serialize + ?Sized>(document: &T) -> Result<Vec<u8>> {
    let yaml = serde_yaml::to_string(document).map_err(|e| {
        SealdocError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Document,
            format!("failed to serialize document: {}", e),
            e,
        )
    })?;
    Ok(yaml.into_bytes())
}

/// Parse YAML bytes into a document.
pub fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_yaml::from_slice(payload).map_err(|e| {
        SealdocError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Document,
            format!("failed to parse document: {}", e),
            e,
        )
    })
}

/// Serialize a document and seal it into a token.
pub fn encrypt_document<T: Serialize + ?Sized>(key: &Key, document: &T) -> Result<String> {
    let payload = to_payload(document)?;
    Ok(token::encrypt(key, &payload)?)
}

/// Open a token and parse the payload as a document.
pub fn decrypt_document<T: DeserializeOwned>(
    key: &Key,
    token: impl AsRef<[u8]>,
    freshness: &Freshness,
) -> Result<T> {
    let payload = token::decrypt(key, token, freshness)?;
    from_payload(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_key;
    use serde::Deserialize;
    use serde_yaml::Value;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Database {
        host: String,
        port: u16,
        password: String,
    }

    #[test]
    fn test_value_roundtrip() {
        let key = generate_key().unwrap();
        let document: Value = serde_yaml::from_str("db_password: secret123\nretries: 3\n").unwrap();

        let token = encrypt_document(&key, &document).unwrap();
        let decrypted: Value = decrypt_document(&key, &token, &Freshness::none()).unwrap();

        assert_eq!(decrypted, document);
        assert_eq!(decrypted["db_password"].as_str(), Some("secret123"));
    }

    #[test]
    fn test_typed_roundtrip() {
        let key = generate_key().unwrap();
        let document = Database {
            host: "db.internal".to_string(),
            port: 5432,
            password: "hunter2".to_string(),
        };

        let token = encrypt_document(&key, &document).unwrap();
        let decrypted: Database = decrypt_document(&key, &token, &Freshness::none()).unwrap();
        assert_eq!(decrypted, document);
    }

    #[test]
    fn test_nested_and_sequence_values() {
        let key = generate_key().unwrap();
        let yaml = "servers:\n  - name: a\n    weight: 1.5\n  - name: b\n    tags: [x, y]\n";
        let document: Value = serde_yaml::from_str(yaml).unwrap();

        let token = encrypt_document(&key, &document).unwrap();
        let decrypted: Value = decrypt_document(&key, &token, &Freshness::none()).unwrap();
        assert_eq!(decrypted, document);
    }

    #[test]
    fn test_payload_is_yaml_text() {
        let document: Value = serde_yaml::from_str("a: 1").unwrap();
        let payload = to_payload(&document).unwrap();
        assert_eq!(payload, b"a: 1\n");
    }

    #[test]
    fn test_wrong_key_reports_signature_error() {
        let key = generate_key().unwrap();
        let other = generate_key().unwrap();
        let document: Value = serde_yaml::from_str("a: 1").unwrap();

        let token = encrypt_document(&key, &document).unwrap();
        let err = decrypt_document::<Value>(&other, &token, &Freshness::none()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidSignature));
    }

    #[test]
    fn test_payload_not_matching_type() {
        let key = generate_key().unwrap();
        let token = token::encrypt(&key, b"just a string").unwrap();

        let err = decrypt_document::<Database>(&key, &token, &Freshness::none()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Document));
    }

    #[test]
    fn test_invalid_yaml_payload() {
        let err = from_payload::<Value>(b"a: [unclosed").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Document));
    }
}
