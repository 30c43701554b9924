//! Serde helpers for binary fields.
//!
//! Keys, commitments, deals and signatures travel inside JSON documents, so
//! they are written as standard base64 strings.
//!
//! ```ignore
//! use tessera_protocol::serde::base64_bytes;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Confirmation {
//!     #[serde(with = "base64_bytes")]
//!     payload: Vec<u8>,
//! }
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serializer};

/// Serde module for `Vec<u8>` as base64
pub mod base64_bytes {
    use super::*;

    /// Serialize bytes as a base64 string
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode(bytes))
    }

    /// Deserialize bytes from a base64 string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Serde module for `Option<Vec<u8>>` as an optional base64 string
pub mod base64_opt {
    use super::*;

    /// Serialize optional bytes
    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional bytes
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Encode bytes the same way the serde helpers do
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
        #[serde(with = "super::base64_opt", default)]
        extra: Option<Vec<u8>>,
    }

    #[test]
    fn test_bytes_are_base64_strings() {
        let blob = Blob {
            data: b"tessera".to_vec(),
            extra: None,
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"dGVzc2VyYQ==","extra":null}"#);
        assert_eq!(serde_json::from_str::<Blob>(&json).unwrap(), blob);
    }

    #[test]
    fn test_missing_optional_field() {
        let blob: Blob = serde_json::from_str(r#"{"data":"AAE="}"#).unwrap();
        assert_eq!(blob.data, vec![0, 1]);
        assert!(blob.extra.is_none());
    }

    #[test]
    fn test_encode_matches_serialized_field() {
        let blob = Blob {
            data: vec![0xde, 0xad],
            extra: Some(vec![7; 5]),
        };
        let value = serde_json::to_value(&blob).unwrap();
        assert_eq!(value["data"], super::encode(&blob.data));
        assert_eq!(value["extra"], super::encode(&[7; 5]));
    }

    #[test]
    fn test_rejects_invalid_base64() {
        assert!(serde_json::from_str::<Blob>(r#"{"data":"***"}"#).is_err());
    }
}
