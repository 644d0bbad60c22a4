//! Object encoding for typed cache access
//!
//! The disk store only deals in bytes. Typed puts and gets go through a
//! [`Serializer`], with the caller naming the target type at the call site.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KashError, Result};

/// Encode and decode arbitrary objects to and from bytes
pub trait Serializer: Send + Sync {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON serializer, the default
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| KashError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| KashError::Decode(e.to_string()))
    }
}

/// Compact binary serializer backed by bincode
///
/// Not self-describing: values must be decoded as the exact type they were
/// encoded from.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| KashError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| KashError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
        tags: Vec<String>,
    }

    fn profile() -> Profile {
        Profile {
            id: 7,
            name: "sea".into(),
            tags: vec!["admin".into()],
        }
    }

    #[test]
    fn test_json_output_is_plain_json() {
        let bytes = JsonSerializer.encode(&profile()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"name\":\"sea\""));
    }

    #[test]
    fn test_json_decode_wrong_shape() {
        let bytes = JsonSerializer.encode(&vec![1, 2, 3]).unwrap();
        let result: Result<Profile> = JsonSerializer.decode(&bytes);
        assert!(matches!(result, Err(KashError::Decode(_))));
    }

    #[test]
    fn test_bincode_decodes_into_same_type() {
        let bytes = BincodeSerializer.encode(&profile()).unwrap();
        let decoded: Profile = BincodeSerializer.decode(&bytes).unwrap();
        assert_eq!(decoded, profile());
    }

    #[test]
    fn test_bincode_truncated_input() {
        let bytes = BincodeSerializer.encode(&profile()).unwrap();
        let result: Result<Profile> = BincodeSerializer.decode(&bytes[..4]);
        assert!(matches!(result, Err(KashError::Decode(_))));
    }
}
