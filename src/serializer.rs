//! Pluggable marshaling for RPC payloads (actor system) and message-codec
//! payloads (session agent). Every component that needs to turn a typed
//! value into bytes (or back) is generic over a `Serializer`, the same
//! shape used to make the wider runtime generic over its payload
//! encoding.

use serde::de::DeserializeOwned;
use serde::Serialize as SerdeSerialize;

use crate::error::{CherryError, ErrorCode};

/// A marshaling scheme. `JsonSerializer` is the only implementation that
/// ships, generalizing `api/schema/json.rs`'s `Json` schema; a binary
/// scheme (bincode, protobuf) could implement this trait without touching
/// any caller.
pub trait Serializer: Default + Send + Sync + 'static {
    fn marshal<T: SerdeSerialize>(value: &T) -> Result<Vec<u8>, CherryError>;
    fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CherryError>;
}

/// JSON marshaling via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn marshal<T: SerdeSerialize>(value: &T) -> Result<Vec<u8>, CherryError> {
        serde_json::to_vec(value).map_err(|e| CherryError::with_source(ErrorCode::MarshalError, e))
    }

    fn unmarshal<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CherryError> {
        serde_json::from_slice(bytes).map_err(|e| CherryError::with_source(ErrorCode::UnmarshalError, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn json_round_trips() {
        let value = Sample {
            a: 7,
            b: "hi".to_string(),
        };
        let bytes = JsonSerializer::marshal(&value).unwrap();
        let back: Sample = JsonSerializer::unmarshal(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn unmarshal_failure_maps_to_unmarshal_error() {
        let err = JsonSerializer::unmarshal::<Sample>(b"not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnmarshalError);
    }
}
