//! Frame codec abstraction.
//!
//! A [`FrameCodec`] turns a sequence of [`Value`]s into the binary payload
//! of one socket message and back. The client treats the codec as opaque:
//! any implementation works as long as `decode(encode(frame)) == frame`.
//! [`BincodeCodec`] is the default implementation shipped with the crate.

use crate::error::RoomcastError;
use crate::value::Value;

/// Converts value sequences to and from binary frame payloads.
///
/// Implementations must be stateless with respect to individual frames —
/// every call encodes or decodes exactly one complete frame.
pub trait FrameCodec: Send + Sync + 'static {
    /// Encode one frame into bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RoomcastError::Encode`] if the frame cannot be serialized.
    fn encode(&self, frame: &[Value]) -> Result<Vec<u8>, RoomcastError>;

    /// Decode one frame from bytes.
    ///
    /// The whole buffer must be consumed; trailing bytes are an error.
    ///
    /// # Errors
    ///
    /// Returns [`RoomcastError::Decode`] if the bytes are not a valid frame.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, RoomcastError>;
}

/// Default [`FrameCodec`] backed by `bincode`'s serde mode with the
/// standard configuration (varint lengths, little endian).
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl FrameCodec for BincodeCodec {
    fn encode(&self, frame: &[Value]) -> Result<Vec<u8>, RoomcastError> {
        Ok(bincode::serde::encode_to_vec(
            frame,
            bincode::config::standard(),
        )?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, RoomcastError> {
        let (frame, consumed): (Vec<Value>, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if consumed != bytes.len() {
            return Err(RoomcastError::Decode(bincode::error::DecodeError::Other(
                "trailing bytes after frame",
            )));
        }
        Ok(frame)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn round_trips_a_representative_frame() {
        let mut map = BTreeMap::new();
        map.insert("ttl".to_string(), Value::Int(30));
        let frame = vec![
            Value::Int(0),
            Value::Str("join".into()),
            Value::Str("r1".into()),
            Value::Bytes(vec![0xDE, 0xAD]),
            Value::List(vec![Value::Bool(true), Value::Float(1.5)]),
            Value::Map(map),
            Value::Null,
        ];

        let bytes = BincodeCodec.encode(&frame).unwrap();
        let decoded = BincodeCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_garbage() {
        let err = BincodeCodec.decode(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, RoomcastError::Decode(_)));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = BincodeCodec.encode(&[Value::Int(1)]).unwrap();
        bytes.push(0x00);
        let err = BincodeCodec.decode(&bytes).unwrap_err();
        assert!(matches!(err, RoomcastError::Decode(_)));
    }

    #[test]
    fn empty_frame_round_trips() {
        let bytes = BincodeCodec.encode(&[]).unwrap();
        assert_eq!(BincodeCodec.decode(&bytes).unwrap(), Vec::<Value>::new());
    }
}
