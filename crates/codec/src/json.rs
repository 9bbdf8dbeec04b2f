//! JSON codec for self-describing values

use crate::error::{Error, Result};
use crate::pool::{PooledBuffer, SerializerPool};
use crate::{Codec, DEFAULT_MAX_PAYLOAD_SIZE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::marker::PhantomData;

/// serde_json codec
///
/// Larger than [`BincodeCodec`](crate::BincodeCodec) but works with types
/// that need `deserialize_any`, such as `serde_json::Value`.
pub struct JsonCodec<T> {
    pool: SerializerPool,
    max_payload_size: usize,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            max_payload_size: self.max_payload_size,
            _phantom: PhantomData,
        }
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::with_pool(SerializerPool::default())
    }

    pub fn with_pool(pool: SerializerPool) -> Self {
        Self {
            pool,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            _phantom: PhantomData,
        }
    }

    pub fn with_max_payload_size(mut self, limit: usize) -> Self {
        self.max_payload_size = limit;
        self
    }
}

/// Appends to `buf` until a write would take it past `limit`
struct BoundedWriter<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
    exceeded_at: Option<usize>,
}

impl io::Write for BoundedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let size = self.buf.len().saturating_add(data.len());
        if size > self.limit {
            self.exceeded_at = Some(size);
            return Err(io::Error::other("payload limit reached"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<PooledBuffer> {
        let mut buf = self.pool.checkout();
        let mut writer = BoundedWriter {
            buf: &mut *buf,
            limit: self.max_payload_size,
            exceeded_at: None,
        };

        if let Err(e) = serde_json::to_writer(&mut writer, value) {
            return Err(match writer.exceeded_at {
                Some(size) => Error::PayloadTooLarge {
                    size,
                    limit: self.max_payload_size,
                },
                None => Error::Encode(e.to_string()),
            });
        }

        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        if bytes.len() > self.max_payload_size {
            return Err(Error::Decode(format!(
                "payload of {} bytes exceeds limit of {} bytes",
                bytes.len(),
                self.max_payload_size
            )));
        }
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_json_values() {
        let codec = JsonCodec::<Value>::new();

        let bytes = codec.encode(&json!({"a": 1})).unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
        assert_eq!(codec.decode(&bytes).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let codec = JsonCodec::<Value>::new();
        assert!(matches!(codec.decode(b"{\"a\":"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_payload_limit_enforced() {
        let codec = JsonCodec::<Value>::new().with_max_payload_size(8);
        let result = codec.encode(&json!({"key": "a long value"}));
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_encoding_stops_at_limit() {
        let codec = JsonCodec::<Vec<u32>>::new().with_max_payload_size(64);
        let numbers: Vec<u32> = (0..100_000).collect();

        match codec.encode(&numbers) {
            Err(Error::PayloadTooLarge { size, limit }) => {
                assert_eq!(limit, 64);
                // Stopped within one write of the limit, not after the whole array
                assert!(size > 64 && size < 128, "stopped at {}", size);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }

        let small: Vec<u32> = (0..5).collect();
        assert_eq!(&codec.encode(&small).unwrap()[..], b"[0,1,2,3,4]");
    }
}
