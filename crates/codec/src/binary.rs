//! Compact binary codec backed by bincode

use crate::error::{Error, Result};
use crate::pool::{PooledBuffer, SerializerPool};
use crate::{Codec, DEFAULT_MAX_PAYLOAD_SIZE};
use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Bincode codec for any serde type
///
/// Uses varint integers and rejects trailing bytes, so a payload written for
/// one type rarely decodes cleanly as another. Not suitable for
/// self-describing values such as `serde_json::Value`; use
/// [`JsonCodec`](crate::JsonCodec) for those.
pub struct BincodeCodec<T> {
    pool: SerializerPool,
    max_payload_size: usize,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            max_payload_size: self.max_payload_size,
            _phantom: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("max_payload_size", &self.max_payload_size)
            .finish()
    }
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self::with_pool(SerializerPool::default())
    }

    /// Share an existing buffer pool
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

    pub fn pool(&self) -> &SerializerPool {
        &self.pool
    }

    fn options() -> impl Options {
        bincode::DefaultOptions::new()
    }
}

impl<T> Codec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<PooledBuffer> {
        // Sized up front so an oversized value is never buffered
        let size = Self::options()
            .serialized_size(value)
            .map_err(|e| Error::Encode(e.to_string()))?;
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        if size > self.max_payload_size {
            return Err(Error::PayloadTooLarge {
                size,
                limit: self.max_payload_size,
            });
        }

        let mut buf = self.pool.checkout();
        buf.reserve(size);
        Self::options()
            .serialize_into(&mut *buf, value)
            .map_err(|e| Error::Encode(e.to_string()))?;

        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Self::options()
            .with_limit(self.max_payload_size as u64)
            .deserialize(bytes)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Image {
        name: String,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    }

    fn image(name: &str, size: usize) -> Image {
        Image {
            name: name.to_string(),
            width: 4,
            height: 4,
            pixels: vec![0xAB; size],
        }
    }

    #[test]
    fn test_encode_decode() {
        let codec = BincodeCodec::<Image>::new();
        let original = image("cat.png", 16);

        let bytes = codec.encode(&original).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_payload_limit_enforced() {
        let codec = BincodeCodec::<Image>::new().with_max_payload_size(64);

        let result = codec.encode(&image("big.png", 1024));
        assert!(matches!(
            result,
            Err(Error::PayloadTooLarge { limit: 64, .. })
        ));

        assert!(codec.encode(&image("small.png", 8)).is_ok());
    }

    #[test]
    fn test_oversized_value_is_rejected_before_buffering() {
        let pool = SerializerPool::default();
        let codec = BincodeCodec::<Image>::with_pool(pool.clone())
            .with_max_payload_size(1024);

        // 8 (name) + 1 + 1 (dimensions) + 5 + 65536 (pixels)
        let result = codec.encode(&image("big.png", 65536));
        assert_eq!(
            result.unwrap_err(),
            Error::PayloadTooLarge {
                size: 65551,
                limit: 1024,
            }
        );

        // No buffer was ever checked out
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_truncated_input_is_decode_error() {
        let codec = BincodeCodec::<Image>::new();
        let bytes = codec.encode(&image("cat.png", 16)).unwrap();

        let result = codec.decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let strings = BincodeCodec::<String>::new();
        let numbers = BincodeCodec::<u64>::new();

        // A string's bytes carry a length prefix and content, so reading a
        // single varint leaves trailing bytes behind.
        let bytes = strings.encode(&"not a number".to_string()).unwrap();
        assert!(matches!(numbers.decode(&bytes), Err(Error::Decode(_))));
    }

    #[test]
    fn test_encode_reuses_pool_buffers() {
        let pool = SerializerPool::default();
        let codec = BincodeCodec::<Image>::with_pool(pool.clone());

        for i in 0..10 {
            let bytes = codec.encode(&image(&format!("{}.png", i), 32)).unwrap();
            assert!(!bytes.is_empty());
        }

        assert_eq!(pool.idle_count(), 1);
    }
}
