//! Value codecs for durable queues
//!
//! A codec turns a typed value into the bytes stored under a queue slot and
//! back. Codecs are shared by every producer and consumer of a queue, so they
//! take `&self` and draw scratch space from a [`SerializerPool`] rather than
//! holding a serializer behind a lock.

pub mod binary;
pub mod error;
pub mod json;
pub mod pool;

pub use binary::BincodeCodec;
pub use error::{Error, Result};
pub use json::JsonCodec;
pub use pool::{PoolConfig, PooledBuffer, SerializerPool};

/// Largest payload a codec accepts by default (20 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 20 * 1024 * 1024;

/// Converts values of `T` to and from stored bytes
pub trait Codec<T>: Send + Sync {
    /// Serialize a value, failing with [`Error::PayloadTooLarge`] when the
    /// result exceeds [`Codec::max_payload_size`]
    fn encode(&self, value: &T) -> Result<PooledBuffer>;

    /// Deserialize a value; corrupt or mismatched input is [`Error::Decode`]
    fn decode(&self, bytes: &[u8]) -> Result<T>;

    fn max_payload_size(&self) -> usize;
}
