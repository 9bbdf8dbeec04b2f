//! Durable FIFO queues on embedded key-value stores
//!
//! A [`DurableQueue`] persists every offered value under a monotonically
//! increasing slot and survives restarts and crashes by re-deriving its head
//! and tail from what is on disk. It runs on either of two engines:
//! - an ordered Fjall keyspace, where the head is the smallest stored slot
//! - a transactional LMDB environment, where the head is a persisted pointer
//!   moved in the same transaction that removes a consumed entry
//!
//! # Example
//!
//! ```no_run
//! use proven_durable_queue::{DurableQueue, QueueConfig};
//!
//! let queue: DurableQueue<String> =
//!     DurableQueue::open(QueueConfig::ordered("/var/lib/jobs"))?;
//! queue.offer(&"resize cat.png".to_string())?;
//!
//! if let Some(job) = queue.poll()? {
//!     println!("working on {}", job);
//! }
//! queue.close()?;
//! # Ok::<(), proven_durable_queue::Error>(())
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod queue;
pub mod reservation;

pub use allocator::IndexAllocator;
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use queue::DurableQueue;
pub use reservation::{ConsumeState, Delivery};

// Re-export the pieces needed to configure a queue
pub use proven_codec::{BincodeCodec, Codec, JsonCodec, PoolConfig, SerializerPool};
pub use proven_store::{
    BackendConfig, Capability, OrderedConfig, SlotBounds, TransactionalConfig, WriteMode,
};
