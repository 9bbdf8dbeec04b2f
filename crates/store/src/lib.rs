//! Slot stores for durable queues
//!
//! A slot store maps monotonically increasing `u64` slots to payload bytes
//! and can tell where the queue's head and tail were after a restart. Two
//! engines are supported:
//! - [`OrderedStore`]: a Fjall partition; the head is the smallest key
//! - [`TransactionalStore`]: an LMDB database; the head is a persisted
//!   pointer updated atomically with each consumption
//!
//! [`Backend`] wraps either one behind the [`SlotStore`] trait.

pub mod backend;
pub mod config;
pub mod error;
pub mod keys;
pub mod ordered;
pub mod store;
pub mod transactional;

pub use backend::Backend;
pub use config::{BackendConfig, OrderedConfig, TransactionalConfig, WriteMode};
pub use error::{Error, Result};
pub use ordered::OrderedStore;
pub use store::{Capability, SlotBounds, SlotStore};
pub use transactional::{ReadScope, TransactionalStore, WriteScope};
