//! The slot store abstraction shared by both engines

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What kind of engine sits behind a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Sorted map with implicit commits; the head is the smallest key
    Ordered,

    /// Explicit read/write transactions; the head is a persisted pointer
    Transactional,
}

/// Head and tail positions recovered from persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotBounds {
    /// Next slot to consume
    pub head: u64,

    /// Next slot to allocate
    pub tail: u64,
}

impl SlotBounds {
    pub fn new(head: u64, tail: u64) -> Self {
        Self { head, tail }
    }

    pub fn len(&self) -> u64 {
        self.tail.saturating_sub(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A persistent map from slot numbers to payload bytes
///
/// `from` arguments are the caller's view of the head. The ordered engine
/// ignores them since its head is simply the smallest key; the transactional
/// engine uses them as the first key to look up.
pub trait SlotStore: Send + Sync {
    fn capability(&self) -> Capability;

    /// Derive head and tail from what is on disk
    fn recover(&self) -> Result<SlotBounds>;

    /// Store a payload under a freshly allocated slot
    fn put(&self, slot: u64, payload: &[u8]) -> Result<()>;

    /// Read the head entry without removing it
    fn first(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>>;

    /// Read and remove the head entry
    fn take_first(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>>;

    /// Remove a consumed slot. Returns false if it was not present.
    fn remove(&self, slot: u64) -> Result<bool>;

    /// Every stored entry in slot order, leaving the store untouched
    fn entries(&self) -> Result<Vec<(u64, Vec<u8>)>>;

    /// Put back an entry previously taken with `take_first`
    fn restore(&self, slot: u64, payload: &[u8]) -> Result<()>;

    /// Number of live entries, excluding metadata
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool>;

    /// Force buffered writes to stable storage
    fn flush(&self) -> Result<()>;

    fn location(&self) -> &Path;
}
