//! Reusable scratch buffers for serialization
//!
//! Serializing into a fresh `Vec` for every value means one allocation per
//! offer. The pool hands out buffers that go back to it when dropped, so hot
//! producers reuse capacity instead. A pool is an ordinary value: clone the
//! handle to share it between codecs, or build one per queue.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Sizing for a [`SerializerPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of idle buffers kept for reuse
    pub max_idle: usize,

    /// Capacity given to newly created buffers
    pub initial_capacity: usize,

    /// Buffers grown beyond this are shrunk back before being pooled
    pub retain_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 16,
            initial_capacity: 4 * 1024,   // 4 KB
            retain_capacity: 1024 * 1024, // 1 MB
        }
    }
}

impl PoolConfig {
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_retain_capacity(mut self, capacity: usize) -> Self {
        self.retain_capacity = capacity;
        self
    }
}

struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    config: PoolConfig,
}

/// Thread-safe pool of serialization buffers
///
/// Buffers are created lazily on first checkout. Cloning the pool clones the
/// handle, not the buffers.
#[derive(Clone)]
pub struct SerializerPool {
    inner: Arc<PoolInner>,
}

impl Default for SerializerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl std::fmt::Debug for SerializerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerPool")
            .field("config", &self.inner.config)
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl SerializerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    /// Take an empty buffer from the pool, allocating one if none are idle
    pub fn checkout(&self) -> PooledBuffer {
        let buf = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.inner.config.initial_capacity));

        PooledBuffer {
            buf,
            pool: Some(self.inner.clone()),
        }
    }

    /// Number of buffers currently waiting for reuse
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }
}

impl PoolInner {
    fn checkin(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() > self.config.retain_capacity {
            buf.shrink_to(self.config.retain_capacity);
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push(buf);
        }
    }
}

/// A buffer on loan from a [`SerializerPool`]
///
/// Returned to the pool on drop unless detached with [`PooledBuffer::into_vec`].
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Option<Arc<PoolInner>>,
}

impl PooledBuffer {
    /// Detach the bytes from the pool
    pub fn into_vec(mut self) -> Vec<u8> {
        self.pool = None;
        std::mem::take(&mut self.buf)
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.checkin(std::mem::take(&mut self.buf));
        }
    }
}
