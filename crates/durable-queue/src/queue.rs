//! The durable FIFO queue
//!
//! Producers call [`DurableQueue::offer`] concurrently: each offer encodes
//! its value, claims a slot with one atomic increment and writes the entry.
//! Consumption is two-phase and serialized by a single consumer lock:
//! [`peek`](DurableQueue::peek) reserves the head entry, and the reservation
//! is then confirmed ([`poll`](DurableQueue::poll),
//! [`confirm`](DurableQueue::confirm)) or handed back
//! ([`abandon`](DurableQueue::abandon)). What reserving does to the stored
//! entry depends on the configured [`Delivery`].
//!
//! Lock order is consumer, then lifecycle. Offers only take the lifecycle
//! lock for reading.

use crate::allocator::IndexAllocator;
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::reservation::{ConsumeState, ConsumerState, Delivery, Reservation};
use parking_lot::{Mutex, RwLock};
use proven_codec::{BincodeCodec, Codec, SerializerPool};
use proven_store::{Backend, Capability, SlotBounds, SlotStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

enum Lifecycle {
    Open(Backend),
    Closed,
    Cleared,
}

impl Lifecycle {
    fn store(&self) -> Result<&Backend> {
        match self {
            Lifecycle::Open(store) => Ok(store),
            Lifecycle::Closed | Lifecycle::Cleared => Err(Error::AlreadyClosed),
        }
    }
}

/// A persistent FIFO queue of `T` values
///
/// Slot numbers returned by `offer` increase monotonically but are not
/// contiguous: an offer that fails after claiming its slot leaves a
/// permanent gap.
pub struct DurableQueue<T, C = BincodeCodec<T>> {
    lifecycle: RwLock<Lifecycle>,
    consumer: Mutex<ConsumerState<T>>,
    allocator: IndexAllocator,
    codec: C,
    delivery: Delivery,
    capability: Capability,
    location: PathBuf,
}

impl<T> DurableQueue<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    /// Open a queue using the bincode codec
    pub fn open(config: QueueConfig) -> Result<Self> {
        let codec = BincodeCodec::with_pool(SerializerPool::new(config.pool))
            .with_max_payload_size(config.max_payload_size);
        Self::open_with_codec(config, codec)
    }
}

impl<T, C> DurableQueue<T, C>
where
    T: Send,
    C: Codec<T>,
{
    /// Open a queue with a caller-supplied codec
    ///
    /// Head and tail are recovered from the store before this returns.
    pub fn open_with_codec(config: QueueConfig, codec: C) -> Result<Self> {
        let store = Backend::open(&config.backend)?;
        let allocator = IndexAllocator::recover(&store)?;
        let bounds = allocator.bounds();

        tracing::info!(
            "Opened {:?} queue at {} (head {}, tail {})",
            store.capability(),
            config.location().display(),
            bounds.head,
            bounds.tail
        );

        Ok(Self {
            capability: store.capability(),
            location: config.location().to_path_buf(),
            lifecycle: RwLock::new(Lifecycle::Open(store)),
            consumer: Mutex::new(ConsumerState::Idle),
            allocator,
            codec,
            delivery: config.delivery,
        })
    }

    /// Append a value, returning the slot it was stored under
    pub fn offer(&self, value: &T) -> Result<u64> {
        let payload = self.codec.encode(value).map_err(Error::from_encode)?;

        let lifecycle = self.lifecycle.read();
        let store = lifecycle.store()?;

        let slot = self.allocator.allocate_tail();
        if let Err(e) = store.put(slot, &payload) {
            tracing::warn!(
                "Failed to store slot {} in {}: {} (slot left as a gap)",
                slot,
                self.location.display(),
                e
            );
            return Err(e.into());
        }

        Ok(slot)
    }

    /// Reserve the head item and return a copy of it
    ///
    /// Repeated calls return the same item until it is confirmed or
    /// abandoned. Returns `None` when the queue is empty.
    pub fn peek(&self) -> Result<Option<T>>
    where
        T: Clone,
    {
        let mut consumer = self.consumer.lock();
        Ok(self
            .reserve(&mut consumer)?
            .map(|reservation| reservation.value.clone()))
    }

    /// Take the head item, reserving it first if needed
    pub fn poll(&self) -> Result<Option<T>> {
        let mut consumer = self.consumer.lock();
        if self.reserve(&mut consumer)?.is_none() {
            return Ok(None);
        }
        Ok(self
            .finish(&mut consumer)?
            .map(|reservation| reservation.value))
    }

    /// Finish the current reservation without reserving the next item
    pub fn confirm(&self) -> Result<Option<T>> {
        let mut consumer = self.consumer.lock();
        Ok(self
            .finish(&mut consumer)?
            .map(|reservation| reservation.value))
    }

    /// Hand the reserved item back so the next `peek` returns it again
    ///
    /// Returns false if nothing was reserved.
    pub fn abandon(&self) -> Result<bool> {
        let mut consumer = self.consumer.lock();
        let Some(reservation) = consumer.take() else {
            return Ok(false);
        };

        if self.delivery == Delivery::AtMostOnce {
            let lifecycle = self.lifecycle.read();
            let restored = lifecycle
                .store()
                .and_then(|store| Ok(store.restore(reservation.slot, &reservation.payload)?));
            if let Err(e) = restored {
                *consumer = ConsumerState::Reserved(reservation);
                return Err(e);
            }
            self.allocator.rewind_to(reservation.slot);
        }

        tracing::debug!("Abandoned reservation of slot {}", reservation.slot);
        Ok(true)
    }

    /// Remove the head entry without decoding it
    ///
    /// This is the way past an entry that no longer decodes: `peek` and
    /// `poll` keep reporting the failure until it is discarded. Returns the
    /// slot and raw bytes of the removed entry.
    pub fn discard_head(&self) -> Result<Option<(u64, Vec<u8>)>> {
        let mut consumer = self.consumer.lock();
        if let Some(reservation) = self.finish(&mut consumer)? {
            return Ok(Some((reservation.slot, reservation.payload)));
        }

        let lifecycle = self.lifecycle.read();
        let store = lifecycle.store()?;

        let Some((slot, payload)) = store.take_first(self.allocator.current_head())? else {
            return Ok(None);
        };
        self.allocator.advance_past(slot);

        tracing::warn!(
            "Discarded slot {} ({} bytes) from {}",
            slot,
            payload.len(),
            self.location.display()
        );
        Ok(Some((slot, payload)))
    }

    /// Pending values in delivery order, without consuming anything
    ///
    /// A reserved item is still pending and comes first.
    pub fn values(&self) -> Result<Vec<T>>
    where
        T: Clone,
    {
        let consumer = self.consumer.lock();
        let lifecycle = self.lifecycle.read();
        let store = lifecycle.store()?;

        let mut values = Vec::new();
        if self.delivery == Delivery::AtMostOnce
            && let Some(reservation) = consumer.reservation()
        {
            values.push(reservation.value.clone());
        }

        for (slot, payload) in store.entries()? {
            let value = self
                .codec
                .decode(&payload)
                .map_err(|e| Error::from_decode(slot, e))?;
            values.push(value);
        }

        Ok(values)
    }

    /// Current consumer state
    pub fn state(&self) -> ConsumeState {
        self.consumer.lock().observe()
    }

    /// Approximate number of items, `tail - head`
    ///
    /// Under [`Delivery::AtMostOnce`] a reserved item is not counted; under
    /// [`Delivery::AtLeastOnce`] it is, since it is still stored. Gaps from
    /// failed offers are counted too.
    pub fn size(&self) -> u64 {
        self.allocator.size()
    }

    /// True when nothing is reserved and the store holds no entries
    ///
    /// A cleared queue is empty; a closed one returns [`Error::AlreadyClosed`].
    pub fn is_empty(&self) -> Result<bool> {
        let consumer = self.consumer.lock();
        if consumer.reservation().is_some() {
            return Ok(false);
        }

        let lifecycle = self.lifecycle.read();
        match &*lifecycle {
            Lifecycle::Open(store) => Ok(store.is_empty()?),
            Lifecycle::Cleared => Ok(true),
            Lifecycle::Closed => Err(Error::AlreadyClosed),
        }
    }

    /// Force deferred writes to stable storage
    pub fn flush(&self) -> Result<()> {
        let lifecycle = self.lifecycle.read();
        lifecycle.store()?.flush()?;
        Ok(())
    }

    /// Forget in-memory state and re-derive head and tail from the store
    ///
    /// This is what a restart does. A reservation is dropped without being
    /// handed back, exactly as if the process had crashed while holding it.
    pub fn recover(&self) -> Result<SlotBounds> {
        let mut consumer = self.consumer.lock();
        // Exclusive so no offer is between allocating and writing its slot
        let lifecycle = self.lifecycle.write();
        let store = lifecycle.store()?;

        if let Some(reservation) = consumer.take() {
            tracing::debug!(
                "Dropping reservation of slot {} on recovery",
                reservation.slot
            );
        }

        let bounds = store.recover()?;
        self.allocator.reset_to(bounds);

        tracing::info!(
            "Recovered queue at {} (head {}, tail {})",
            self.location.display(),
            bounds.head,
            bounds.tail
        );
        Ok(bounds)
    }

    /// Hand back any reservation, flush and release the store
    ///
    /// Data is kept; reopening the location resumes where this left off.
    pub fn close(&self) -> Result<()> {
        let mut consumer = self.consumer.lock();
        let mut lifecycle = self.lifecycle.write();
        self.close_locked(&mut consumer, &mut lifecycle)
    }

    /// Delete every entry and the backing directory
    ///
    /// Each teardown step is attempted even if an earlier one fails; the
    /// failures are returned together. The queue cannot be used afterwards.
    pub fn clear(&self) -> Result<()> {
        let mut consumer = self.consumer.lock();
        let mut lifecycle = self.lifecycle.write();

        let store = match std::mem::replace(&mut *lifecycle, Lifecycle::Cleared) {
            Lifecycle::Open(store) => store,
            other => {
                *lifecycle = other;
                return Err(Error::AlreadyClosed);
            }
        };

        if let Some(reservation) = consumer.take() {
            tracing::debug!("Dropping reservation of slot {} on clear", reservation.slot);
        }

        let mut failures = Vec::new();

        if let Err(e) = store.flush() {
            tracing::warn!(
                "Failed to flush {} before clear: {}",
                self.location.display(),
                e
            );
            failures.push(format!("flush: {}", e));
        }

        match store.destroy() {
            Ok(()) => {}
            Err(proven_store::Error::DestroyIncomplete { failures: steps }) => {
                failures.extend(steps)
            }
            Err(e) => {
                tracing::warn!("Failed to destroy {}: {}", self.location.display(), e);
                failures.push(format!("destroy: {}", e));
            }
        }

        if self.location.exists()
            && let Err(e) = std::fs::remove_dir_all(&self.location)
        {
            tracing::error!("Failed to remove {}: {}", self.location.display(), e);
            failures.push(format!("remove {}: {}", self.location.display(), e));
        }

        self.allocator.reset();

        if failures.is_empty() {
            tracing::info!("Cleared queue at {}", self.location.display());
            Ok(())
        } else {
            Err(Error::ClearIncomplete { failures })
        }
    }

    /// Reserve the head entry if nothing is reserved yet
    fn reserve<'a>(
        &self,
        consumer: &'a mut ConsumerState<T>,
    ) -> Result<Option<&'a Reservation<T>>> {
        if consumer.reservation().is_none() {
            let lifecycle = self.lifecycle.read();
            let store = lifecycle.store()?;
            let head = self.allocator.current_head();

            let entry = match self.delivery {
                Delivery::AtMostOnce => store.take_first(head)?,
                Delivery::AtLeastOnce => store.first(head)?,
            };
            let Some((slot, payload)) = entry else {
                return Ok(None);
            };

            let value = match self.codec.decode(&payload) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        "Failed to decode slot {} in {}: {}",
                        slot,
                        self.location.display(),
                        e
                    );
                    if self.delivery == Delivery::AtMostOnce {
                        store.restore(slot, &payload)?;
                    }
                    return Err(Error::from_decode(slot, e));
                }
            };

            if self.delivery == Delivery::AtMostOnce {
                self.allocator.advance_past(slot);
            }
            *consumer = ConsumerState::Reserved(Reservation {
                slot,
                value,
                payload,
            });
        }

        Ok(consumer.reservation())
    }

    /// Complete the current reservation, returning it
    fn finish(&self, consumer: &mut ConsumerState<T>) -> Result<Option<Reservation<T>>> {
        let Some(reservation) = consumer.take() else {
            return Ok(None);
        };

        if self.delivery == Delivery::AtLeastOnce {
            let lifecycle = self.lifecycle.read();
            let removed = lifecycle
                .store()
                .and_then(|store| Ok(store.remove(reservation.slot)?));
            if let Err(e) = removed {
                *consumer = ConsumerState::Reserved(reservation);
                return Err(e);
            }
            self.allocator.advance_past(reservation.slot);
        }

        Ok(Some(reservation))
    }
}

impl<T, C> DurableQueue<T, C> {
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Current head and tail
    pub fn bounds(&self) -> SlotBounds {
        self.allocator.bounds()
    }

    fn close_locked(
        &self,
        consumer: &mut ConsumerState<T>,
        lifecycle: &mut Lifecycle,
    ) -> Result<()> {
        let store = match std::mem::replace(lifecycle, Lifecycle::Closed) {
            Lifecycle::Open(store) => store,
            other => {
                *lifecycle = other;
                return Err(Error::AlreadyClosed);
            }
        };

        let mut first_error = None;

        if let Some(reservation) = consumer.take()
            && self.delivery == Delivery::AtMostOnce
            && let Err(e) = store.restore(reservation.slot, &reservation.payload)
        {
            tracing::error!(
                "Failed to return reserved slot {} to {} on close: {}",
                reservation.slot,
                self.location.display(),
                e
            );
            first_error = Some(Error::from(e));
        }

        if let Err(e) = store.close() {
            tracing::warn!("Failed to close {}: {}", self.location.display(), e);
            first_error.get_or_insert(Error::from(e));
        }

        tracing::info!("Closed queue at {}", self.location.display());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<T, C> Drop for DurableQueue<T, C> {
    fn drop(&mut self) {
        let consumer = self.consumer.get_mut();
        let lifecycle = self.lifecycle.get_mut();
        if matches!(lifecycle, Lifecycle::Open(_)) {
            // Move the state out so close_locked can borrow self
            let mut consumer = std::mem::take(consumer);
            let mut lifecycle = std::mem::replace(lifecycle, Lifecycle::Closed);
            if let Err(e) = self.close_locked(&mut consumer, &mut lifecycle) {
                tracing::warn!(
                    "Failed to close queue at {} on drop: {}",
                    self.location.display(),
                    e
                );
            }
        }
    }
}

impl<T, C> std::fmt::Debug for DurableQueue<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("location", &self.location)
            .field("capability", &self.capability)
            .field("delivery", &self.delivery)
            .field("bounds", &self.allocator.bounds())
            .finish()
    }
}
