//! Head and tail slot counters

use proven_store::{SlotBounds, SlotStore};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out tail slots to producers and tracks the consumer's head
///
/// `allocate_tail` is a single fetch-and-add, so producers never contend on a
/// lock and never share a slot. The head is only moved by the queue while it
/// holds its consumer lock.
#[derive(Debug, Default)]
pub struct IndexAllocator {
    head: AtomicU64,
    tail: AtomicU64,
}

impl IndexAllocator {
    pub fn from_bounds(bounds: SlotBounds) -> Self {
        Self {
            head: AtomicU64::new(bounds.head),
            tail: AtomicU64::new(bounds.tail.max(bounds.head)),
        }
    }

    /// Rebuild both counters from what the store has persisted
    pub fn recover(store: &impl SlotStore) -> proven_store::Result<Self> {
        Ok(Self::from_bounds(store.recover()?))
    }

    /// Claim the next free slot
    pub fn allocate_tail(&self) -> u64 {
        self.tail.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    pub fn current_tail(&self) -> u64 {
        self.tail.load(Ordering::SeqCst)
    }

    /// Move the head past a consumed slot. Slots may have gaps, so this jumps
    /// to `slot + 1` rather than incrementing.
    pub fn advance_past(&self, slot: u64) -> u64 {
        let next = slot.saturating_add(1);
        self.head.fetch_max(next, Ordering::SeqCst).max(next)
    }

    /// Move the head back to a slot that was given back to the store
    pub fn rewind_to(&self, slot: u64) -> u64 {
        self.head.fetch_min(slot, Ordering::SeqCst).min(slot)
    }

    /// Approximate number of entries between head and tail
    pub fn size(&self) -> u64 {
        let head = self.current_head();
        self.current_tail().saturating_sub(head)
    }

    pub fn bounds(&self) -> SlotBounds {
        SlotBounds::new(self.current_head(), self.current_tail())
    }

    pub fn reset_to(&self, bounds: SlotBounds) {
        self.head.store(bounds.head, Ordering::SeqCst);
        self.tail.store(bounds.tail.max(bounds.head), Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.reset_to(SlotBounds::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocate_is_sequential() {
        let allocator = IndexAllocator::from_bounds(SlotBounds::new(3, 5));

        assert_eq!(allocator.allocate_tail(), 5);
        assert_eq!(allocator.allocate_tail(), 6);
        assert_eq!(allocator.current_tail(), 7);
        assert_eq!(allocator.size(), 4);
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let allocator = Arc::new(IndexAllocator::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| allocator.allocate_tail())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for slot in handle.join().unwrap() {
                assert!(seen.insert(slot), "slot {} handed out twice", slot);
            }
        }

        assert_eq!(seen.len(), 8000);
        assert_eq!(allocator.current_tail(), 8000);
    }

    #[test]
    fn test_head_moves_past_gaps_and_never_backwards() {
        let allocator = IndexAllocator::from_bounds(SlotBounds::new(0, 10));

        assert_eq!(allocator.advance_past(4), 5);
        assert_eq!(allocator.advance_past(2), 5);
        assert_eq!(allocator.current_head(), 5);

        assert_eq!(allocator.rewind_to(4), 4);
        assert_eq!(allocator.rewind_to(7), 4);
    }

    #[test]
    fn test_size_saturates() {
        let allocator = IndexAllocator::from_bounds(SlotBounds::new(2, 2));
        allocator.advance_past(5);
        assert_eq!(allocator.size(), 0);
    }

    #[test]
    fn test_reset() {
        let allocator = IndexAllocator::from_bounds(SlotBounds::new(4, 9));
        allocator.reset();
        assert_eq!(allocator.bounds(), SlotBounds::new(0, 0));
    }
}
