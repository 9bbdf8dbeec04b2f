//! Concurrent producers and a concurrent consumer

mod common;

use common::{all_backends, all_variants};
use proven_durable_queue::DurableQueue;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const PRODUCERS: u64 = 8;
const PER_PRODUCER: u64 = 50;

#[test]
fn test_concurrent_offers_get_distinct_slots() {
    let dir = TempDir::new().unwrap();

    for config in all_backends(&dir) {
        let queue = Arc::new(DurableQueue::<u64>::open(config).unwrap());

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    (0..PER_PRODUCER)
                        .map(|i| queue.offer(&(producer * PER_PRODUCER + i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut slots = HashSet::new();
        for handle in handles {
            for slot in handle.join().unwrap() {
                assert!(slots.insert(slot), "slot {} used twice", slot);
            }
        }

        let total = PRODUCERS * PER_PRODUCER;
        assert_eq!(slots, (0..total).collect::<HashSet<_>>());
        assert_eq!(queue.size(), total);

        let mut values = HashSet::new();
        while let Some(value) = queue.poll().unwrap() {
            assert!(values.insert(value), "value {} delivered twice", value);
        }
        assert_eq!(values, (0..total).collect::<HashSet<_>>());
    }
}

#[test]
fn test_consumer_runs_alongside_producers() {
    let dir = TempDir::new().unwrap();

    for config in all_variants(&dir) {
        let queue = Arc::new(DurableQueue::<u64>::open(config).unwrap());
        let total = PRODUCERS * PER_PRODUCER;

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut received = HashSet::new();
                while (received.len() as u64) < total {
                    match queue.poll().unwrap() {
                        Some(value) => assert!(received.insert(value)),
                        None => thread::yield_now(),
                    }
                }
                received
            })
        };

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.offer(&(producer * PER_PRODUCER + i)).unwrap();
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        let received = consumer.join().unwrap();
        assert_eq!(received, (0..total).collect::<HashSet<_>>());
        assert!(queue.is_empty().unwrap());
    }
}
