//! Shared helpers for the queue integration tests

#![allow(dead_code)]

use proven_durable_queue::{Delivery, QueueConfig, TransactionalConfig};
use std::path::Path;
use tempfile::TempDir;

/// Small map so many LMDB environments can be open at once
pub const TEST_MAP_SIZE: usize = 32 * 1024 * 1024;

pub fn ordered_config(dir: &Path) -> QueueConfig {
    QueueConfig::ordered(dir.join("ordered"))
}

pub fn transactional_config(dir: &Path) -> QueueConfig {
    QueueConfig::new(
        TransactionalConfig::new(dir.join("transactional")).with_map_size(TEST_MAP_SIZE),
    )
}

/// One config per engine, each in its own directory under `dir`
pub fn all_backends(dir: &TempDir) -> Vec<QueueConfig> {
    vec![ordered_config(dir.path()), transactional_config(dir.path())]
}

/// Every engine with every delivery mode
pub fn all_variants(dir: &TempDir) -> Vec<QueueConfig> {
    let mut configs = Vec::new();
    for delivery in [Delivery::AtMostOnce, Delivery::AtLeastOnce] {
        let base = dir.path().join(format!("{:?}", delivery));
        configs.push(ordered_config(&base).with_delivery(delivery));
        configs.push(transactional_config(&base).with_delivery(delivery));
    }
    configs
}
