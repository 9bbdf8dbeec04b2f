//! Ordered slot store backed by a Fjall partition
//!
//! Fjall keeps keys sorted, so the head is always the smallest slot key and
//! the tail is one past the largest. Nothing but payload entries lives in
//! the partition.

use crate::config::{OrderedConfig, WriteMode};
use crate::error::{Error, Result};
use crate::keys::{decode_slot, encode_slot};
use crate::store::{Capability, SlotBounds, SlotStore};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Data directories currently held by an `OrderedStore` in this process
static OPEN_DIRS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(Default::default);

/// Exclusive hold on a data directory, released on drop
struct DirClaim(PathBuf);

impl DirClaim {
    fn acquire(data_dir: &Path) -> Result<Self> {
        let canonical = std::fs::canonicalize(data_dir)?;
        if !OPEN_DIRS.lock().insert(canonical.clone()) {
            return Err(Error::AlreadyOpen(data_dir.to_path_buf()));
        }
        Ok(Self(canonical))
    }
}

impl Drop for DirClaim {
    fn drop(&mut self) {
        OPEN_DIRS.lock().remove(&self.0);
    }
}

pub struct OrderedStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
    config: OrderedConfig,
    // Dropped after the keyspace
    _claim: DirClaim,
}

impl OrderedStore {
    /// Open (or create) the keyspace and partition described by `config`
    pub fn open(config: OrderedConfig) -> Result<Self> {
        if !config.data_dir.exists() {
            if !config.create_if_missing {
                return Err(Error::NotFound(config.data_dir.clone()));
            }
            std::fs::create_dir_all(&config.data_dir)?;
        }

        // Fjall does not lock its directory, so two handles would hand out
        // the same slots
        let claim = DirClaim::acquire(&config.data_dir)?;

        // In deferred mode the journal is only fsynced on flush
        let keyspace = fjall::Config::new(&config.data_dir)
            .cache_size(config.block_cache_size)
            .manual_journal_persist(config.write_mode == WriteMode::Deferred)
            .open()?;

        if !config.create_if_missing && !keyspace.partition_exists(&config.partition) {
            return Err(Error::NotFound(config.data_dir.join(&config.partition)));
        }

        let partition = keyspace.open_partition(
            &config.partition,
            PartitionCreateOptions::default()
                .block_size(16 * 1024)
                .compression(fjall::CompressionType::Lz4),
        )?;

        tracing::debug!(
            "Opened ordered store at {} (partition {})",
            config.data_dir.display(),
            config.partition
        );

        Ok(Self {
            keyspace,
            partition,
            config,
            _claim: claim,
        })
    }

    pub fn config(&self) -> &OrderedConfig {
        &self.config
    }

    /// Smallest slot currently stored
    pub fn min_slot(&self) -> Result<Option<u64>> {
        match self.partition.first_key_value()? {
            Some((key, _)) => Ok(Some(decode_slot(&key)?)),
            None => Ok(None),
        }
    }

    /// Largest slot currently stored
    pub fn max_slot(&self) -> Result<Option<u64>> {
        match self.partition.last_key_value()? {
            Some((key, _)) => Ok(Some(decode_slot(&key)?)),
            None => Ok(None),
        }
    }

    /// Remove and return the entry with the smallest slot
    pub fn remove_min(&self) -> Result<Option<(u64, Vec<u8>)>> {
        let Some((key, value)) = self.partition.first_key_value()? else {
            return Ok(None);
        };
        let slot = decode_slot(&key)?;

        self.partition.remove(key)?;
        self.after_write()?;

        Ok(Some((slot, value.to_vec())))
    }

    /// Flush and release the keyspace
    pub fn close(self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        tracing::debug!("Closed ordered store at {}", self.config.data_dir.display());
        Ok(())
    }

    /// Delete the partition and remove the data directory
    ///
    /// Every step is attempted; failures are collected rather than stopping
    /// at the first one.
    pub fn destroy(self) -> Result<()> {
        let data_dir = self.config.data_dir.clone();
        let mut failures = Vec::new();

        if let Err(e) = self.keyspace.delete_partition(self.partition.clone()) {
            tracing::warn!("Failed to delete partition {}: {}", self.config.partition, e);
            failures.push(format!("delete partition: {}", e));
        }

        // Background workers must be gone before the files are removed
        drop(self);

        if data_dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&data_dir)
        {
            tracing::warn!("Failed to remove {}: {}", data_dir.display(), e);
            failures.push(format!("remove {}: {}", data_dir.display(), e));
        }

        if failures.is_empty() {
            tracing::info!("Destroyed ordered store at {}", data_dir.display());
            Ok(())
        } else {
            Err(Error::DestroyIncomplete { failures })
        }
    }

    fn after_write(&self) -> Result<()> {
        if self.config.write_mode == WriteMode::Synchronous {
            self.keyspace.persist(PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

impl SlotStore for OrderedStore {
    fn capability(&self) -> Capability {
        Capability::Ordered
    }

    fn recover(&self) -> Result<SlotBounds> {
        let head = self.min_slot()?.unwrap_or(0);
        let tail = match self.max_slot()? {
            Some(max) => max + 1,
            None => 0,
        };
        Ok(SlotBounds::new(head, tail.max(head)))
    }

    fn put(&self, slot: u64, payload: &[u8]) -> Result<()> {
        self.partition.insert(encode_slot(slot), payload)?;
        self.after_write()
    }

    fn first(&self, _from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        match self.partition.first_key_value()? {
            Some((key, value)) => Ok(Some((decode_slot(&key)?, value.to_vec()))),
            None => Ok(None),
        }
    }

    fn take_first(&self, _from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        self.remove_min()
    }

    fn remove(&self, slot: u64) -> Result<bool> {
        let key = encode_slot(slot);
        if !self.partition.contains_key(key)? {
            return Ok(false);
        }
        self.partition.remove(key)?;
        self.after_write()?;
        Ok(true)
    }

    fn entries(&self) -> Result<Vec<(u64, Vec<u8>)>> {
        self.partition
            .iter()
            .map(|entry| -> Result<(u64, Vec<u8>)> {
                let (key, value) = entry?;
                Ok((decode_slot(&key)?, value.to_vec()))
            })
            .collect()
    }

    fn restore(&self, slot: u64, payload: &[u8]) -> Result<()> {
        self.put(slot, payload)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.partition.len()? as u64)
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.partition.is_empty()?)
    }

    fn flush(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.config.data_dir
    }
}

impl Drop for OrderedStore {
    fn drop(&mut self) {
        if let Err(e) = self.keyspace.persist(PersistMode::SyncAll) {
            tracing::warn!(
                "Failed to persist ordered store at {} on drop: {}",
                self.config.data_dir.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> OrderedStore {
        OrderedStore::open(OrderedConfig::new(dir.path().join("queue"))).unwrap()
    }

    #[test]
    fn test_min_max_and_remove_min() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert_eq!(store.min_slot().unwrap(), None);
        assert_eq!(store.remove_min().unwrap(), None);

        for slot in [3u64, 1, 2] {
            store.put(slot, format!("v{}", slot).as_bytes()).unwrap();
        }

        assert_eq!(store.min_slot().unwrap(), Some(1));
        assert_eq!(store.max_slot().unwrap(), Some(3));
        assert_eq!(store.remove_min().unwrap(), Some((1, b"v1".to_vec())));
        assert_eq!(store.min_slot().unwrap(), Some(2));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_slots_sort_past_byte_boundary() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put(256, b"later").unwrap();
        store.put(255, b"earlier").unwrap();

        assert_eq!(store.first(0).unwrap(), Some((255, b"earlier".to_vec())));
        assert_eq!(
            store.entries().unwrap(),
            vec![(255, b"earlier".to_vec()), (256, b"later".to_vec())]
        );
    }

    #[test]
    fn test_recover_bounds() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert_eq!(store.recover().unwrap(), SlotBounds::new(0, 0));

        for slot in 0..5 {
            store.put(slot, b"x").unwrap();
        }
        store.remove_min().unwrap();
        store.remove_min().unwrap();

        assert_eq!(store.recover().unwrap(), SlotBounds::new(2, 5));
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = TempDir::new().unwrap();

        let store = open(&dir);
        store.put(7, b"seven").unwrap();
        store.put(8, b"eight").unwrap();
        store.close().unwrap();

        let store = open(&dir);
        assert_eq!(store.recover().unwrap(), SlotBounds::new(7, 9));
        assert_eq!(store.first(0).unwrap(), Some((7, b"seven".to_vec())));
    }

    #[test]
    fn test_missing_location_is_not_found() {
        let dir = TempDir::new().unwrap();
        let config = OrderedConfig::new(dir.path().join("absent")).with_create_if_missing(false);

        assert!(matches!(
            OrderedStore::open(config),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_and_restore() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put(0, b"a").unwrap();
        let taken = store.take_first(0).unwrap().unwrap();
        assert!(store.is_empty().unwrap());

        store.restore(taken.0, &taken.1).unwrap();
        assert_eq!(store.first(0).unwrap(), Some((0, b"a".to_vec())));

        assert!(store.remove(0).unwrap());
        assert!(!store.remove(0).unwrap());
    }

    #[test]
    fn test_destroy_removes_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");

        let store = open(&dir);
        store.put(0, b"a").unwrap();
        store.destroy().unwrap();

        assert!(!path.exists());

        let store = open(&dir);
        assert!(store.is_empty().unwrap());
        assert_eq!(store.recover().unwrap(), SlotBounds::new(0, 0));
    }

    #[test]
    fn test_second_open_is_rejected_until_released() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.put(0, b"a").unwrap();

        let config = OrderedConfig::new(dir.path().join("queue"));
        assert!(matches!(
            OrderedStore::open(config.clone()),
            Err(Error::AlreadyOpen(_))
        ));

        // Same directory reached through a different path
        let indirect = OrderedConfig::new(dir.path().join(".").join("queue"));
        assert!(matches!(
            OrderedStore::open(indirect),
            Err(Error::AlreadyOpen(_))
        ));

        drop(store);
        let store = OrderedStore::open(config).unwrap();
        assert_eq!(store.first(0).unwrap(), Some((0, b"a".to_vec())));
    }
}
