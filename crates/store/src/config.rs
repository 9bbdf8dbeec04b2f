//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// When writes reach stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Sync to disk after every mutation
    Synchronous,

    /// Leave syncing to the engine until `flush()` is called
    #[default]
    Deferred,
}

/// Configuration for the fjall-backed ordered store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedConfig {
    /// Directory for the keyspace
    pub data_dir: PathBuf,

    /// Partition holding the queue's slots
    #[serde(default = "default_name")]
    pub partition: String,

    /// Create the keyspace and partition when they do not exist
    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    #[serde(default)]
    pub write_mode: WriteMode,

    /// Block cache size for Fjall (in bytes)
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: u64,
}

impl OrderedConfig {
    /// Create a new config with the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            partition: default_name(),
            create_if_missing: true,
            write_mode: WriteMode::default(),
            block_cache_size: default_block_cache_size(),
        }
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn with_block_cache_size(mut self, size: u64) -> Self {
        self.block_cache_size = size;
        self
    }
}

/// Configuration for the LMDB-backed transactional store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionalConfig {
    /// Directory for the environment
    pub data_dir: PathBuf,

    /// Named database holding the queue's slots
    ///
    /// The store owns its environment outright, so a second store over the
    /// same `data_dir` is rejected whatever database it names.
    #[serde(default = "default_name")]
    pub database: String,

    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    #[serde(default)]
    pub write_mode: WriteMode,

    /// Maximum size of the memory map (in bytes)
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Named databases the environment may hold
    ///
    /// The store opens exactly one. Raise this only when other tooling opens
    /// the same environment files with databases of its own.
    #[serde(default = "default_max_dbs")]
    pub max_dbs: u32,

    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
}

impl TransactionalConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            database: default_name(),
            create_if_missing: true,
            write_mode: WriteMode::default(),
            map_size: default_map_size(),
            max_dbs: default_max_dbs(),
            max_readers: default_max_readers(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn with_map_size(mut self, size: usize) -> Self {
        self.map_size = size;
        self
    }

    pub fn with_max_dbs(mut self, max_dbs: u32) -> Self {
        self.max_dbs = max_dbs;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }
}

/// Which engine backs a queue, and how to open it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum BackendConfig {
    Ordered(OrderedConfig),
    Transactional(TransactionalConfig),
}

impl BackendConfig {
    pub fn location(&self) -> &Path {
        match self {
            BackendConfig::Ordered(config) => &config.data_dir,
            BackendConfig::Transactional(config) => &config.data_dir,
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        match self {
            BackendConfig::Ordered(config) => config.write_mode,
            BackendConfig::Transactional(config) => config.write_mode,
        }
    }
}

impl From<OrderedConfig> for BackendConfig {
    fn from(config: OrderedConfig) -> Self {
        BackendConfig::Ordered(config)
    }
}

impl From<TransactionalConfig> for BackendConfig {
    fn from(config: TransactionalConfig) -> Self {
        BackendConfig::Transactional(config)
    }
}

fn default_name() -> String {
    "queue".to_string()
}

fn default_true() -> bool {
    true
}

fn default_block_cache_size() -> u64 {
    16 * 1024 * 1024 // 16 MB
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024 // 1 GB
}

fn default_max_dbs() -> u32 {
    1
}

fn default_max_readers() -> u32 {
    126
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = OrderedConfig::new("/tmp/q").with_write_mode(WriteMode::Synchronous);
        assert_eq!(config.partition, "queue");
        assert!(config.create_if_missing);
        assert_eq!(config.write_mode, WriteMode::Synchronous);

        let config = TransactionalConfig::new("/tmp/q").with_map_size(1 << 20);
        assert_eq!(config.map_size, 1 << 20);
        assert_eq!(config.write_mode, WriteMode::Deferred);
        assert_eq!(config.max_dbs, 1);
    }

    #[test]
    fn test_backend_location() {
        let backend: BackendConfig = TransactionalConfig::new("/data/images").into();
        assert_eq!(backend.location(), Path::new("/data/images"));
    }
}
