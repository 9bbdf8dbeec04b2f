//! Queue configuration

use crate::reservation::Delivery;
use proven_codec::{DEFAULT_MAX_PAYLOAD_SIZE, PoolConfig};
use proven_store::{BackendConfig, OrderedConfig, TransactionalConfig, WriteMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to open a [`DurableQueue`](crate::DurableQueue)
///
/// Deserializes from the form applications keep in their config files:
///
/// ```json
/// { "backend": { "engine": "transactional", "data_dir": "/var/lib/images" },
///   "delivery": "at_least_once" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub backend: BackendConfig,

    #[serde(default)]
    pub delivery: Delivery,

    /// Largest serialized value accepted by `offer` (in bytes)
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Buffer pool used by the default codec
    #[serde(default)]
    pub pool: PoolConfig,
}

impl QueueConfig {
    pub fn new(backend: impl Into<BackendConfig>) -> Self {
        Self {
            backend: backend.into(),
            delivery: Delivery::default(),
            max_payload_size: default_max_payload_size(),
            pool: PoolConfig::default(),
        }
    }

    /// Queue on a Fjall keyspace at `data_dir`
    pub fn ordered(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(OrderedConfig::new(data_dir))
    }

    /// Queue on an LMDB environment at `data_dir`
    pub fn transactional(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(TransactionalConfig::new(data_dir))
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        match &mut self.backend {
            BackendConfig::Ordered(config) => config.write_mode = mode,
            BackendConfig::Transactional(config) => config.write_mode = mode,
        }
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        match &mut self.backend {
            BackendConfig::Ordered(config) => config.create_if_missing = create,
            BackendConfig::Transactional(config) => config.create_if_missing = create,
        }
        self
    }

    pub fn location(&self) -> &Path {
        self.backend.location()
    }
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let config: QueueConfig = serde_json::from_str(
            r#"{ "backend": { "engine": "ordered", "data_dir": "/var/lib/queue" } }"#,
        )
        .unwrap();

        assert_eq!(config, QueueConfig::ordered("/var/lib/queue"));
        assert_eq!(config.delivery, Delivery::AtMostOnce);
        assert_eq!(config.max_payload_size, 20 * 1024 * 1024);
    }

    #[test]
    fn test_deserialize_full() {
        let config: QueueConfig = serde_json::from_str(
            r#"{
                "backend": {
                    "engine": "transactional",
                    "data_dir": "/var/lib/images",
                    "database": "image",
                    "map_size": 1048576,
                    "write_mode": "synchronous"
                },
                "delivery": "at_least_once",
                "max_payload_size": 4096
            }"#,
        )
        .unwrap();

        let BackendConfig::Transactional(backend) = &config.backend else {
            panic!("expected transactional backend");
        };
        assert_eq!(backend.database, "image");
        assert_eq!(backend.map_size, 1048576);
        assert_eq!(backend.write_mode, WriteMode::Synchronous);
        assert_eq!(backend.max_dbs, 4);
        assert_eq!(config.delivery, Delivery::AtLeastOnce);
        assert_eq!(config.max_payload_size, 4096);
    }

    #[test]
    fn test_builders_reach_backend() {
        let config = QueueConfig::transactional("/tmp/q")
            .with_write_mode(WriteMode::Synchronous)
            .with_create_if_missing(false);

        let BackendConfig::Transactional(backend) = config.backend else {
            panic!("expected transactional backend");
        };
        assert_eq!(backend.write_mode, WriteMode::Synchronous);
        assert!(!backend.create_if_missing);
    }
}
