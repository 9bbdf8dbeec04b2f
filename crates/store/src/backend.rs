//! Capability-tagged backend selection

use crate::config::BackendConfig;
use crate::error::Result;
use crate::ordered::OrderedStore;
use crate::store::{Capability, SlotBounds, SlotStore};
use crate::transactional::TransactionalStore;
use std::path::Path;

/// One of the two slot store engines
///
/// Callers hold a `Backend` and use it through [`SlotStore`]; only opening
/// and teardown look at which variant it is.
pub enum Backend {
    Ordered(OrderedStore),
    Transactional(TransactionalStore),
}

macro_rules! dispatch {
    ($self:expr, $store:ident => $body:expr) => {
        match $self {
            Backend::Ordered($store) => $body,
            Backend::Transactional($store) => $body,
        }
    };
}

impl Backend {
    pub fn open(config: &BackendConfig) -> Result<Self> {
        match config {
            BackendConfig::Ordered(config) => {
                Ok(Backend::Ordered(OrderedStore::open(config.clone())?))
            }
            BackendConfig::Transactional(config) => Ok(Backend::Transactional(
                TransactionalStore::open(config.clone())?,
            )),
        }
    }

    /// Flush and release the engine, keeping its data
    pub fn close(self) -> Result<()> {
        dispatch!(self, store => store.close())
    }

    /// Delete every entry and the backing directory
    pub fn destroy(self) -> Result<()> {
        dispatch!(self, store => store.destroy())
    }
}

impl SlotStore for Backend {
    fn capability(&self) -> Capability {
        dispatch!(self, store => store.capability())
    }

    fn recover(&self) -> Result<SlotBounds> {
        dispatch!(self, store => store.recover())
    }

    fn put(&self, slot: u64, payload: &[u8]) -> Result<()> {
        dispatch!(self, store => store.put(slot, payload))
    }

    fn first(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        dispatch!(self, store => store.first(from))
    }

    fn take_first(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        dispatch!(self, store => store.take_first(from))
    }

    fn remove(&self, slot: u64) -> Result<bool> {
        dispatch!(self, store => store.remove(slot))
    }

    fn entries(&self) -> Result<Vec<(u64, Vec<u8>)>> {
        dispatch!(self, store => store.entries())
    }

    fn restore(&self, slot: u64, payload: &[u8]) -> Result<()> {
        dispatch!(self, store => store.restore(slot, payload))
    }

    fn len(&self) -> Result<u64> {
        dispatch!(self, store => store.len())
    }

    fn is_empty(&self) -> Result<bool> {
        dispatch!(self, store => store.is_empty())
    }

    fn flush(&self) -> Result<()> {
        dispatch!(self, store => store.flush())
    }

    fn location(&self) -> &Path {
        dispatch!(self, store => store.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrderedConfig, TransactionalConfig};
    use tempfile::TempDir;

    fn backends(dir: &TempDir) -> Vec<BackendConfig> {
        vec![
            OrderedConfig::new(dir.path().join("ordered")).into(),
            TransactionalConfig::new(dir.path().join("transactional"))
                .with_map_size(16 * 1024 * 1024)
                .into(),
        ]
    }

    #[test]
    fn test_same_behavior_on_both_engines() {
        let dir = TempDir::new().unwrap();

        for config in backends(&dir) {
            let backend = Backend::open(&config).unwrap();
            assert_eq!(backend.location(), config.location());

            for slot in 0..3 {
                backend.put(slot, &[slot as u8]).unwrap();
            }

            assert_eq!(backend.len().unwrap(), 3);
            assert_eq!(
                backend.entries().unwrap(),
                vec![(0, vec![0]), (1, vec![1]), (2, vec![2])]
            );
            assert_eq!(backend.first(0).unwrap(), Some((0, vec![0])));
            assert_eq!(backend.take_first(0).unwrap(), Some((0, vec![0])));
            assert!(backend.remove(1).unwrap());
            assert_eq!(backend.recover().unwrap(), SlotBounds::new(2, 3));

            backend.close().unwrap();
        }
    }

    #[test]
    fn test_capability_tags() {
        let dir = TempDir::new().unwrap();
        let capabilities: Vec<_> = backends(&dir)
            .iter()
            .map(|config| Backend::open(config).unwrap().capability())
            .collect();

        assert_eq!(
            capabilities,
            vec![Capability::Ordered, Capability::Transactional]
        );
    }
}
