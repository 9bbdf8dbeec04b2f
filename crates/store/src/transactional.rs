//! Transactional slot store backed by an LMDB environment (via heed)
//!
//! The head pointer is persisted under [`HEAD_POINTER_KEY`] and moves in the
//! same write transaction that deletes the consumed slot, so after a crash
//! the pointer and the data always agree. Lookups go to the slot the head
//! points at first; only when that slot is missing (a gap left by a failed
//! offer, or a late write below the head) does the store search for the
//! lowest remaining slot key.

use crate::config::{TransactionalConfig, WriteMode};
use crate::error::{Error, Result};
use crate::keys::{
    HEAD_POINTER_KEY, decode_head_pointer, decode_slot, encode_head_pointer, encode_slot,
    is_slot_key,
};
use crate::store::{Capability, SlotBounds, SlotStore};
use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use std::path::Path;

type SlotDatabase = Database<Bytes, Bytes>;

/// Operations available inside [`TransactionalStore::with_read_txn`]
pub struct ReadScope<'t, 'e> {
    db: SlotDatabase,
    txn: &'t RoTxn<'e>,
}

/// Operations available inside [`TransactionalStore::with_write_txn`]
pub struct WriteScope<'t, 'e> {
    db: SlotDatabase,
    txn: &'t mut RwTxn<'e>,
}

impl ReadScope<'_, '_> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(self.txn, key)?.map(<[u8]>::to_vec))
    }

    pub fn head_pointer(&self) -> Result<Option<u64>> {
        read_head_pointer(self.db, self.txn)
    }

    pub fn lowest_slot(&self) -> Result<Option<(u64, Vec<u8>)>> {
        lowest_slot(self.db, self.txn)
    }

    pub fn highest_slot(&self) -> Result<Option<u64>> {
        highest_slot(self.db, self.txn)
    }

    /// All slot entries in order, skipping the head pointer
    pub fn slots(&self) -> Result<Vec<(u64, Vec<u8>)>> {
        let mut slots = Vec::new();
        for entry in self.db.iter(self.txn)? {
            let (key, value) = entry?;
            if is_slot_key(key) {
                slots.push((decode_slot(key)?, value.to_vec()));
            }
        }
        Ok(slots)
    }

    /// Live slot entries, not counting the head pointer
    pub fn slot_count(&self) -> Result<u64> {
        slot_count(self.db, self.txn)
    }
}

impl WriteScope<'_, '_> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(&*self.txn, key)?.map(<[u8]>::to_vec))
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(self.txn, key, value)?;
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.db.delete(self.txn, key)?)
    }

    /// Remove every entry, head pointer included
    pub fn clear(&mut self) -> Result<()> {
        self.db.clear(self.txn)?;
        Ok(())
    }

    pub fn head_pointer(&self) -> Result<Option<u64>> {
        read_head_pointer(self.db, &*self.txn)
    }

    pub fn set_head_pointer(&mut self, head: u64) -> Result<()> {
        self.put(HEAD_POINTER_KEY, &encode_head_pointer(head))
    }

    pub fn lowest_slot(&self) -> Result<Option<(u64, Vec<u8>)>> {
        lowest_slot(self.db, &*self.txn)
    }

    /// The entry at `from`, or the lowest slot if `from` is empty
    fn head_entry(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        if let Some(payload) = self.get(&encode_slot(from))? {
            return Ok(Some((from, payload)));
        }
        self.lowest_slot()
    }

    /// Move the persisted head past `slot`, never backwards
    fn advance_head_past(&mut self, slot: u64) -> Result<()> {
        let head = self.head_pointer()?.unwrap_or(0);
        self.set_head_pointer(head.max(slot + 1))
    }
}

fn read_head_pointer(db: SlotDatabase, txn: &RoTxn) -> Result<Option<u64>> {
    match db.get(txn, HEAD_POINTER_KEY)? {
        Some(bytes) => Ok(Some(decode_head_pointer(bytes)?)),
        None => Ok(None),
    }
}

fn lowest_slot(db: SlotDatabase, txn: &RoTxn) -> Result<Option<(u64, Vec<u8>)>> {
    for entry in db.iter(txn)? {
        let (key, value) = entry?;
        if is_slot_key(key) {
            return Ok(Some((decode_slot(key)?, value.to_vec())));
        }
    }
    Ok(None)
}

fn highest_slot(db: SlotDatabase, txn: &RoTxn) -> Result<Option<u64>> {
    for entry in db.rev_iter(txn)? {
        let (key, _) = entry?;
        if is_slot_key(key) {
            return Ok(Some(decode_slot(key)?));
        }
    }
    Ok(None)
}

fn slot_count(db: SlotDatabase, txn: &RoTxn) -> Result<u64> {
    let total = db.len(txn)?;
    let metadata = u64::from(db.get(txn, HEAD_POINTER_KEY)?.is_some());
    Ok(total.saturating_sub(metadata))
}

pub struct TransactionalStore {
    env: Env,
    db: SlotDatabase,
    config: TransactionalConfig,
}

impl TransactionalStore {
    /// Open (or create) the environment and named database described by `config`
    pub fn open(config: TransactionalConfig) -> Result<Self> {
        let data_dir = &config.data_dir;
        if !config.create_if_missing && !data_dir.join("data.mdb").exists() {
            return Err(Error::NotFound(data_dir.clone()));
        }
        std::fs::create_dir_all(data_dir)?;

        let mut options = EnvOpenOptions::new();
        options
            .map_size(config.map_size)
            .max_dbs(config.max_dbs.max(1))
            .max_readers(config.max_readers);

        // SAFETY: the environment is opened once per process for this path
        // (heed rejects a second open) and the files are not truncated while
        // mapped. NO_SYNC only weakens durability, not memory safety.
        let env = unsafe {
            if config.write_mode == WriteMode::Deferred {
                options.flags(EnvFlags::NO_SYNC);
            }
            options.open(data_dir)
        }
        .map_err(|e| match e {
            heed::Error::EnvAlreadyOpened => Error::AlreadyOpen(data_dir.clone()),
            other => Error::from(other),
        })?;

        let db = if config.create_if_missing {
            let mut wtxn = env.write_txn()?;
            let db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(&config.database))?;
            wtxn.commit()?;
            db
        } else {
            let rtxn = env.read_txn()?;
            let db = env.open_database::<Bytes, Bytes>(&rtxn, Some(&config.database))?;
            rtxn.commit()?;
            db.ok_or_else(|| Error::NotFound(data_dir.join(&config.database)))?
        };

        tracing::debug!(
            "Opened transactional store at {} (database {})",
            data_dir.display(),
            config.database
        );

        Ok(Self { env, db, config })
    }

    pub fn config(&self) -> &TransactionalConfig {
        &self.config
    }

    /// Run `f` inside a read transaction
    pub fn with_read_txn<R>(&self, f: impl FnOnce(&ReadScope<'_, '_>) -> Result<R>) -> Result<R> {
        let rtxn = self.env.read_txn()?;
        let scope = ReadScope {
            db: self.db,
            txn: &rtxn,
        };
        f(&scope)
    }

    /// Run `f` inside a write transaction, committing on `Ok` and aborting on `Err`
    pub fn with_write_txn<R>(
        &self,
        f: impl FnOnce(&mut WriteScope<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        let mut wtxn = self.env.write_txn()?;
        let result = {
            let mut scope = WriteScope {
                db: self.db,
                txn: &mut wtxn,
            };
            f(&mut scope)
        };

        match result {
            Ok(value) => {
                wtxn.commit()?;
                Ok(value)
            }
            Err(e) => {
                wtxn.abort();
                Err(e)
            }
        }
    }

    /// Sync and close the environment, waiting until it is released
    pub fn close(self) -> Result<()> {
        self.env.force_sync()?;
        self.env.prepare_for_closing().wait();
        tracing::debug!(
            "Closed transactional store at {}",
            self.config.data_dir.display()
        );
        Ok(())
    }

    /// Wipe the database, close the environment and remove the data directory
    pub fn destroy(self) -> Result<()> {
        let data_dir = self.config.data_dir.clone();
        let mut failures = Vec::new();

        if let Err(e) = self.with_write_txn(|scope| scope.clear()) {
            tracing::warn!("Failed to clear database {}: {}", self.config.database, e);
            failures.push(format!("clear database: {}", e));
        }

        self.env.prepare_for_closing().wait();

        if data_dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&data_dir)
        {
            tracing::warn!("Failed to remove {}: {}", data_dir.display(), e);
            failures.push(format!("remove {}: {}", data_dir.display(), e));
        }

        if failures.is_empty() {
            tracing::info!("Destroyed transactional store at {}", data_dir.display());
            Ok(())
        } else {
            Err(Error::DestroyIncomplete { failures })
        }
    }
}

impl SlotStore for TransactionalStore {
    fn capability(&self) -> Capability {
        Capability::Transactional
    }

    fn recover(&self) -> Result<SlotBounds> {
        self.with_read_txn(|scope| {
            let live = scope.slot_count()?;
            let head = match scope.head_pointer()? {
                Some(head) => head,
                None => scope.lowest_slot()?.map(|(slot, _)| slot).unwrap_or(0),
            };

            // Gaps make head + live an underestimate; never hand out a slot
            // that is still on disk.
            let past_highest = scope.highest_slot()?.map(|slot| slot + 1).unwrap_or(0);
            let tail = (head + live).max(past_highest);

            Ok(SlotBounds::new(head, tail))
        })
    }

    fn put(&self, slot: u64, payload: &[u8]) -> Result<()> {
        self.with_write_txn(|scope| scope.put(&encode_slot(slot), payload))
    }

    fn first(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        self.with_read_txn(|scope| {
            if let Some(payload) = scope.get(&encode_slot(from))? {
                return Ok(Some((from, payload)));
            }
            scope.lowest_slot()
        })
    }

    fn take_first(&self, from: u64) -> Result<Option<(u64, Vec<u8>)>> {
        self.with_write_txn(|scope| {
            let Some((slot, payload)) = scope.head_entry(from)? else {
                return Ok(None);
            };
            scope.delete(&encode_slot(slot))?;
            scope.advance_head_past(slot)?;
            Ok(Some((slot, payload)))
        })
    }

    fn remove(&self, slot: u64) -> Result<bool> {
        self.with_write_txn(|scope| {
            if !scope.delete(&encode_slot(slot))? {
                return Ok(false);
            }
            scope.advance_head_past(slot)?;
            Ok(true)
        })
    }

    fn entries(&self) -> Result<Vec<(u64, Vec<u8>)>> {
        self.with_read_txn(|scope| scope.slots())
    }

    fn restore(&self, slot: u64, payload: &[u8]) -> Result<()> {
        self.with_write_txn(|scope| {
            scope.put(&encode_slot(slot), payload)?;
            if let Some(head) = scope.head_pointer()?
                && head > slot
            {
                scope.set_head_pointer(slot)?;
            }
            Ok(())
        })
    }

    fn len(&self) -> Result<u64> {
        self.with_read_txn(|scope| scope.slot_count())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn flush(&self) -> Result<()> {
        self.env.force_sync()?;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.config.data_dir
    }
}
