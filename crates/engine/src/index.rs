//! The index manager: memtable, table lists, flush, and compaction.
//!
//! Owns the mutable heart of the engine. The table lists and serial
//! counters live behind one reader/writer lock: the read cascade and the
//! scan path take the shared form, flush and compaction the exclusive
//! form. Memtable mutations hold the shared form too, so a flush can
//! never interleave between its snapshot of the memtable and the reset;
//! a write either lands before the snapshot or after the new table is
//! installed.

use crate::config::Config;
use crate::heap::ValueHeap;
use codec::{Error, Position, Result};
use memtable::{new_memtable, Memtable};
use sstable::SsTable;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use wal::{Wal, WalEntry};

/// Message type of the background-flusher channel.
pub(crate) enum FlushRequest {
    Flush,
    Shutdown,
}

/// Raw and level tables in descending-serial (newest first) order, plus
/// the highest serial in use per kind. Serial 0 is never assigned.
pub(crate) struct TableSet {
    pub(crate) raws: Vec<SsTable>,
    pub(crate) levels: Vec<SsTable>,
    pub(crate) raw_serial: u32,
    pub(crate) level_serial: u32,
}

impl TableSet {
    pub(crate) fn sort(&mut self) {
        self.raws.sort_by(|a, b| b.serial().cmp(&a.serial()));
        self.levels.sort_by(|a, b| b.serial().cmp(&a.serial()));
    }
}

pub(crate) struct IndexManager {
    home: PathBuf,
    config: Config,
    mem: Box<dyn Memtable>,
    wal: Arc<Wal>,
    tables: RwLock<TableSet>,
    flush_tx: Mutex<Option<Sender<FlushRequest>>>,
}

impl IndexManager {
    pub(crate) fn new(home: PathBuf, config: Config, wal: Arc<Wal>, tables: TableSet) -> Self {
        Self {
            home,
            mem: new_memtable(config.memtable),
            config,
            wal,
            tables: RwLock::new(tables),
            flush_tx: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, TableSet> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, TableSet> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Hands the manager the sending half of the flusher channel. Called
    /// once during engine open, after WAL replay.
    pub(crate) fn attach_flusher(&self, tx: Sender<FlushRequest>) {
        *self.flush_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    /// Takes the sender back and signals the flusher to stop.
    pub(crate) fn signal_shutdown(&self) {
        if let Some(tx) = self.flush_tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(FlushRequest::Shutdown);
        }
    }

    /// Queues a background flush. A no-op before the flusher is attached
    /// or after shutdown.
    fn request_flush(&self) {
        if let Some(tx) = self.flush_tx.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            let _ = tx.send(FlushRequest::Flush);
        }
    }

    /// The read cascade: memtable, then raw tables newest-first, then
    /// level tables newest-first. A tombstone anywhere cuts the cascade
    /// short, since deletes shadow every older container.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Position> {
        if self.mem.contains(key) {
            let pos = self.mem.get(key);
            return if pos.is_tombstone() {
                Err(Error::KeyNotFound)
            } else {
                Ok(pos)
            };
        }

        let tables = self.read_tables();
        for table in tables.raws.iter().chain(tables.levels.iter()) {
            match table.search(key) {
                Ok(pos) => return Ok(pos),
                Err(Error::KeyRemoved) => return Err(Error::KeyNotFound),
                Err(Error::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::KeyNotFound)
    }

    /// The write path: WAL append, heap append, memtable insert, in that
    /// order and under the shared table latch.
    ///
    /// Holding the latch across all three keeps a concurrent flush from
    /// clearing the WAL between the append and the insert, which would
    /// leave the write in neither the WAL nor any table. If the WAL
    /// append fails nothing else happens.
    pub(crate) fn set(&self, key: &[u8], value: &[u8], heap: &ValueHeap) -> Result<()> {
        {
            let _tables = self.read_tables();
            self.wal.append(&WalEntry::put(key, value))?;
            let pos = heap.store(value)?;
            self.mem.set(key, pos);
        }
        if self.mem.len() >= self.config.memtable_size_threshold {
            self.request_flush();
        }
        Ok(())
    }

    /// The delete path: a tombstone record in the WAL, then a tombstone
    /// in the memtable, under the shared table latch like [`set`](Self::set).
    pub(crate) fn delete(&self, key: &[u8]) -> Result<()> {
        let _tables = self.read_tables();
        self.wal.append(&WalEntry::delete(key))?;
        self.mem.set(key, Position::TOMBSTONE);
        Ok(())
    }

    /// Re-applies a replayed WAL record to the memtable without logging
    /// it again. The value (if any) was already re-stored in the heap.
    pub(crate) fn apply_replayed(&self, key: &[u8], pos: Position) {
        let _tables = self.read_tables();
        self.mem.set(key, pos);
    }

    /// Union of every table's live keys folded with the memtable: a
    /// memtable value adds its key, a memtable tombstone removes it.
    pub(crate) fn scan_keys(&self) -> Result<BTreeSet<Vec<u8>>> {
        let tables = self.read_tables();

        let mut keys = BTreeSet::new();
        for table in tables.raws.iter().chain(tables.levels.iter()) {
            for key in table.keys()? {
                keys.insert(key);
            }
        }

        for (key, pos) in self.mem.items() {
            if pos.is_tombstone() {
                keys.remove(&key);
            } else {
                keys.insert(key);
            }
        }

        Ok(keys)
    }

    /// Materializes the memtable as a new raw table, then clears the WAL.
    ///
    /// Holds the exclusive table lock for the duration. Nothing is
    /// installed, and neither the memtable nor the WAL is touched, until
    /// the table file exists on disk. A failed write leaves the engine
    /// exactly as it was.
    pub(crate) fn flush(&self) -> Result<()> {
        let mut tables = self.write_tables();

        let items = self.mem.items();
        if items.is_empty() {
            return Ok(());
        }

        let serial = tables.raw_serial + 1;
        let name = format!("{}{}", self.config.sst_prefix, serial);
        let table = SsTable::create(
            &self.home.join(&name),
            self.config.key_size,
            self.config.bloom_false_positive_rate,
            false,
            serial,
            &items,
        )?;

        tables.raws.push(table);
        tables.raw_serial = serial;
        tables.sort();
        self.mem.reset();
        self.wal.clear()?;

        debug!(serial, pairs = items.len(), "flushed memtable to {name}");

        if tables.raws.len() > self.config.compaction_threshold as usize {
            self.compact_locked(&mut tables)?;
        }
        Ok(())
    }

    /// Folds every raw table into a single level table and deletes the
    /// raw files. Newest record per key wins; tombstones are kept so they
    /// keep shadowing older levels.
    ///
    /// Called with the exclusive lock already held. If the level write
    /// fails, every raw table stays in place.
    fn compact_locked(&self, tables: &mut TableSet) -> Result<()> {
        if tables.raws.is_empty() {
            return Ok(());
        }

        let mut merged = std::collections::BTreeMap::new();
        // raws is newest-first, so the first occurrence of a key is the
        // most recent record.
        for table in &tables.raws {
            for (key, pos) in table.items()? {
                merged.entry(key).or_insert(pos);
            }
        }
        let pairs: Vec<(Vec<u8>, Position)> = merged.into_iter().collect();

        let serial = tables.level_serial + 1;
        let name = format!("{}{}", self.config.level_prefix, serial);
        let level = SsTable::create(
            &self.home.join(&name),
            self.config.key_size,
            self.config.bloom_false_positive_rate,
            true,
            serial,
            &pairs,
        )?;

        let folded = tables.raws.len();
        tables.levels.push(level);
        tables.level_serial = serial;

        for table in std::mem::take(&mut tables.raws) {
            let path = table.path().to_path_buf();
            drop(table);
            if let Err(e) = fs::remove_file(&path) {
                warn!("failed to remove compacted table {}: {e}", path.display());
            }
        }
        tables.sort();

        info!(serial, folded, pairs = pairs.len(), "compacted raw tables into {name}");
        Ok(())
    }

    /// Final flush (if anything is buffered) and release of every table
    /// handle. Returns the first error but keeps going.
    pub(crate) fn close(&self) -> Result<()> {
        let mut first_err = None;

        if !self.mem.is_empty() {
            if let Err(e) = self.flush() {
                first_err.get_or_insert(e);
            }
        }

        let mut tables = self.write_tables();
        tables.raws.clear();
        tables.levels.clear();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // Introspection, used by the façade and tests.

    pub(crate) fn memtable_len(&self) -> u32 {
        self.mem.len()
    }

    pub(crate) fn raw_table_count(&self) -> usize {
        self.read_tables().raws.len()
    }

    pub(crate) fn level_table_count(&self) -> usize {
        self.read_tables().levels.len()
    }

    /// Queues a flush if WAL replay already filled the memtable past the
    /// threshold.
    pub(crate) fn request_flush_if_full(&self) {
        if self.mem.len() >= self.config.memtable_size_threshold {
            self.request_flush();
        }
    }
}
