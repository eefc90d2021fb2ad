//! # Engine — the SiltKV storage engine
//!
//! The embeddable façade tying the [`wal`], [`memtable`], and [`sstable`]
//! crates together with the value heap into a complete LSM-tree key-value
//! store.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                    ENGINE                       │
//! │                                                 │
//! │ set/delete → WAL append → heap append           │
//! │                → memtable insert                │
//! │                    |                            │
//! │                    | (threshold crossed?)       │
//! │                    v        yes                 │
//! │             flush request → background thread   │
//! │                    |                            │
//! │                 flush() → new raw table,        │
//! │                           WAL cleared           │
//! │                    |                            │
//! │                    | (too many raw tables?)     │
//! │                    v        yes                 │
//! │               compact() → single level table    │
//! │                                                 │
//! │ get → memtable → raw tables → level tables      │
//! │        (newest first, first match wins)         │
//! │     → value heap read                           │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Files in the home directory
//!
//! | file          | contents                              |
//! |---------------|---------------------------------------|
//! | `wal.log.bin` | write-ahead log, truncated on flush   |
//! | `data.bin`    | append-only value heap                |
//! | `sst_<n>`     | raw sorted tables from flushes        |
//! | `lvl_<n>`     | level tables from compaction          |
//!
//! ## Crash safety
//!
//! Every mutation reaches the WAL before it becomes visible in the
//! memtable, and the WAL is only truncated after the flushed table exists
//! on disk. Tables are written to a temp file and renamed into place. On
//! open, the WAL is replayed before any request is served.
//!
//! ## Concurrency
//!
//! All methods take `&self`; any number of threads may call concurrently.
//! One background thread performs flushes. [`Engine::close`] drains it and
//! flushes whatever is left; dropping an unclosed engine does the same on
//! a best-effort basis.

mod config;
mod flusher;
mod heap;
mod index;
mod recovery;

pub use codec::{Error, Position, Result};
pub use config::{Config, HEAP_FILE_NAME, WAL_FILE_NAME};
pub use heap::ValueHeap;
pub use memtable::MemtableKind;

use index::IndexManager;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::info;
use wal::Wal;

/// The storage engine handle.
pub struct Engine {
    index: Arc<IndexManager>,
    heap: ValueHeap,
    wal: Arc<Wal>,
    home: PathBuf,
    flusher: Option<JoinHandle<()>>,
}

impl Engine {
    /// Opens (or creates) an engine over `home`.
    ///
    /// Recovery runs before the handle is returned: existing tables are
    /// loaded and sorted by recency, the WAL is replayed into a fresh
    /// memtable, and only then does the background flusher start.
    pub fn open<P: AsRef<Path>>(home: P, config: Config) -> Result<Engine> {
        let home = home.as_ref().to_path_buf();
        fs::create_dir_all(&home)?;

        let wal = Arc::new(Wal::open(
            home.join(WAL_FILE_NAME),
            config.key_size,
            config.wal_sync,
        )?);
        let heap = ValueHeap::open(home.join(HEAP_FILE_NAME))?;

        let tables = recovery::load_tables(&home, &config)?;
        let index = Arc::new(IndexManager::new(
            home.clone(),
            config,
            Arc::clone(&wal),
            tables,
        ));

        let replayed = recovery::replay_wal(&wal, &heap, &index)?;

        let (tx, rx) = mpsc::channel();
        let flusher = flusher::spawn(Arc::clone(&index), rx)?;
        index.attach_flusher(tx);
        if replayed > 0 {
            index.request_flush_if_full();
        }

        info!(home = %home.display(), "engine open");
        Ok(Engine {
            index,
            heap,
            wal,
            home,
            flusher: Some(flusher),
        })
    }

    /// Looks a key up and returns its value bytes.
    ///
    /// Returns [`Error::KeyNotFound`] for absent and deleted keys.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        codec::validate_key(key, self.config().key_size)?;
        let pos = self.index.get(key)?;
        self.heap.retrieve(pos)
    }

    /// Inserts or overwrites a key.
    ///
    /// The write is durable in the WAL before it becomes visible; if the
    /// WAL append fails nothing changes. An empty value is
    /// indistinguishable from a delete on the wire and is treated as one.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        codec::validate_key(key, self.config().key_size)?;
        self.index.set(key, value, &self.heap)
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// The tombstone shadows any older value in the tables; the heap bytes
    /// it orphans are not reclaimed.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        codec::validate_key(key, self.config().key_size)?;
        self.index.delete(key)
    }

    /// Lists every key starting with `prefix`, in ascending order. An
    /// empty prefix lists everything.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let keys = self.index.scan_keys()?;
        Ok(keys
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Flushes the memtable synchronously. A no-op when it is empty.
    pub fn force_flush(&self) -> Result<()> {
        self.index.flush()
    }

    /// Shuts the engine down: stops the background flusher, flushes any
    /// buffered writes, and syncs the heap and WAL. Returns the first
    /// error encountered but completes every step.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.index.signal_shutdown();
        if let Some(handle) = self.flusher.take() {
            let _ = handle.join();
        }

        let mut first_err = None;
        if let Err(e) = self.index.close() {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.heap.close() {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.wal.sync_to_disk() {
            first_err.get_or_insert(e);
        }

        info!(home = %self.home.display(), "engine closed");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &Config {
        self.index.config()
    }

    /// Number of distinct keys buffered in the memtable.
    pub fn memtable_len(&self) -> u32 {
        self.index.memtable_len()
    }

    /// Number of raw (uncompacted) tables.
    pub fn raw_table_count(&self) -> usize {
        self.index.raw_table_count()
    }

    /// Number of compacted level tables.
    pub fn level_table_count(&self) -> usize {
        self.index.level_table_count()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("home", &self.home)
            .field("memtable_len", &self.memtable_len())
            .field("raw_tables", &self.raw_table_count())
            .field("level_tables", &self.level_table_count())
            .finish()
    }
}

/// Best-effort cleanup when the handle is dropped without `close()`.
/// Errors are ignored; anything unflushed is still covered by the WAL and
/// comes back on the next open.
impl Drop for Engine {
    fn drop(&mut self) {
        if self.flusher.is_some() {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests;
