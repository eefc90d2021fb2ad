//! # WAL — Write-Ahead Log
//!
//! Crash durability for the SiltKV storage engine.
//!
//! Every mutation is serialized into a binary record and appended to the
//! WAL **before** the corresponding in-memory update becomes visible. On
//! restart the WAL is replayed to reconstruct the memtable, so no
//! acknowledged write is lost to a process crash.
//!
//! ## Binary record format
//!
//! ```text
//! [padded key: K bytes][value_len: u32 LE][value: value_len bytes]
//! ```
//!
//! `K` is the engine's configured key size. A record with
//! `value_len == 0` encodes a deletion. The file is the plain
//! concatenation of records; end of file terminates parsing, and a short
//! tail (crash mid-append) is treated as "the log ended there".
//!
//! ## Locking
//!
//! One internal mutex serializes `append`, `replay`, and `clear`, so
//! records on disk are never interleaved and a replay never observes a
//! half-written append.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use codec::{pad_key, trim_key, Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single logged mutation. An empty `value` is a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl WalEntry {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
        }
    }

    /// Returns `true` if this entry records a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }
}

/// Append-only write-ahead log.
///
/// Records are serialized into a scratch buffer and written with a single
/// `write_all` call. With `sync` enabled every append is followed by
/// `sync_all()` (fsync); the default leaves durability to the OS page
/// cache, which survives process crashes but not power loss.
pub struct Wal {
    inner: Mutex<WalFile>,
    path: PathBuf,
    key_size: u32,
    sync: bool,
}

struct WalFile {
    file: File,
    /// Reusable scratch buffer so appends do not allocate.
    buf: Vec<u8>,
}

impl Wal {
    /// Opens (or creates) the log file in append mode.
    pub fn open<P: AsRef<Path>>(path: P, key_size: u32, sync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            inner: Mutex::new(WalFile {
                file,
                buf: Vec::with_capacity(key_size as usize + 256),
            }),
            path,
            key_size,
            sync,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WalFile>> {
        self.inner
            .lock()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }

    /// Serializes `entry` and appends it in one write call.
    ///
    /// Returns only after the bytes have been handed to the OS (and, with
    /// `sync`, after they have reached stable storage).
    pub fn append(&self, entry: &WalEntry) -> Result<()> {
        let padded = pad_key(&entry.key, self.key_size)?;

        let mut inner = self.lock()?;
        let inner = &mut *inner;

        inner.buf.clear();
        inner.buf.extend_from_slice(&padded);
        inner
            .buf
            .write_u32::<LittleEndian>(entry.value.len() as u32)?;
        inner.buf.extend_from_slice(&entry.value);

        inner.file.write_all(&inner.buf)?;
        inner.file.flush()?;
        if self.sync {
            inner.file.sync_all()?;
        }
        Ok(())
    }

    /// Reads the log from the start and returns every complete record in
    /// write order.
    ///
    /// Duplicate keys are **not** deduplicated here: applying the entries
    /// in order to a last-writer-wins map reproduces the pre-crash view.
    ///
    /// # Termination
    ///
    /// - Clean EOF at a record boundary -> all records returned.
    /// - Short tail anywhere inside the final record (crash mid-append) ->
    ///   the complete records before it are returned.
    pub fn replay(&self) -> Result<Vec<WalEntry>> {
        let _guard = self.lock()?;

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let mut rdr = BufReader::new(file);

        let mut entries = Vec::new();
        let mut key_buf = vec![0u8; self.key_size as usize];

        loop {
            match read_fully(&mut rdr, &mut key_buf) {
                TailRead::Complete => {}
                TailRead::Truncated => return Ok(entries),
                TailRead::Failed(e) => return Err(Error::Io(e)),
            }

            let value_len = match rdr.read_u32::<LittleEndian>() {
                Ok(v) => v as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(entries),
                Err(e) => return Err(Error::Io(e)),
            };

            // A torn tail can leave a garbage length here, so size the
            // buffer by what the file actually holds instead of trusting
            // the header.
            let mut value = Vec::new();
            match rdr.by_ref().take(value_len as u64).read_to_end(&mut value) {
                Ok(n) if n == value_len => {}
                Ok(_) => return Ok(entries),
                Err(e) => return Err(Error::Io(e)),
            }

            entries.push(WalEntry {
                key: trim_key(&key_buf).to_vec(),
                value,
            });
        }
    }

    /// Truncates the log to zero length. Called after a successful flush,
    /// once every logged record has been persisted into a sorted table.
    pub fn clear(&self) -> Result<()> {
        let inner = self.lock()?;
        inner.file.set_len(0)?;
        Ok(())
    }

    /// Forces buffered data to stable storage.
    pub fn sync_to_disk(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}

enum TailRead {
    Complete,
    Truncated,
    Failed(io::Error),
}

/// `read_exact` that reports a short tail as [`TailRead::Truncated`]
/// instead of an error.
fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> TailRead {
    match r.read_exact(buf) {
        Ok(()) => TailRead::Complete,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => TailRead::Truncated,
        Err(e) => TailRead::Failed(e),
    }
}

#[cfg(test)]
mod tests;
