//! The value heap: an append-only file of raw value bytes.
//!
//! The index layers (memtable, sorted tables) never hold values; they
//! hold [`Position`]s into this file. The heap itself has no framing: it
//! is the plain concatenation of every value ever stored, and only the
//! positions handed out by `store` make it navigable.
//!
//! The file is never rewritten, so a position stays valid for the life of
//! the heap. Values orphaned by overwrites and deletes are not reclaimed;
//! [`ValueHeap::compact`] is a reserved hook for a future rebuild.

use codec::{Error, Position, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Append-only value storage.
///
/// Writes go through a dedicated append handle, reads through a separate
/// read handle; each is serialized by its own mutex. A read can therefore
/// run while an append is in flight without observing torn data, because
/// it only ever dereferences positions returned by completed `store`
/// calls.
pub struct ValueHeap {
    writer: Mutex<File>,
    reader: Mutex<File>,
    path: PathBuf,
}

impl ValueHeap {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = OpenOptions::new().create(true).append(true).open(&path)?;
        let reader = File::open(&path)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            path,
        })
    }

    /// Appends `value` and returns the position naming it.
    pub fn store(&self, value: &[u8]) -> Result<Position> {
        let mut writer = lock(&self.writer)?;
        let offset = writer.seek(SeekFrom::End(0))?;

        let end = offset + value.len() as u64;
        if end > u64::from(u32::MAX) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "value heap exceeds the 4 GiB addressable by u32 offsets",
            )));
        }

        writer.write_all(value)?;
        Ok(Position::new(offset as u32, value.len() as u32))
    }

    /// Reads the value slice a position names.
    ///
    /// A tombstone position reports [`Error::KeyNotFound`]; the index
    /// layers normally filter tombstones before calling, so this is a
    /// backstop.
    pub fn retrieve(&self, pos: Position) -> Result<Vec<u8>> {
        if pos.is_tombstone() {
            return Err(Error::KeyNotFound);
        }

        let mut reader = lock(&self.reader)?;
        reader.seek(SeekFrom::Start(u64::from(pos.offset)))?;

        let mut buf = vec![0u8; pos.size as usize];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Corrupt(format!(
                    "value heap too short for position ({}, {})",
                    pos.offset, pos.size
                ))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(buf)
    }

    /// Space reclamation hook. Unimplemented: orphaned values stay on
    /// disk.
    pub fn compact(&self) -> Result<()> {
        Ok(())
    }

    /// Flushes appended values to stable storage.
    pub fn close(&self) -> Result<()> {
        let mut writer = lock(&self.writer)?;
        writer.flush()?;
        writer.sync_all()?;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock(m: &Mutex<File>) -> Result<MutexGuard<'_, File>> {
    m.lock()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
}
