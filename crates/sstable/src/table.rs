//! Sorted-table creation, opening, and lookup.

use crate::meta::{pair_stride, TableMeta};
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use codec::{pad_key, trim_key, Error, Position, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// An immutable sorted table on disk.
///
/// The file handle is kept open for the table's lifetime, behind a mutex
/// so lookups work through `&self`. Every search probe is one seek plus
/// one fixed-size read.
pub struct SsTable {
    meta: TableMeta,
    filter: BloomFilter,
    file: Mutex<File>,
    path: PathBuf,
    key_size: u32,
}

impl SsTable {
    /// Builds a new table at `path` from sorted `pairs` and reopens it for
    /// reading.
    ///
    /// The caller supplies pairs in strictly ascending key order with each
    /// key appearing once; `min_key`/`max_key` are taken from the ends.
    /// The whole file (header, filter, pair array) is assembled in one
    /// buffer and written to a temporary sibling, fsynced, and renamed
    /// into place, so a crash mid-write never leaves a half-written table
    /// under the final name.
    pub fn create(
        path: &Path,
        key_size: u32,
        false_positive_rate: f64,
        is_level: bool,
        serial: u32,
        pairs: &[(Vec<u8>, Position)],
    ) -> Result<SsTable> {
        if pairs.is_empty() {
            return Err(Error::Corrupt("refusing to write an empty table".into()));
        }

        let mut filter = BloomFilter::new(pairs.len(), false_positive_rate);
        for (key, _) in pairs {
            filter.add(key);
        }
        let mut filter_bytes = Vec::with_capacity(filter.serialized_size());
        filter.write_to(&mut filter_bytes)?;

        let meta = TableMeta {
            is_level,
            serial,
            pair_count: pairs.len() as u32,
            filter_size: filter_bytes.len() as u32,
            min_key: pairs[0].0.clone(),
            max_key: pairs[pairs.len() - 1].0.clone(),
        };

        let mut buf = Vec::with_capacity(
            TableMeta::encoded_len(key_size) as usize
                + filter_bytes.len()
                + pairs.len() * pair_stride(key_size) as usize,
        );
        meta.write_to(&mut buf, key_size)?;
        buf.extend_from_slice(&filter_bytes);
        for (key, pos) in pairs {
            buf.extend_from_slice(&pad_key(key, key_size)?);
            buf.write_u32::<LittleEndian>(pos.offset)?;
            buf.write_u32::<LittleEndian>(pos.size)?;
        }

        let tmp_path = tmp_sibling(path);
        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.flush()?;
            tmp.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Io(e));
        }

        let file = File::open(path)?;
        Ok(SsTable {
            meta,
            filter,
            file: Mutex::new(file),
            path: path.to_path_buf(),
            key_size,
        })
    }

    /// Opens an existing table, parsing the metadata header and bloom
    /// filter. The pair array stays on disk.
    pub fn open(path: &Path, key_size: u32) -> Result<SsTable> {
        let mut file = File::open(path)?;

        let meta = TableMeta::read_from(&mut file, key_size)?;

        let mut filter_bytes = vec![0u8; meta.filter_size as usize];
        file.read_exact(&mut filter_bytes)
            .map_err(|e| body_error(e, "truncated bloom filter section"))?;
        let mut cursor = io::Cursor::new(&filter_bytes[..]);
        let filter = BloomFilter::read_from(&mut cursor)
            .map_err(|e| body_error(e, "malformed bloom filter"))?;
        if filter.serialized_size() != filter_bytes.len() {
            return Err(Error::Corrupt(format!(
                "bloom filter occupies {} bytes but the header declares {}",
                filter.serialized_size(),
                filter_bytes.len()
            )));
        }

        Ok(SsTable {
            meta,
            filter,
            file: Mutex::new(file),
            path: path.to_path_buf(),
            key_size,
        })
    }

    #[must_use]
    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    #[must_use]
    pub fn serial(&self) -> u32 {
        self.meta.serial
    }

    #[must_use]
    pub fn is_level(&self) -> bool {
        self.meta.is_level
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point lookup.
    ///
    /// Rejects via the min/max range and the bloom filter before binary
    /// searching the pair array. Returns [`Error::KeyRemoved`] when the
    /// match is a tombstone and [`Error::KeyNotFound`] when the key is
    /// absent.
    pub fn search(&self, key: &[u8]) -> Result<Position> {
        if key < self.meta.min_key.as_slice() || key > self.meta.max_key.as_slice() {
            return Err(Error::KeyNotFound);
        }
        if !self.filter.test(key) {
            return Err(Error::KeyNotFound);
        }

        let padded = pad_key(key, self.key_size)?;
        let mut file = self.lock_file()?;

        let mut lo: i64 = 0;
        let mut hi: i64 = i64::from(self.meta.pair_count) - 1;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let (pair_key, pos) = self.read_pair(&mut file, mid as u64)?;

            match pair_key.as_slice().cmp(padded.as_slice()) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid - 1,
                std::cmp::Ordering::Equal => {
                    return if pos.is_tombstone() {
                        Err(Error::KeyRemoved)
                    } else {
                        Ok(pos)
                    };
                }
            }
        }

        Err(Error::KeyNotFound)
    }

    /// Every live key in ascending order. Tombstoned keys are skipped;
    /// this feeds the scan path, which wants a directory of keys that may
    /// exist.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let region = self.read_pair_region()?;
        let stride = pair_stride(self.key_size) as usize;
        let key_len = self.key_size as usize;

        let mut out = Vec::with_capacity(self.meta.pair_count as usize);
        for window in region.chunks_exact(stride) {
            let size = u32::from_le_bytes(window[key_len + 4..key_len + 8].try_into().unwrap());
            if size > 0 {
                out.push(trim_key(&window[..key_len]).to_vec());
            }
        }
        Ok(out)
    }

    /// Every record in ascending order, tombstones included. Compaction
    /// consumes this.
    pub fn items(&self) -> Result<Vec<(Vec<u8>, Position)>> {
        let region = self.read_pair_region()?;
        let stride = pair_stride(self.key_size) as usize;
        let key_len = self.key_size as usize;

        let mut out = Vec::with_capacity(self.meta.pair_count as usize);
        for window in region.chunks_exact(stride) {
            let offset = u32::from_le_bytes(window[key_len..key_len + 4].try_into().unwrap());
            let size = u32::from_le_bytes(window[key_len + 4..key_len + 8].try_into().unwrap());
            out.push((
                trim_key(&window[..key_len]).to_vec(),
                Position::new(offset, size),
            ));
        }
        Ok(out)
    }

    fn lock_file(&self) -> Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }

    /// Seeks to the i-th pair and reads its padded key and position.
    fn read_pair(&self, file: &mut File, index: u64) -> Result<(Vec<u8>, Position)> {
        let offset = self.pairs_start() + index * pair_stride(self.key_size);
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; pair_stride(self.key_size) as usize];
        file.read_exact(&mut buf)
            .map_err(|e| body_error(e, "truncated pair record"))?;

        let key_len = self.key_size as usize;
        let pos_offset = u32::from_le_bytes(buf[key_len..key_len + 4].try_into().unwrap());
        let pos_size = u32::from_le_bytes(buf[key_len + 4..key_len + 8].try_into().unwrap());
        buf.truncate(key_len);
        Ok((buf, Position::new(pos_offset, pos_size)))
    }

    /// Bulk read of the whole pair section.
    fn read_pair_region(&self) -> Result<Vec<u8>> {
        let mut file = self.lock_file()?;
        file.seek(SeekFrom::Start(self.pairs_start()))?;

        let len = u64::from(self.meta.pair_count) * pair_stride(self.key_size);
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)
            .map_err(|e| body_error(e, "truncated pair section"))?;
        Ok(buf)
    }

    fn pairs_start(&self) -> u64 {
        TableMeta::encoded_len(self.key_size) + u64::from(self.meta.filter_size)
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("path", &self.path)
            .field("serial", &self.meta.serial)
            .field("is_level", &self.meta.is_level)
            .field("pair_count", &self.meta.pair_count)
            .finish()
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Short reads inside the table body are corruption; everything else is
/// plain I/O failure.
fn body_error(e: io::Error, what: &str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corrupt(what.to_string())
    } else {
        Error::Io(e)
    }
}
