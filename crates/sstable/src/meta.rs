//! Table metadata header codec.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use codec::{pad_key, trim_key, Error, Result};
use std::io::{self, Read, Write};

const RAW_FLAG: u8 = 0x00;
const LEVEL_FLAG: u8 = 0xFF;

/// Parsed metadata header of a sorted table.
///
/// `min_key`/`max_key` are held unpadded; they are padded on the way to
/// disk and trimmed on the way back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// `true` for a compacted level file, `false` for a raw flush.
    pub is_level: bool,
    /// Monotonically increasing table id; 0 is never assigned.
    pub serial: u32,
    pub pair_count: u32,
    /// Byte length of the serialized bloom filter that follows the header.
    pub filter_size: u32,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
}

impl TableMeta {
    /// Encoded header length for a given key size: flag byte, three u32
    /// fields, and the two padded boundary keys.
    #[must_use]
    pub fn encoded_len(key_size: u32) -> u64 {
        1 + 3 * 4 + 2 * u64::from(key_size)
    }

    pub fn write_to<W: Write>(&self, w: &mut W, key_size: u32) -> Result<()> {
        w.write_u8(if self.is_level { LEVEL_FLAG } else { RAW_FLAG })?;
        w.write_u32::<LittleEndian>(self.serial)?;
        w.write_u32::<LittleEndian>(self.pair_count)?;
        w.write_u32::<LittleEndian>(self.filter_size)?;
        w.write_all(&pad_key(&self.min_key, key_size)?)?;
        w.write_all(&pad_key(&self.max_key, key_size)?)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R, key_size: u32) -> Result<TableMeta> {
        let is_level = match r.read_u8().map_err(truncated)? {
            RAW_FLAG => false,
            LEVEL_FLAG => true,
            other => {
                return Err(Error::Corrupt(format!(
                    "unknown table flag byte {other:#04x}"
                )))
            }
        };

        let serial = r.read_u32::<LittleEndian>().map_err(truncated)?;
        let pair_count = r.read_u32::<LittleEndian>().map_err(truncated)?;
        let filter_size = r.read_u32::<LittleEndian>().map_err(truncated)?;

        if serial == 0 {
            return Err(Error::Corrupt("table serial 0 is reserved".into()));
        }

        let mut key_buf = vec![0u8; key_size as usize];
        r.read_exact(&mut key_buf).map_err(truncated)?;
        let min_key = trim_key(&key_buf).to_vec();
        r.read_exact(&mut key_buf).map_err(truncated)?;
        let max_key = trim_key(&key_buf).to_vec();

        Ok(TableMeta {
            is_level,
            serial,
            pair_count,
            filter_size,
            min_key,
            max_key,
        })
    }
}

/// Byte stride of one key/position pair.
#[must_use]
pub fn pair_stride(key_size: u32) -> u64 {
    u64::from(key_size) + 8
}

/// A short read inside the header is corruption, not a clean EOF.
fn truncated(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corrupt("truncated table metadata".into())
    } else {
        Error::Io(e)
    }
}
