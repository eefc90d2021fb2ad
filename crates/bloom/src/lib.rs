//! # Bloom Filter
//!
//! A space-efficient probabilistic set for membership testing.
//!
//! A bloom filter can say with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally claim a key **is** present
//! when it isn't (false positives). The false-positive rate is tuned by
//! the number of bits and hash functions.
//!
//! ## Usage in SiltKV
//!
//! Every sorted table embeds a filter built from its keys. A point lookup
//! tests the filter first; a negative answer skips the table entirely,
//! avoiding the binary search and its disk seeks.
//!
//! ## Wire format
//!
//! ```text
//! [hash_count: u32 LE][bit_count: u32 LE][ceil(bit_count / 8) packed bytes]
//! ```
//!
//! Bit `i` lives at byte `i / 8`, bit position `i % 8`.

use std::io::{self, Read, Write};

/// A bloom filter backed by a packed bit vector with `k` hash functions.
///
/// Uses double hashing: `h(i) = h1 + i * h2`, with `h1` and `h2` derived
/// from FNV-1a under two different bases.
pub struct BloomFilter {
    /// Packed filter bits.
    bits: Vec<u8>,
    /// Number of bits in the filter (m).
    bit_count: u32,
    /// Number of hash functions (k).
    hash_count: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in
    /// `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / (ln 2)^2
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u32;
        let m = m.max(8);

        // k = (m / n) * ln 2
        let k = ((f64::from(m) / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        Self {
            bits: vec![0u8; Self::byte_len(m)],
            bit_count: m,
            hash_count: k,
        }
    }

    fn byte_len(bit_count: u32) -> usize {
        (bit_count as usize + 7) / 8
    }

    /// Inserts a key into the filter.
    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.hash_count {
            let idx = self.bit_index(h1, h2, i);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not**.
    #[must_use]
    pub fn test(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.hash_count {
            let idx = self.bit_index(h1, h2, i);
            if self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    /// h(i) = (h1 + i * h2) mod bit_count.
    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u32 {
        (h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % u64::from(self.bit_count)) as u32
    }

    #[must_use]
    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    #[must_use]
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Size of the serialized filter: two u32 header fields plus the
    /// packed bits.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        4 + 4 + self.bits.len()
    }

    /// Writes `[hash_count][bit_count][packed bits]`, little-endian.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.hash_count.to_le_bytes())?;
        w.write_all(&self.bit_count.to_le_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Reads a filter previously produced by [`write_to`](Self::write_to).
    ///
    /// The hash family is fixed, so the deserialized filter answers
    /// exactly like the one that was serialized.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf4)?;
        let hash_count = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let bit_count = u32::from_le_bytes(buf4);

        if hash_count == 0 || bit_count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter with zero bits or hashes",
            ));
        }

        let mut bits = vec![0u8; Self::byte_len(bit_count)];
        r.read_exact(&mut bits)?;

        Ok(Self {
            bits,
            bit_count,
            hash_count,
        })
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bit_count", &self.bit_count)
            .field("hash_count", &self.hash_count)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Two independent 64-bit hashes: FNV-1a under different bases.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (
        fnv1a_64(key, 0xcbf2_9ce4_8422_2325),
        fnv1a_64(key, 0x517c_c1b7_2722_0a95),
    )
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
