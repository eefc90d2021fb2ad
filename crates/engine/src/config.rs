//! Engine configuration.

use memtable::MemtableKind;

/// WAL file name inside the home directory.
pub const WAL_FILE_NAME: &str = "wal.log.bin";
/// Value heap file name inside the home directory.
pub const HEAP_FILE_NAME: &str = "data.bin";

/// Tunables for an [`Engine`](crate::Engine) instance.
///
/// `Config::default()` matches the reference behavior; individual options
/// are adjusted through the `with_*` builders:
///
/// ```
/// use engine::Config;
///
/// let config = Config::default()
///     .with_memtable_size_threshold(10_000)
///     .with_compaction_threshold(4);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum key length in bytes; keys are stored padded to this width.
    pub key_size: u32,
    /// Number of distinct memtable keys that triggers a flush.
    pub memtable_size_threshold: u32,
    /// Raw-table count above which compaction folds them into a level.
    pub compaction_threshold: u32,
    /// File-name prefix for raw sorted tables.
    pub sst_prefix: String,
    /// File-name prefix for compacted level tables.
    pub level_prefix: String,
    /// Target false-positive rate for each table's bloom filter.
    pub bloom_false_positive_rate: f64,
    /// Fsync the WAL on every append. Off by default: appends then survive
    /// process crashes but not power loss.
    pub wal_sync: bool,
    /// Which memtable implementation to use.
    pub memtable: MemtableKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_size: 256,
            memtable_size_threshold: 1000,
            compaction_threshold: 10,
            sst_prefix: "sst_".to_string(),
            level_prefix: "lvl_".to_string(),
            bloom_false_positive_rate: 0.01,
            wal_sync: false,
            memtable: MemtableKind::default(),
        }
    }
}

impl Config {
    pub fn with_key_size(mut self, value: u32) -> Self {
        self.key_size = value;
        self
    }

    pub fn with_memtable_size_threshold(mut self, value: u32) -> Self {
        self.memtable_size_threshold = value;
        self
    }

    pub fn with_compaction_threshold(mut self, value: u32) -> Self {
        self.compaction_threshold = value;
        self
    }

    pub fn with_sst_prefix(mut self, value: impl Into<String>) -> Self {
        self.sst_prefix = value.into();
        self
    }

    pub fn with_level_prefix(mut self, value: impl Into<String>) -> Self {
        self.level_prefix = value.into();
        self
    }

    pub fn with_bloom_false_positive_rate(mut self, value: f64) -> Self {
        self.bloom_false_positive_rate = value;
        self
    }

    pub fn with_wal_sync(mut self, value: bool) -> Self {
        self.wal_sync = value;
        self
    }

    pub fn with_memtable(mut self, value: MemtableKind) -> Self {
        self.memtable = value;
        self
    }
}
