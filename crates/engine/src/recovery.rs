//! Cold-start recovery: home-directory scan and WAL replay.

use crate::config::Config;
use crate::heap::ValueHeap;
use crate::index::{IndexManager, TableSet};
use codec::{Position, Result};
use sstable::SsTable;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use wal::Wal;

/// Scans the home directory and opens every sorted table it holds.
///
/// A file participates when its name starts with the raw or level prefix
/// and the rest parses as a serial number; everything else is ignored.
/// Dispatch into the raw or level list follows the `is_level` flag in the
/// file's own metadata, not the prefix, and the serial counters resume
/// from the highest serial seen per kind.
pub(crate) fn load_tables(home: &Path, config: &Config) -> Result<TableSet> {
    remove_stale_tmp_files(home, config);

    let mut set = TableSet {
        raws: Vec::new(),
        levels: Vec::new(),
        raw_serial: 0,
        level_serial: 0,
    };

    for entry in fs::read_dir(home)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        let serial_suffix = name
            .strip_prefix(&config.sst_prefix)
            .or_else(|| name.strip_prefix(&config.level_prefix));
        let Some(serial_suffix) = serial_suffix else {
            continue;
        };
        if serial_suffix.parse::<u32>().is_err() {
            warn!("ignoring file with non-numeric serial: {name}");
            continue;
        }

        let table = SsTable::open(&entry.path(), config.key_size)?;
        info!(
            serial = table.serial(),
            pairs = table.meta().pair_count,
            is_level = table.is_level(),
            "recovered table {name}"
        );
        if table.is_level() {
            set.level_serial = set.level_serial.max(table.serial());
            set.levels.push(table);
        } else {
            set.raw_serial = set.raw_serial.max(table.serial());
            set.raws.push(table);
        }
    }

    set.sort();
    Ok(set)
}

/// Removes `.tmp` leftovers of table writes that were interrupted before
/// their rename.
fn remove_stale_tmp_files(home: &Path, config: &Config) {
    let Ok(entries) = fs::read_dir(home) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(".tmp")
            && (name.starts_with(&config.sst_prefix) || name.starts_with(&config.level_prefix))
        {
            warn!("removing stale table file: {name}");
            let _ = fs::remove_file(entry.path());
        }
    }
}

/// Replays the WAL into the memtable, re-storing each value in the heap.
///
/// The positions the pre-crash memtable held died with it, so every
/// replayed value is appended to the heap again and indexed at its new
/// position. Entries apply in write order; the memtable's last-writer-wins
/// insert reproduces the pre-crash view. Nothing is re-appended to the
/// WAL, whose records are already on disk.
pub(crate) fn replay_wal(wal: &Wal, heap: &ValueHeap, index: &IndexManager) -> Result<usize> {
    let entries = wal.replay()?;
    let count = entries.len();

    for entry in entries {
        if entry.is_tombstone() {
            index.apply_replayed(&entry.key, Position::TOMBSTONE);
        } else {
            let pos = heap.store(&entry.value)?;
            index.apply_replayed(&entry.key, pos);
        }
    }

    if count > 0 {
        info!(entries = count, "replayed write-ahead log");
    }
    Ok(count)
}
