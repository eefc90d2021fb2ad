use crate::{pair_stride, SsTable, TableMeta};
use anyhow::Result;
use codec::Position;
use std::fs;
use tempfile::tempdir;

const KEY_SIZE: u32 = 32;
const FPR: f64 = 0.01;

fn sample_pairs() -> Vec<(Vec<u8>, Position)> {
    vec![
        (b"apple".to_vec(), Position::new(0, 5)),
        (b"banana".to_vec(), Position::new(5, 6)),
        (b"cherry".to_vec(), Position::TOMBSTONE),
        (b"damson".to_vec(), Position::new(11, 4)),
    ]
}

// -------------------- Create & reopen --------------------

#[test]
fn create_then_reopen_preserves_metadata() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");

    let table = SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;
    assert_eq!(table.serial(), 1);
    assert!(!table.is_level());

    let reopened = SsTable::open(&path, KEY_SIZE)?;
    let meta = reopened.meta();
    assert_eq!(meta.serial, 1);
    assert!(!meta.is_level);
    assert_eq!(meta.pair_count, 4);
    assert_eq!(meta.min_key, b"apple".to_vec());
    assert_eq!(meta.max_key, b"damson".to_vec());
    Ok(())
}

#[test]
fn level_flag_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("lvl_7");

    SsTable::create(&path, KEY_SIZE, FPR, true, 7, &sample_pairs())?;
    let reopened = SsTable::open(&path, KEY_SIZE)?;
    assert!(reopened.is_level());
    assert_eq!(reopened.serial(), 7);
    Ok(())
}

#[test]
fn create_rejects_empty_pairs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sst_1");
    assert!(SsTable::create(&path, KEY_SIZE, FPR, false, 1, &[]).is_err());
    assert!(!path.exists());
}

#[test]
fn create_leaves_no_tmp_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let names: Vec<String> = fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["sst_1".to_string()]);
    Ok(())
}

// -------------------- On-disk layout --------------------

#[test]
fn file_layout_matches_header_arithmetic() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_3");

    let pairs = sample_pairs();
    SsTable::create(&path, KEY_SIZE, FPR, false, 3, &pairs)?;

    let bytes = fs::read(&path)?;

    // Flag byte, then serial/pair_count/filter_size as u32 LE.
    assert_eq!(bytes[0], 0x00);
    assert_eq!(u32::from_le_bytes(bytes[1..5].try_into()?), 3);
    assert_eq!(u32::from_le_bytes(bytes[5..9].try_into()?), 4);
    let filter_size = u32::from_le_bytes(bytes[9..13].try_into()?) as usize;

    // Padded boundary keys.
    let k = KEY_SIZE as usize;
    assert_eq!(&bytes[13..13 + 5], b"apple");
    assert_eq!(&bytes[13 + k..13 + k + 6], b"damson");

    // Total size: header + filter + pairs.
    let header = TableMeta::encoded_len(KEY_SIZE) as usize;
    let expected = header + filter_size + pairs.len() * pair_stride(KEY_SIZE) as usize;
    assert_eq!(bytes.len(), expected);

    // First pair sits right after the filter: padded key then offset/size.
    let p0 = header + filter_size;
    assert_eq!(&bytes[p0..p0 + 5], b"apple");
    assert_eq!(u32::from_le_bytes(bytes[p0 + k..p0 + k + 4].try_into()?), 0);
    assert_eq!(
        u32::from_le_bytes(bytes[p0 + k + 4..p0 + k + 8].try_into()?),
        5
    );
    Ok(())
}

#[test]
fn level_flag_byte_is_ff() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("lvl_1");
    SsTable::create(&path, KEY_SIZE, FPR, true, 1, &sample_pairs())?;
    let bytes = fs::read(&path)?;
    assert_eq!(bytes[0], 0xFF);
    Ok(())
}

// -------------------- keys() / items() --------------------

#[test]
fn keys_skips_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    let table = SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let keys = table.keys()?;
    assert_eq!(
        keys,
        vec![b"apple".to_vec(), b"banana".to_vec(), b"damson".to_vec()]
    );
    Ok(())
}

#[test]
fn items_keeps_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    let table = SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let items = table.items()?;
    assert_eq!(items.len(), 4);
    assert_eq!(items[2].0, b"cherry".to_vec());
    assert!(items[2].1.is_tombstone());

    // Ascending order is preserved.
    for window in items.windows(2) {
        assert!(window[0].0 < window[1].0);
    }
    Ok(())
}

// -------------------- Corruption --------------------

#[test]
fn open_rejects_unknown_flag_byte() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let mut bytes = fs::read(&path)?;
    bytes[0] = 0x42;
    fs::write(&path, &bytes)?;

    assert!(SsTable::open(&path, KEY_SIZE).is_err());
    Ok(())
}

#[test]
fn open_rejects_serial_zero() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let mut bytes = fs::read(&path)?;
    bytes[1..5].copy_from_slice(&0u32.to_le_bytes());
    fs::write(&path, &bytes)?;

    assert!(SsTable::open(&path, KEY_SIZE).is_err());
    Ok(())
}

#[test]
fn open_rejects_truncated_header() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    fs::write(&path, [0u8; 10])?;
    assert!(SsTable::open(&path, KEY_SIZE).is_err());
    Ok(())
}

#[test]
fn open_rejects_truncated_filter() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let bytes = fs::read(&path)?;
    let header = TableMeta::encoded_len(KEY_SIZE) as usize;
    fs::write(&path, &bytes[..header + 3])?;

    assert!(SsTable::open(&path, KEY_SIZE).is_err());
    Ok(())
}

#[test]
fn items_reports_truncated_pair_section() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sst_1");
    SsTable::create(&path, KEY_SIZE, FPR, false, 1, &sample_pairs())?;

    let bytes = fs::read(&path)?;
    fs::write(&path, &bytes[..bytes.len() - 4])?;

    let table = SsTable::open(&path, KEY_SIZE)?;
    assert!(table.items().is_err());
    Ok(())
}
