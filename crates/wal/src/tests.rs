use super::*;
use std::fs;
use tempfile::tempdir;

const KEY_SIZE: u32 = 32;

fn open_wal(path: &Path) -> Wal {
    Wal::open(path, KEY_SIZE, false).unwrap()
}

// -------------------- Basic append & replay --------------------

#[test]
fn append_and_replay_in_write_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::put(&b"k1"[..], &b"v1"[..])).unwrap();
    wal.append(&WalEntry::put(&b"k2"[..], &b"v2"[..])).unwrap();
    wal.append(&WalEntry::delete(&b"k1"[..])).unwrap();

    let entries = wal.replay().unwrap();
    assert_eq!(
        entries,
        vec![
            WalEntry::put(&b"k1"[..], &b"v1"[..]),
            WalEntry::put(&b"k2"[..], &b"v2"[..]),
            WalEntry::delete(&b"k1"[..]),
        ]
    );
    assert!(entries[2].is_tombstone());
}

#[test]
fn replay_keeps_duplicate_keys() {
    let dir = tempdir().unwrap();
    let wal = open_wal(&dir.path().join("wal.log.bin"));

    wal.append(&WalEntry::put(&b"k"[..], &b"v1"[..])).unwrap();
    wal.append(&WalEntry::put(&b"k"[..], &b"v2"[..])).unwrap();

    // Dedup is the replay consumer's job; the log reports what happened.
    let entries = wal.replay().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].value, b"v2");
}

#[test]
fn replay_empty_log() {
    let dir = tempdir().unwrap();
    let wal = open_wal(&dir.path().join("wal.log.bin"));
    assert!(wal.replay().unwrap().is_empty());
}

#[test]
fn replay_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    {
        let wal = open_wal(&path);
        wal.append(&WalEntry::put(&b"a"[..], &b"1"[..])).unwrap();
    }

    let wal = open_wal(&path);
    let entries = wal.replay().unwrap();
    assert_eq!(entries, vec![WalEntry::put(&b"a"[..], &b"1"[..])]);
}

// -------------------- Record layout --------------------

#[test]
fn record_is_padded_key_plus_len_plus_value() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::put(&b"ab"[..], &b"xyz"[..])).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), KEY_SIZE as usize + 4 + 3);
    assert_eq!(&bytes[..2], b"ab");
    assert!(bytes[2..KEY_SIZE as usize].iter().all(|&b| b == 0));
    let value_len =
        u32::from_le_bytes(bytes[KEY_SIZE as usize..KEY_SIZE as usize + 4].try_into().unwrap());
    assert_eq!(value_len, 3);
    assert_eq!(&bytes[KEY_SIZE as usize + 4..], b"xyz");
}

#[test]
fn tombstone_record_has_zero_value_len() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::delete(&b"gone"[..])).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), KEY_SIZE as usize + 4);
    let value_len =
        u32::from_le_bytes(bytes[KEY_SIZE as usize..KEY_SIZE as usize + 4].try_into().unwrap());
    assert_eq!(value_len, 0);
}

#[test]
fn append_rejects_oversized_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    let big_key = vec![b'k'; KEY_SIZE as usize + 1];
    assert!(wal.append(&WalEntry::put(big_key, &b"v"[..])).is_err());

    // Nothing was written.
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

// -------------------- Truncated tail --------------------

#[test]
fn short_tail_in_key_is_clean_eof() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::put(&b"ok"[..], &b"v"[..])).unwrap();

    // Simulate a crash mid-append: a few bytes of the next key.
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(b"part");
    fs::write(&path, &bytes).unwrap();

    let entries = wal.replay().unwrap();
    assert_eq!(entries, vec![WalEntry::put(&b"ok"[..], &b"v"[..])]);
}

#[test]
fn short_tail_in_value_is_clean_eof() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::put(&b"ok"[..], &b"v"[..])).unwrap();

    // Full key + length announcing 100 bytes, but only 3 present.
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[b'x'; KEY_SIZE as usize]);
    bytes.extend_from_slice(&100u32.to_le_bytes());
    bytes.extend_from_slice(b"abc");
    fs::write(&path, &bytes).unwrap();

    let entries = wal.replay().unwrap();
    assert_eq!(entries.len(), 1);
}

// -------------------- Clear --------------------

#[test]
fn clear_truncates_to_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::put(&b"k"[..], &b"v"[..])).unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 0);

    wal.clear().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    assert!(wal.replay().unwrap().is_empty());
}

#[test]
fn append_after_clear_starts_fresh() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = open_wal(&path);
    wal.append(&WalEntry::put(&b"old"[..], &b"1"[..])).unwrap();
    wal.clear().unwrap();
    wal.append(&WalEntry::put(&b"new"[..], &b"2"[..])).unwrap();

    let entries = wal.replay().unwrap();
    assert_eq!(entries, vec![WalEntry::put(&b"new"[..], &b"2"[..])]);
}

// -------------------- Sync mode --------------------

#[test]
fn sync_mode_appends_are_replayable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log.bin");

    let wal = Wal::open(&path, KEY_SIZE, true).unwrap();
    wal.append(&WalEntry::put(&b"durable"[..], &b"yes"[..]))
        .unwrap();
    wal.sync_to_disk().unwrap();

    assert_eq!(wal.replay().unwrap().len(), 1);
}
