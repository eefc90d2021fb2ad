use crate::{Config, Engine};
use std::path::Path;
use std::time::Duration;

pub fn open_default(dir: &Path) -> Engine {
    Engine::open(dir, Config::default()).unwrap()
}

/// Counts home-directory files whose name starts with `prefix`.
pub fn count_prefixed_files(dir: &Path, prefix: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.starts_with(prefix))
                .unwrap_or(false)
        })
        .count()
}

pub fn wal_len(dir: &Path) -> u64 {
    std::fs::metadata(dir.join(crate::WAL_FILE_NAME))
        .map(|m| m.len())
        .unwrap_or(0)
}

/// Polls `cond` for up to two seconds. Used for effects of the background
/// flusher, which runs on its own thread.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    cond()
}
