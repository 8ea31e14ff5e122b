//! Temporary directory helpers for tests that write snapshots or configs.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// Writes `size` bytes to `dir/name` and backdates its modification time by `age`.
pub fn write_aged_file(dir: &Path, name: &str, size: usize, age: Duration) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; size]).expect("Failed to write test file");
    let mtime = SystemTime::now() - age;
    std::fs::File::options()
        .write(true)
        .open(&path)
        .and_then(|f| f.set_modified(mtime))
        .expect("Failed to set modification time");
    path
}

/// Hours as a `Duration`.
pub fn hours(h: u64) -> Duration {
    Duration::from_secs(h * 3600)
}
