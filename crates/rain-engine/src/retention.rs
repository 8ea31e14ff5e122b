//! Snapshot directory retention.
//!
//! Bounds the debug snapshot directory by age, file count and total size.
//! Each pass removes the oldest files first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Limits applied to the snapshot directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Files older than this are removed first
    pub retention_hours: u64,
    /// Maximum number of files kept
    pub max_files: usize,
    /// Maximum total size in megabytes
    pub max_total_mb: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_hours: 12,
            max_files: 500,
            max_total_mb: 200,
        }
    }
}

impl RetentionPolicy {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_mb.saturating_mul(1024 * 1024)
    }
}

/// Statistics from a prune run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PruneStats {
    /// Removed for exceeding the retention age
    pub expired: usize,
    /// Removed to respect the file-count cap
    pub over_count: usize,
    /// Removed to respect the size cap
    pub over_size: usize,
    /// Bytes released by all passes
    pub bytes_freed: u64,
    /// Files left in the directory
    pub remaining: usize,
    /// Removals that failed
    pub delete_errors: usize,
}

impl PruneStats {
    pub fn removed(&self) -> usize {
        self.expired + self.over_count + self.over_size
    }
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

fn scan(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in fs::read_dir(dir)? {
        let Ok(item) = item else { continue };
        let Ok(meta) = item.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(Entry {
            path: item.path(),
            modified,
            size: meta.len(),
        });
    }
    entries.sort_by_key(|e| e.modified);
    Ok(entries)
}

fn remove(entry: &Entry, stats: &mut PruneStats) {
    match fs::remove_file(&entry.path) {
        Ok(()) => stats.bytes_freed += entry.size,
        Err(e) => {
            warn!(path = ?entry.path, error = %e, "Failed to delete snapshot");
            stats.delete_errors += 1;
        }
    }
}

/// Prune regular files in `dir` against `policy` as of `now`.
///
/// A missing directory is not an error. Failed removals are logged and the
/// file is treated as gone so one stuck file cannot stall the other passes.
pub fn prune_directory(dir: &Path, policy: &RetentionPolicy, now: SystemTime) -> io::Result<PruneStats> {
    let mut stats = PruneStats::default();
    if !dir.is_dir() {
        return Ok(stats);
    }

    // Oldest first throughout.
    let mut entries = scan(dir)?;

    let cutoff = now.checked_sub(policy.max_age()).unwrap_or(SystemTime::UNIX_EPOCH);
    let split = entries.partition_point(|e| e.modified < cutoff);
    for entry in entries.drain(..split) {
        remove(&entry, &mut stats);
        stats.expired += 1;
    }

    if entries.len() > policy.max_files {
        let overflow = entries.len() - policy.max_files;
        for entry in entries.drain(..overflow) {
            remove(&entry, &mut stats);
            stats.over_count += 1;
        }
    }

    let limit = policy.max_total_bytes();
    let mut total: u64 = entries.iter().map(|e| e.size).sum();
    let mut excess = 0;
    for entry in &entries {
        if total <= limit {
            break;
        }
        remove(entry, &mut stats);
        total -= entry.size;
        excess += 1;
    }
    entries.drain(..excess);
    stats.over_size = excess;
    stats.remaining = entries.len();

    if stats.removed() > 0 {
        info!(
            dir = ?dir,
            expired = stats.expired,
            over_count = stats.over_count,
            over_size = stats.over_size,
            bytes_freed = stats.bytes_freed,
            remaining = stats.remaining,
            "Pruned snapshot directory"
        );
    } else {
        debug!(dir = ?dir, remaining = stats.remaining, "Snapshot directory within limits");
    }
    Ok(stats)
}
