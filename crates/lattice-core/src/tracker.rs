//! Per-file change tracking driving incremental reindex

use crate::model::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use xxhash_rust::xxh3::xxh3_64;

/// Outcome of observing a file's current content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Unchanged,
    New,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub content_hash: u64,
    /// Filesystem mtime in unix nanoseconds, when available. Exposed so
    /// external editors can do concurrent-modification checks. Nanosecond
    /// precision keeps the pre-filter honest for same-second rewrites.
    pub mtime: Option<i64>,
    pub language: Language,
    /// Unix seconds of the last successful ingest.
    pub last_ingested_at: i64,
}

/// Serializable tracker state, co-located with the embedding cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub files: HashMap<PathBuf, FileRecord>,
}

/// What `observe` saw: the change status plus the fields callers need
/// without a second stat.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub status: FileStatus,
    pub content_hash: u64,
    pub mtime: Option<i64>,
}

/// Tracks per-file content hashes and mtimes. Content hash (XXH3) is the
/// source of truth; mtime equality is only a cheap pre-filter.
#[derive(Debug, Default)]
pub struct FileTracker {
    files: HashMap<PathBuf, FileRecord>,
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `bytes` against the stored record for `path`, updating the
    /// record. Immediately re-observing the same bytes returns
    /// `Unchanged`.
    pub fn observe(&mut self, path: &Path, bytes: &[u8]) -> Observation {
        let mtime = read_mtime(path);
        let now = unix_now();

        if let Some(record) = self.files.get_mut(path) {
            if record.mtime.is_some() && record.mtime == mtime {
                return Observation {
                    status: FileStatus::Unchanged,
                    content_hash: record.content_hash,
                    mtime,
                };
            }
            let hash = xxh3_64(bytes);
            if hash == record.content_hash {
                record.mtime = mtime;
                return Observation {
                    status: FileStatus::Unchanged,
                    content_hash: hash,
                    mtime,
                };
            }
            record.content_hash = hash;
            record.mtime = mtime;
            record.language = Language::from_path(path);
            record.last_ingested_at = now;
            return Observation {
                status: FileStatus::Modified,
                content_hash: hash,
                mtime,
            };
        }

        let hash = xxh3_64(bytes);
        self.files.insert(
            path.to_path_buf(),
            FileRecord {
                content_hash: hash,
                mtime,
                language: Language::from_path(path),
                last_ingested_at: now,
            },
        );
        Observation {
            status: FileStatus::New,
            content_hash: hash,
            mtime,
        }
    }

    /// Drop the record for a deleted file.
    pub fn forget(&mut self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn export(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            files: self.files.clone(),
        }
    }

    pub fn import(&mut self, snapshot: TrackerSnapshot) {
        self.files = snapshot.files;
    }
}

fn read_mtime(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_then_unchanged_then_modified() {
        let mut tracker = FileTracker::new();
        let path = Path::new("virtual/lib.rs");

        let first = tracker.observe(path, b"fn foo() {}");
        assert_eq!(first.status, FileStatus::New);

        let second = tracker.observe(path, b"fn foo() {}");
        assert_eq!(second.status, FileStatus::Unchanged);
        assert_eq!(second.content_hash, first.content_hash);

        let third = tracker.observe(path, b"fn foo() {}\nfn bar() {}");
        assert_eq!(third.status, FileStatus::Modified);
        assert_ne!(third.content_hash, first.content_hash);
    }

    #[test]
    fn forget_makes_next_observe_new() {
        let mut tracker = FileTracker::new();
        let path = Path::new("virtual/lib.py");
        tracker.observe(path, b"def f(): pass");
        assert!(tracker.forget(path));
        assert!(!tracker.forget(path));
        assert_eq!(tracker.observe(path, b"def f(): pass").status, FileStatus::New);
    }

    #[test]
    fn export_import_round_trips() {
        let mut tracker = FileTracker::new();
        tracker.observe(Path::new("a.rs"), b"a");
        tracker.observe(Path::new("b.py"), b"b");

        let snapshot = tracker.export();
        let mut restored = FileTracker::new();
        restored.import(snapshot);

        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.get(Path::new("a.rs")).map(|r| r.content_hash),
            tracker.get(Path::new("a.rs")).map(|r| r.content_hash)
        );
    }

    #[test]
    fn language_recorded_from_extension() {
        let mut tracker = FileTracker::new();
        tracker.observe(Path::new("x/y.py"), b"pass");
        assert_eq!(tracker.get(Path::new("x/y.py")).unwrap().language, Language::Python);
    }

    #[test]
    fn mtime_prefilter_short_circuits_on_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.rs");
        std::fs::write(&path, "fn a() {}").unwrap();

        let mut tracker = FileTracker::new();
        assert_eq!(tracker.observe(&path, b"fn a() {}").status, FileStatus::New);
        // Same mtime, same bytes: pre-filter answers without hashing.
        let obs = tracker.observe(&path, b"fn a() {}");
        assert_eq!(obs.status, FileStatus::Unchanged);
        assert!(obs.mtime.is_some());
    }
}
