//! On-disk embedding snapshot keyed by project fingerprint
//!
//! One binary artifact per project under
//! `${cache_root}/${fingerprint}/embeddings.bin`. The format is a
//! length-prefixed header followed by one entry per embedding; all
//! integers little-endian. Schema bumps are hard breaks: an unknown
//! `schema_version` refuses to load. Persistence is a reload-after-crash
//! cache rather than a transaction log; in-memory state stays
//! authoritative.

use crate::embed::ModelInfo;
use crate::error::{CoreError, CoreResult};
use crate::model::{NodeId, NodeKey, NodeKind};
use crate::symbols::SymbolTable;
use crate::tracker::{FileTracker, TrackerSnapshot};
use crate::vector::VectorIndex;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

pub const SCHEMA_VERSION: u32 = 1;
pub const ARTIFACT_NAME: &str = "embeddings.bin";

/// First 16 hex chars of SHA-256 over the absolute project root path.
/// Guarantees per-project isolation of cache artifacts.
pub fn project_fingerprint(root: &Path) -> String {
    let absolute = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheHeader {
    pub schema_version: u32,
    pub model_id: String,
    pub model_repo: String,
    pub dims: u32,
    pub timestamp: u64,
    pub entity_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearScope {
    CurrentProject,
    All,
    OlderThan { days: u64 },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub header: Option<CacheHeader>,
    /// Whether a load with the current model would succeed.
    pub valid: bool,
}

/// Persists the vector index (plus the file-tracker snapshot) across
/// process restarts, validating compatibility before reuse.
pub struct EmbeddingCache {
    symbols: Arc<SymbolTable>,
    cache_root: PathBuf,
    project_root: PathBuf,
    dirty: AtomicBool,
}

impl EmbeddingCache {
    pub fn new(symbols: Arc<SymbolTable>, cache_root: PathBuf, project_root: PathBuf) -> Self {
        EmbeddingCache {
            symbols,
            cache_root,
            project_root,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn project_dir(&self) -> PathBuf {
        self.cache_root.join(project_fingerprint(&self.project_root))
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.project_dir().join(ARTIFACT_NAME)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Clear-and-return the dirty flag; used by the periodic save policy.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }

    /// Serialize the index and tracker atomically (temp file + rename).
    pub fn save(
        &self,
        index: &VectorIndex,
        tracker: &FileTracker,
        model: &ModelInfo,
    ) -> CoreResult<PathBuf> {
        let dir = self.project_dir();
        fs::create_dir_all(&dir)?;
        let path = self.artifact_path();
        let tmp = dir.join(format!("{ARTIFACT_NAME}.tmp"));

        let tracker_blob = bincode::serialize(&tracker.export())
            .map_err(|e| CoreError::Internal(format!("tracker snapshot encode: {e}")))?;

        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            write_u32(&mut w, SCHEMA_VERSION)?;
            write_bytes(&mut w, model.id.as_bytes())?;
            write_bytes(&mut w, model.repo.as_bytes())?;
            write_u32(&mut w, model.dims as u32)?;
            write_u64(&mut w, unix_now())?;
            write_u64(&mut w, index.size() as u64)?;
            write_bytes(&mut w, &tracker_blob)?;

            for (key, record) in index.entries_sorted() {
                w.write_all(&[key.kind.wire_tag()])?;
                write_bytes(&mut w, key.id.render(&self.symbols).as_bytes())?;
                for value in &record.vector {
                    w.write_all(&value.to_le_bytes())?;
                }
                write_bytes(&mut w, record.source_text.as_bytes())?;
            }
            w.flush()?;
        }
        fs::rename(&tmp, &path)?;
        self.dirty.store(false, Ordering::Relaxed);
        debug!(path = %path.display(), entries = index.size(), "embedding cache saved");
        Ok(path)
    }

    /// Validate and load the artifact into the index and tracker. On any
    /// refusal the index is left empty. Returns the number of entries
    /// loaded.
    pub fn load(
        &self,
        index: &mut VectorIndex,
        tracker: &mut FileTracker,
        model: &ModelInfo,
    ) -> CoreResult<usize> {
        let path = self.artifact_path();
        if !path.exists() {
            return Err(CoreError::NotFound(path.display().to_string()));
        }
        let mut r = BufReader::new(File::open(&path)?);

        let schema = read_u32(&mut r)?;
        if schema != SCHEMA_VERSION {
            return Err(CoreError::Incompatible(format!(
                "cache schema_version {schema}, expected {SCHEMA_VERSION}"
            )));
        }
        let model_id = read_string(&mut r)?;
        let _model_repo = read_string(&mut r)?;
        let dims = read_u32(&mut r)? as usize;
        let _timestamp = read_u64(&mut r)?;
        let entity_count = read_u64(&mut r)? as usize;
        let tracker_blob = read_bytes(&mut r)?;

        if !model.accepts(&model_id, dims) {
            return Err(CoreError::Incompatible(format!(
                "cache built with model `{model_id}` ({dims} dims), \
                 current model `{}` ({} dims)",
                model.id, model.dims
            )));
        }

        let snapshot: TrackerSnapshot = bincode::deserialize(&tracker_blob)
            .map_err(|e| CoreError::Corrupted(format!("tracker snapshot decode: {e}")))?;

        index.reset_model(&model.id, model.dims);
        for _ in 0..entity_count {
            match self.read_entry(&mut r, dims) {
                Ok((key, vector, source_text)) => {
                    index.upsert(key, vector, source_text)?;
                }
                Err(e) => {
                    // Half-loaded state would violate the load contract.
                    index.clear();
                    return Err(e);
                }
            }
        }
        // Trailing garbage means a writer bug or a truncated rename.
        let mut probe = [0u8; 1];
        if r.read(&mut probe)? != 0 {
            index.clear();
            return Err(CoreError::Corrupted("trailing bytes after last entry".into()));
        }

        tracker.import(snapshot);
        self.dirty.store(false, Ordering::Relaxed);
        debug!(path = %path.display(), entries = entity_count, "embedding cache loaded");
        Ok(entity_count)
    }

    fn read_entry(
        &self,
        r: &mut impl Read,
        dims: usize,
    ) -> CoreResult<(NodeKey, Vec<f32>, String)> {
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)
            .map_err(|e| CoreError::Corrupted(format!("entry tag: {e}")))?;
        let kind = NodeKind::from_wire_tag(tag[0])
            .ok_or_else(|| CoreError::Corrupted(format!("unknown node kind tag {}", tag[0])))?;
        let id_raw = read_string(r)?;
        let id = NodeId::parse(kind, &id_raw, &self.symbols)
            .map_err(|e| CoreError::Corrupted(format!("entry id `{id_raw}`: {e}")))?;

        let mut vector = Vec::with_capacity(dims);
        let mut buf = [0u8; 4];
        for _ in 0..dims {
            r.read_exact(&mut buf)
                .map_err(|e| CoreError::Corrupted(format!("entry vector: {e}")))?;
            vector.push(f32::from_le_bytes(buf));
        }
        let source_text = read_string(r)?;
        Ok((NodeKey { kind, id }, vector, source_text))
    }

    /// Remove cached artifacts. Returns the number of project directories
    /// deleted.
    pub fn clear(&self, scope: ClearScope) -> CoreResult<usize> {
        match scope {
            ClearScope::CurrentProject => {
                let dir = self.project_dir();
                if dir.exists() {
                    fs::remove_dir_all(&dir)?;
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            ClearScope::All => {
                let mut removed = 0;
                for entry in read_subdirs(&self.cache_root)? {
                    fs::remove_dir_all(&entry)?;
                    removed += 1;
                }
                Ok(removed)
            }
            ClearScope::OlderThan { days } => {
                let cutoff = unix_now().saturating_sub(days * 24 * 60 * 60);
                let mut removed = 0;
                for dir in read_subdirs(&self.cache_root)? {
                    let artifact = dir.join(ARTIFACT_NAME);
                    let stale = match artifact_timestamp(&artifact) {
                        Some(ts) => ts < cutoff,
                        // No readable artifact: treat the directory as stale.
                        None => true,
                    };
                    if stale {
                        fs::remove_dir_all(&dir)?;
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    /// Inspect the on-disk artifact without loading it.
    pub fn stats(&self, model: &ModelInfo) -> CacheStats {
        let path = self.artifact_path();
        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let header = read_header(&path).ok();
        let valid = header.as_ref().is_some_and(|h| {
            h.schema_version == SCHEMA_VERSION && model.accepts(&h.model_id, h.dims as usize)
        });
        CacheStats {
            path,
            size_bytes,
            header,
            valid,
        }
    }
}

fn read_header(path: &Path) -> CoreResult<CacheHeader> {
    let mut r = BufReader::new(File::open(path)?);
    let schema_version = read_u32(&mut r)?;
    let model_id = read_string(&mut r)?;
    let model_repo = read_string(&mut r)?;
    let dims = read_u32(&mut r)?;
    let timestamp = read_u64(&mut r)?;
    let entity_count = read_u64(&mut r)?;
    Ok(CacheHeader {
        schema_version,
        model_id,
        model_repo,
        dims,
        timestamp,
        entity_count,
    })
}

fn artifact_timestamp(path: &Path) -> Option<u64> {
    read_header(path).ok().map(|h| h.timestamp)
}

fn read_subdirs(root: &Path) -> CoreResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("unreadable cache entry: {e}");
                continue;
            }
        };
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

// Max length accepted for any length-prefixed field; a corrupt prefix
// must not trigger a giant allocation.
const MAX_FIELD_LEN: u32 = 64 * 1024 * 1024;

fn write_u32(w: &mut impl Write, value: u32) -> CoreResult<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u64(w: &mut impl Write, value: u64) -> CoreResult<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_bytes(w: &mut impl Write, bytes: &[u8]) -> CoreResult<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_u32(r: &mut impl Read) -> CoreResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|e| CoreError::Corrupted(format!("short read: {e}")))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> CoreResult<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|e| CoreError::Corrupted(format!("short read: {e}")))?;
    Ok(u64::from_le_bytes(buf))
}

fn read_bytes(r: &mut impl Read) -> CoreResult<Vec<u8>> {
    let len = read_u32(r)?;
    if len > MAX_FIELD_LEN {
        return Err(CoreError::Corrupted(format!("field length {len} exceeds cap")));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)
        .map_err(|e| CoreError::Corrupted(format!("short read: {e}")))?;
    Ok(buf)
}

fn read_string(r: &mut impl Read) -> CoreResult<String> {
    String::from_utf8(read_bytes(r)?)
        .map_err(|e| CoreError::Corrupted(format!("invalid utf-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::embed::Embedder;

    fn fixture(dims: usize) -> (tempfile::TempDir, EmbeddingCache, VectorIndex, FileTracker, ModelInfo) {
        let tmp = tempfile::tempdir().unwrap();
        let symbols = Arc::new(SymbolTable::new());
        let model = HashEmbedder::new(dims).info().clone();
        let index = VectorIndex::new(symbols.clone(), &model.id, dims);
        let cache = EmbeddingCache::new(
            symbols,
            tmp.path().join("cache"),
            tmp.path().join("project"),
        );
        (tmp, cache, index, FileTracker::new(), model)
    }

    fn seeded_vector(dims: usize, seed: f32) -> Vec<f32> {
        (0..dims).map(|i| ((i as f32 + seed) * 0.37).sin()).collect()
    }

    #[test]
    fn fingerprint_is_short_stable_hex() {
        let fp = project_fingerprint(Path::new("/some/project"));
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, project_fingerprint(Path::new("/some/project")));
        assert_ne!(fp, project_fingerprint(Path::new("/other/project")));
    }

    #[test]
    fn save_load_round_trips_exactly() {
        let (_tmp, cache, mut index, mut tracker, model) = fixture(32);
        let symbols = index_symbols(&cache);
        for i in 0..10 {
            let key = NodeKey::function(&symbols, "m", &format!("f{i}"), i);
            index
                .upsert(key, seeded_vector(32, i as f32), format!("source {i}"))
                .unwrap();
        }
        tracker.observe(Path::new("src/m.rs"), b"fn f() {}");

        cache.save(&index, &tracker, &model).unwrap();

        let mut restored = VectorIndex::new(index_symbols(&cache), &model.id, 32);
        let mut tracker2 = FileTracker::new();
        let loaded = cache.load(&mut restored, &mut tracker2, &model).unwrap();

        assert_eq!(loaded, 10);
        assert_eq!(restored.size(), index.size());
        assert_eq!(tracker2.len(), 1);
        for (key, record) in index.entries_sorted() {
            let got = restored.get(key).expect("restored entry");
            assert_eq!(got.source_text, record.source_text);
            assert_eq!(got.vector, record.vector);
        }
    }

    #[test]
    fn model_mismatch_refuses_and_leaves_index_empty() {
        let (_tmp, cache, mut index, mut tracker, model) = fixture(16);
        let symbols = index_symbols(&cache);
        let key = NodeKey::module(&symbols, "m");
        index.upsert(key, seeded_vector(16, 1.0), "m".into()).unwrap();
        cache.save(&index, &tracker, &model).unwrap();

        let other = HashEmbedder::new(24).info().clone();
        let mut fresh = VectorIndex::new(index_symbols(&cache), &other.id, 24);
        let err = cache.load(&mut fresh, &mut tracker, &other).unwrap_err();
        assert_eq!(err.kind(), "incompatible");
        assert_eq!(fresh.size(), 0);
        assert!(!cache.stats(&other).valid);
        assert!(cache.stats(&model).valid);
    }

    fn index_symbols(cache: &EmbeddingCache) -> Arc<SymbolTable> {
        cache.symbols.clone()
    }

    #[test]
    fn truncated_artifact_is_corrupted() {
        let (_tmp, cache, mut index, mut tracker, model) = fixture(8);
        let symbols = index_symbols(&cache);
        index
            .upsert(NodeKey::module(&symbols, "m"), seeded_vector(8, 0.0), "m".into())
            .unwrap();
        cache.save(&index, &tracker, &model).unwrap();

        let path = cache.artifact_path();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let mut fresh = VectorIndex::new(index_symbols(&cache), &model.id, 8);
        let err = cache.load(&mut fresh, &mut tracker, &model).unwrap_err();
        assert_eq!(err.kind(), "corrupted");
        assert_eq!(fresh.size(), 0);
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let (_tmp, cache, mut index, mut tracker, model) = fixture(8);
        let err = cache.load(&mut index, &mut tracker, &model).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn clear_scopes() {
        let (_tmp, cache, index, tracker, model) = fixture(8);
        cache.save(&index, &tracker, &model).unwrap();
        assert!(cache.artifact_path().exists());

        assert_eq!(cache.clear(ClearScope::CurrentProject).unwrap(), 1);
        assert!(!cache.artifact_path().exists());
        assert_eq!(cache.clear(ClearScope::CurrentProject).unwrap(), 0);

        cache.save(&index, &tracker, &model).unwrap();
        assert_eq!(cache.clear(ClearScope::All).unwrap(), 1);

        cache.save(&index, &tracker, &model).unwrap();
        // A fresh artifact is younger than any cutoff.
        assert_eq!(cache.clear(ClearScope::OlderThan { days: 1 }).unwrap(), 0);
        assert!(cache.artifact_path().exists());
    }

    #[test]
    fn dirty_flag_cycles() {
        let (_tmp, cache, index, tracker, model) = fixture(8);
        assert!(!cache.is_dirty());
        cache.mark_dirty();
        assert!(cache.is_dirty());
        cache.save(&index, &tracker, &model).unwrap();
        assert!(!cache.is_dirty());
        cache.mark_dirty();
        assert!(cache.take_dirty());
        assert!(!cache.is_dirty());
    }
}
