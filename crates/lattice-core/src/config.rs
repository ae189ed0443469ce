//! Engine configuration with environment overlays

use std::path::PathBuf;
use std::time::Duration;

/// PageRank parameters.
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    pub damping: f64,
    pub max_iterations: usize,
    /// Convergence tolerance on the L1 norm of the score vector.
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        PageRankConfig {
            damping: 0.85,
            max_iterations: 50,
            tolerance: 1e-4,
        }
    }
}

/// Engine-wide configuration. Built from defaults, overlaid with
/// environment variables, then with CLI flags by the binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Absolute project root; also the fingerprint input for the
    /// per-project cache directory.
    pub project_root: PathBuf,
    /// Base cache directory, `${XDG_CACHE_HOME:-~/.cache}/lattice`.
    pub cache_root: PathBuf,
    pub cache_enabled: bool,
    /// Active embedding model identity, e.g. `feature-hash-384`.
    pub model: String,
    /// Similarity floor for pure semantic search.
    pub semantic_threshold: f32,
    /// Recall-oriented floor for the dense stage of hybrid search.
    pub hybrid_threshold: f32,
    /// Reciprocal-rank fusion constant.
    pub rrf_k: f32,
    /// Dense-stage over-fetch multiplier applied to the final k.
    pub overfetch: usize,
    /// Bound on query-expansion output.
    pub max_expansion_terms: usize,
    /// Bounded embedding worker pool size.
    pub embed_workers: usize,
    /// Deadline for a single embedding call.
    pub embed_timeout: Duration,
    pub pagerank: PageRankConfig,
    /// Node budget for Brandes' betweenness; larger graphs yield a
    /// truncated result flagged `partial`.
    pub betweenness_budget: usize,
    /// Fan-out above which path enumeration attaches a soft warning.
    pub path_warn_fanout: usize,
    /// Cosine floor for `find_duplicates`.
    pub duplicate_threshold: f32,
    /// Trailing debounce window for the filesystem watcher.
    pub debounce: Duration,
    /// Project roots ingested at startup (`AUTO_ANALYZE_DIRS`).
    pub auto_analyze_dirs: Vec<PathBuf>,
}

impl EngineConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        EngineConfig {
            project_root: project_root.into(),
            cache_root: default_cache_root(),
            cache_enabled: true,
            model: "feature-hash-384".to_string(),
            semantic_threshold: 0.20,
            hybrid_threshold: 0.15,
            rrf_k: 60.0,
            overfetch: 4,
            max_expansion_terms: 12,
            embed_workers: 4,
            embed_timeout: Duration::from_secs(30),
            pagerank: PageRankConfig::default(),
            betweenness_budget: 10_000,
            path_warn_fanout: 256,
            duplicate_threshold: 0.92,
            debounce: Duration::from_millis(200),
            auto_analyze_dirs: Vec::new(),
        }
    }

    /// Overlay recognized environment variables onto `self`.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if let Ok(dirs) = std::env::var("AUTO_ANALYZE_DIRS") {
            self.auto_analyze_dirs = dirs
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Ok(flag) = std::env::var("CACHE_ENABLED") {
            self.cache_enabled = !matches!(flag.as_str(), "0" | "false" | "no" | "off");
        }
        // XDG_CACHE_HOME is re-read so a changed environment wins over
        // the constructor default.
        self.cache_root = default_cache_root();
        self
    }
}

/// `${XDG_CACHE_HOME:-~/.cache}/lattice`
pub fn default_cache_root() -> PathBuf {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"));
    base.join("lattice")
}
