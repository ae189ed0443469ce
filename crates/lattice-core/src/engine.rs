//! The engine: owned components behind one services struct
//!
//! Constructed once at startup and shared behind `Arc`; every tool and
//! CLI operation goes through the typed API here. Components follow a
//! reader-writer discipline (`tokio::sync::RwLock`), long algorithms run
//! on blocking threads over cloned snapshots, and the lock order is
//! always store, then vectors, then tracker.

use crate::algo;
use crate::cache::{CacheStats, ClearScope, EmbeddingCache};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::embed::{Embedder, EmbeddingPool};
use crate::error::{CoreError, CoreResult};
use crate::ingest::{self, AnalyzerRegistry, DeferredEdge, FileAnalyzer};
use crate::model::{EdgeKind, NodeAttrs, NodeKey, NodeKind};
use crate::retrieval::{
    self, Candidate, SearchIntent, SearchResult, SearchStrategy, expand_query,
};
use crate::store::{GraphSnapshot, GraphStore};
use crate::symbols::SymbolTable;
use crate::tracker::{FileStatus, FileTracker};
use crate::vector::VectorIndex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A node rendered for the wire: canonical key plus attributes.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDescriptor {
    pub key: String,
    pub kind: NodeKind,
    pub attrs: NodeAttrs,
}

/// One scored node in an algorithm result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNode {
    pub key: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageRankReport {
    pub scores: Vec<ScoredNode>,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CentralityReport {
    pub scores: Vec<ScoredNode>,
    /// Set when a node budget truncated the computation.
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DegreeReport {
    pub key: String,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CyclesReport {
    pub cycles: Vec<Vec<String>>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathsReport {
    pub paths: Vec<Vec<String>>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentsReport {
    pub components: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub a: String,
    pub b: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicatesReport {
    pub pairs: Vec<DuplicatePair>,
    /// True when the candidate set was capped before the pairwise scan.
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadCodeEntry {
    pub key: String,
    pub attrs: NodeAttrs,
    /// `high` for private functions, `low` for public ones that may be
    /// called from outside the project.
    pub confidence: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub tracked_files: usize,
    pub embeddings: usize,
    pub model: String,
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: IngestStatus,
    pub nodes_upserted: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_skipped: usize,
    pub embedded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Ingested,
    Unchanged,
    /// No front-end claims this extension.
    Skipped,
}

/// Summary of a directory batch. Per-file failures are counted and
/// logged, never fatal to the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files_ingested: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub nodes_upserted: usize,
    pub edges_added: usize,
    pub deferred_edges_resolved: usize,
}

/// Search options shared by the semantic and hybrid entry points.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub k: usize,
    pub threshold: Option<f32>,
    pub intent: SearchIntent,
    pub strategy: SearchStrategy,
    pub kind: Option<NodeKind>,
}

pub struct Engine {
    config: EngineConfig,
    symbols: Arc<SymbolTable>,
    store: Arc<RwLock<GraphStore>>,
    vectors: Arc<RwLock<VectorIndex>>,
    tracker: Arc<RwLock<FileTracker>>,
    cache: EmbeddingCache,
    pool: EmbeddingPool,
    registry: Arc<AnalyzerRegistry>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn Embedder>,
        registry: Arc<AnalyzerRegistry>,
    ) -> Self {
        let symbols = Arc::new(SymbolTable::new());
        let model = embedder.info().clone();
        let store = GraphStore::new(symbols.clone());
        let vectors = VectorIndex::new(symbols.clone(), &model.id, model.dims);
        let cache = EmbeddingCache::new(
            symbols.clone(),
            config.cache_root.clone(),
            config.project_root.clone(),
        );
        let pool = EmbeddingPool::new(embedder, config.embed_workers, config.embed_timeout);
        Engine {
            config,
            symbols,
            store: Arc::new(RwLock::new(store)),
            vectors: Arc::new(RwLock::new(vectors)),
            tracker: Arc::new(RwLock::new(FileTracker::new())),
            cache,
            pool,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    // ── Ingest ───────────────────────────────────────────────

    /// Analyze and ingest a single file. Returns `Unchanged` without any
    /// graph work when the tracker sees identical content.
    pub async fn analyze_file(&self, path: &Path) -> CoreResult<FileReport> {
        let (report, deferred) = self.analyze_file_inner(path).await?;
        if !deferred.is_empty() {
            self.retry_deferred(deferred).await;
        }
        Ok(report)
    }

    async fn analyze_file_inner(
        &self,
        path: &Path,
    ) -> CoreResult<(FileReport, Vec<DeferredEdge>)> {
        let skipped = |path: &Path| FileReport {
            path: path.to_path_buf(),
            status: IngestStatus::Skipped,
            nodes_upserted: 0,
            nodes_removed: 0,
            edges_added: 0,
            edges_skipped: 0,
            embedded: 0,
        };
        let Some(analyzer) = self.registry.for_path(path) else {
            return Ok((skipped(path), Vec::new()));
        };

        let bytes = tokio::fs::read(path).await?;
        let observation = self.tracker.write().await.observe(path, &bytes);
        if observation.status == FileStatus::Unchanged {
            debug!(path = %path.display(), "content unchanged, skipping ingest");
            return Ok((
                FileReport {
                    status: IngestStatus::Unchanged,
                    ..skipped(path)
                },
                Vec::new(),
            ));
        }

        let payload = run_analyzer(analyzer, bytes, path.to_path_buf()).await?;

        // One write-lock scope per file batch: readers observe the
        // pre-batch or post-batch graph, nothing in between.
        let stats = {
            let mut store = self.store.write().await;
            let vectors = self.vectors.read().await;
            ingest::apply_analyzed_file(&mut store, &vectors, &payload)?
        };

        let embedded = self.run_embedding_jobs(stats.embedding_jobs).await;
        // Embeddings of removed nodes cascade out of the index.
        if !stats.removed_keys.is_empty() {
            let mut vectors = self.vectors.write().await;
            for key in &stats.removed_keys {
                vectors.remove(key);
            }
        }
        self.cache.mark_dirty();

        Ok((
            FileReport {
                path: path.to_path_buf(),
                status: IngestStatus::Ingested,
                nodes_upserted: stats.nodes_upserted,
                nodes_removed: stats.removed_keys.len(),
                edges_added: stats.edges_added,
                edges_skipped: stats.edges_skipped,
                embedded,
            },
            stats.deferred_edges,
        ))
    }

    /// Walk a directory (respecting ignore files) and ingest every file a
    /// front-end claims. Cross-file edges unresolved during their own
    /// file's batch are retried once the walk completes.
    pub async fn analyze_directory(&self, root: &Path, recursive: bool) -> CoreResult<BatchReport> {
        let mut report = BatchReport::default();
        let mut deferred: Vec<DeferredEdge> = Vec::new();

        let mut builder = ignore::WalkBuilder::new(root);
        if !recursive {
            builder.max_depth(Some(1));
        }
        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("walk error under {}: {e}", root.display());
                    report.files_failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            match self.analyze_file_inner(entry.path()).await {
                Ok((file_report, mut file_deferred)) => {
                    match file_report.status {
                        IngestStatus::Ingested => report.files_ingested += 1,
                        IngestStatus::Unchanged => report.files_unchanged += 1,
                        IngestStatus::Skipped => report.files_skipped += 1,
                    }
                    report.nodes_upserted += file_report.nodes_upserted;
                    report.edges_added += file_report.edges_added;
                    deferred.append(&mut file_deferred);
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "file ingest failed");
                    report.files_failed += 1;
                }
            }
        }

        report.deferred_edges_resolved = self.retry_deferred(deferred).await;
        info!(
            ingested = report.files_ingested,
            unchanged = report.files_unchanged,
            failed = report.files_failed,
            "directory batch complete"
        );
        Ok(report)
    }

    async fn retry_deferred(&self, deferred: Vec<DeferredEdge>) -> usize {
        if deferred.is_empty() {
            return 0;
        }
        let mut store = self.store.write().await;
        let mut resolved = 0;
        for edge in &deferred {
            if ingest::retry_deferred_edge(&mut store, edge) {
                resolved += 1;
            }
        }
        debug!(total = deferred.len(), resolved, "deferred edge retry");
        resolved
    }

    async fn run_embedding_jobs(&self, jobs: Vec<(NodeKey, String)>) -> usize {
        if jobs.is_empty() {
            return 0;
        }
        let (keys, texts): (Vec<NodeKey>, Vec<String>) = jobs.into_iter().unzip();
        let results = self.pool.embed_many(texts.clone()).await;
        let mut vectors = self.vectors.write().await;
        let mut embedded = 0;
        for ((key, text), result) in keys.into_iter().zip(texts).zip(results) {
            match result {
                Ok(vector) => match vectors.upsert(key, vector, text) {
                    Ok(()) => embedded += 1,
                    Err(e) => warn!(error = %e, "embedding upsert failed"),
                },
                Err(e) => warn!(error = %e, "embedding job failed"),
            }
        }
        embedded
    }

    /// Remove a deleted file: tracker record, derived nodes, their edges
    /// and embeddings.
    pub async fn remove_file(&self, path: &Path) -> CoreResult<usize> {
        self.tracker.write().await.forget(path);
        let removed_keys = {
            let mut store = self.store.write().await;
            let keys = store.nodes_in_file(path);
            for key in &keys {
                store.remove_node(key);
            }
            keys
        };
        let mut vectors = self.vectors.write().await;
        for key in &removed_keys {
            vectors.remove(key);
        }
        if !removed_keys.is_empty() {
            self.cache.mark_dirty();
        }
        debug!(path = %path.display(), removed = removed_keys.len(), "file removed");
        Ok(removed_keys.len())
    }

    // ── Search ───────────────────────────────────────────────

    /// Pure dense search: embed the raw query, scan the vector index.
    pub async fn semantic_search(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<SearchResult>> {
        let k = effective_k(opts.k);
        let threshold = opts.threshold.unwrap_or(self.config.semantic_threshold);
        let query_vector = self.pool.embed_cancellable(query, cancel).await?;
        let hits = self
            .vectors
            .read()
            .await
            .search(&query_vector, k, threshold, opts.kind)?;

        let store = self.store.read().await;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let attrs = store.find_node(&hit.key)?;
                Some(SearchResult {
                    key: hit.canonical,
                    kind: hit.key.kind,
                    attrs,
                    fused_score: hit.score,
                    boost: 1.0,
                    boosted_score: hit.score,
                    intent: opts.intent,
                })
            })
            .collect())
    }

    /// Full pipeline: expansion, dense + lexical candidates, RRF,
    /// metadata re-ranking.
    pub async fn hybrid_search(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<SearchResult>> {
        if opts.strategy == SearchStrategy::Semantic {
            return self.semantic_search(query, opts, cancel).await;
        }
        let k = effective_k(opts.k);
        let overfetch = k.saturating_mul(self.config.overfetch);
        let threshold = opts.threshold.unwrap_or(self.config.hybrid_threshold);
        let expanded = expand_query(query, opts.intent, self.config.max_expansion_terms);

        let query_vector = self.pool.embed_cancellable(&expanded.text(), cancel).await?;
        let dense: Vec<Candidate> = self
            .vectors
            .read()
            .await
            .search(&query_vector, overfetch, threshold, opts.kind)?
            .into_iter()
            .map(|hit| Candidate {
                key: hit.key,
                canonical: hit.canonical,
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let snapshot = self.store.read().await.snapshot();
        let lexical = retrieval::lexical_candidates(&snapshot, &expanded, opts.kind, overfetch);

        let fused = retrieval::reciprocal_rank_fusion(&[dense, lexical], self.config.rrf_k);

        let mut results: Vec<SearchResult> = fused
            .into_iter()
            .filter_map(|entry| {
                let attrs = snapshot.find_node(&entry.candidate.key)?;
                let boost = retrieval::boost_for(&attrs, opts.intent);
                Some(SearchResult {
                    key: entry.candidate.canonical,
                    kind: entry.candidate.key.kind,
                    attrs,
                    fused_score: entry.fused_score,
                    boost,
                    boosted_score: entry.fused_score * boost,
                    intent: opts.intent,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            b.boosted_score
                .partial_cmp(&a.boosted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        results.truncate(k);
        Ok(results)
    }

    // ── Graph queries ────────────────────────────────────────

    pub async fn list_nodes(
        &self,
        kind: Option<NodeKind>,
        limit: Option<usize>,
    ) -> Vec<NodeDescriptor> {
        let store = self.store.read().await;
        store
            .list_nodes(kind, limit)
            .into_iter()
            .map(|(key, attrs)| NodeDescriptor {
                key: store.canonical(&key),
                kind: key.kind,
                attrs,
            })
            .collect()
    }

    /// Filtered node enumeration backing the `query_graph` tool.
    pub async fn query_graph(
        &self,
        kind: Option<NodeKind>,
        name_contains: Option<&str>,
        file_contains: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<NodeDescriptor> {
        let limit = limit.unwrap_or(100);
        let store = self.store.read().await;
        store
            .list_nodes(kind, None)
            .into_iter()
            .filter(|(key, attrs)| {
                let canonical = store.canonical(key);
                let name_ok = name_contains.is_none_or(|needle| {
                    canonical.to_lowercase().contains(&needle.to_lowercase())
                });
                let file_ok = file_contains.is_none_or(|needle| {
                    attrs
                        .file
                        .as_ref()
                        .is_some_and(|f| f.to_string_lossy().contains(needle))
                });
                name_ok && file_ok
            })
            .take(limit)
            .map(|(key, attrs)| NodeDescriptor {
                key: store.canonical(&key),
                kind: key.kind,
                attrs,
            })
            .collect()
    }

    pub async fn find_paths(
        &self,
        from: &str,
        to: &str,
        max_depth: usize,
        max_paths: usize,
        cancel: &CancelToken,
    ) -> CoreResult<PathsReport> {
        let from = NodeKey::parse_canonical(from, &self.symbols)?;
        let to = NodeKey::parse_canonical(to, &self.symbols)?;
        let snapshot = self.snapshot().await;
        let warn_fanout = self.config.path_warn_fanout;
        let cancel = cancel.clone();
        let (result, snapshot) = run_blocking(move || {
            let result =
                algo::find_paths(&snapshot, &from, &to, max_depth, max_paths, warn_fanout, &cancel)?;
            Ok::<_, CoreError>((result, snapshot))
        })
        .await??;
        Ok(PathsReport {
            paths: result
                .paths
                .iter()
                .map(|path| path.iter().map(|k| snapshot.canonical(k)).collect())
                .collect(),
            truncated: result.truncated,
            warning: result.warning,
        })
    }

    // ── Algorithms ───────────────────────────────────────────

    pub async fn pagerank(&self, cancel: &CancelToken) -> CoreResult<PageRankReport> {
        let snapshot = self.snapshot().await;
        let config = self.config.pagerank.clone();
        let cancel = cancel.clone();
        let result = run_blocking(move || {
            let proj = algo::Projection::call_graph(&snapshot);
            let scores = algo::pagerank(&proj, &config, &cancel)?;
            Ok::<_, CoreError>((scores, snapshot))
        })
        .await??;
        let (scores, snapshot) = result;
        Ok(PageRankReport {
            scores: render_scored(&snapshot, scores.scores),
            iterations: scores.iterations,
            converged: scores.converged,
        })
    }

    pub async fn degree_centrality(&self) -> CoreResult<Vec<DegreeReport>> {
        let snapshot = self.snapshot().await;
        let result = run_blocking(move || {
            let degrees = algo::degree(&snapshot);
            degrees
                .into_iter()
                .map(|(key, d)| DegreeReport {
                    key: snapshot.canonical(&key),
                    in_degree: d.in_degree,
                    out_degree: d.out_degree,
                    total_degree: d.total_degree,
                })
                .collect::<Vec<_>>()
        })
        .await?;
        Ok(result)
    }

    pub async fn betweenness_centrality(
        &self,
        cancel: &CancelToken,
    ) -> CoreResult<CentralityReport> {
        let snapshot = self.snapshot().await;
        let budget = self.config.betweenness_budget;
        let cancel = cancel.clone();
        let (result, snapshot) = run_blocking(move || {
            let proj = algo::Projection::call_graph(&snapshot);
            let result = algo::betweenness(&proj, budget, &cancel)?;
            Ok::<_, CoreError>((result, snapshot))
        })
        .await??;
        Ok(CentralityReport {
            scores: render_scored(&snapshot, result.scores),
            partial: result.partial,
        })
    }

    pub async fn closeness_centrality(
        &self,
        cancel: &CancelToken,
    ) -> CoreResult<CentralityReport> {
        let snapshot = self.snapshot().await;
        let cancel = cancel.clone();
        let (scores, snapshot) = run_blocking(move || {
            let proj = algo::Projection::call_graph(&snapshot);
            let scores = algo::closeness(&proj, &cancel)?;
            Ok::<_, CoreError>((scores, snapshot))
        })
        .await??;
        Ok(CentralityReport {
            scores: render_scored(&snapshot, scores),
            partial: false,
        })
    }

    pub async fn connected_components(&self, strong: bool) -> CoreResult<ComponentsReport> {
        let snapshot = self.snapshot().await;
        let components = run_blocking(move || {
            let proj = algo::Projection::call_graph(&snapshot);
            let components = if strong {
                algo::strongly_connected(&proj)
            } else {
                algo::weakly_connected(&proj)
            };
            components
                .into_iter()
                .map(|group| group.iter().map(|k| snapshot.canonical(k)).collect())
                .collect::<Vec<Vec<String>>>()
        })
        .await?;
        Ok(ComponentsReport { components })
    }

    pub async fn find_cycles(
        &self,
        scope: algo::CycleScope,
        min_length: usize,
        limit: usize,
        cancel: &CancelToken,
    ) -> CoreResult<CyclesReport> {
        let snapshot = self.snapshot().await;
        let cancel = cancel.clone();
        let (result, snapshot) = run_blocking(move || {
            let result = algo::find_cycles(&snapshot, scope, min_length, limit, &cancel)?;
            Ok::<_, CoreError>((result, snapshot))
        })
        .await??;
        Ok(CyclesReport {
            cycles: result
                .cycles
                .iter()
                .map(|cycle| cycle.iter().map(|k| snapshot.canonical(k)).collect())
                .collect(),
            truncated: result.truncated,
        })
    }

    /// Coupling metrics for one module (by name) or all modules.
    pub async fn coupling_report(
        &self,
        module: Option<&str>,
        transitive: bool,
    ) -> CoreResult<Vec<algo::ModuleCoupling>> {
        let key = module.map(|name| NodeKey::module(&self.symbols, name));
        let snapshot = self.snapshot().await;
        run_blocking(move || algo::coupling(&snapshot, key.as_ref(), transitive)).await?
    }

    // ── Read-only analyses ───────────────────────────────────

    /// Function nodes no `calls` edge reaches. Entry points and tests are
    /// filtered; public functions are reported at low confidence since
    /// external callers are invisible to the graph.
    pub async fn find_dead_code(&self) -> CoreResult<Vec<DeadCodeEntry>> {
        let snapshot = self.snapshot().await;
        Ok(run_blocking(move || {
            snapshot
                .list_nodes(Some(NodeKind::Function), None)
                .into_iter()
                .filter_map(|(key, attrs)| {
                    if !snapshot.incoming(&key, Some(EdgeKind::Calls)).is_empty() {
                        return None;
                    }
                    let canonical = snapshot.canonical(&key);
                    let name = canonical.rsplit("::").next().unwrap_or(&canonical);
                    if name.starts_with("main/") || name.starts_with("test") || name.starts_with('_')
                    {
                        return None;
                    }
                    let confidence = match attrs.visibility {
                        crate::model::Visibility::Private => "high",
                        crate::model::Visibility::Public => "low",
                    };
                    Some(DeadCodeEntry {
                        key: canonical,
                        attrs,
                        confidence,
                    })
                })
                .collect::<Vec<_>>()
        })
        .await?)
    }

    /// Function pairs whose embeddings exceed the duplicate threshold.
    pub async fn find_duplicates(&self, threshold: Option<f32>) -> CoreResult<DuplicatesReport> {
        const CANDIDATE_CAP: usize = 2_000;
        const PAIR_CAP: usize = 100;
        let threshold = threshold.unwrap_or(self.config.duplicate_threshold);

        let vectors = self.vectors.read().await;
        let mut entries: Vec<(String, Vec<f32>)> = vectors
            .entries_sorted()
            .into_iter()
            .filter(|(key, _)| key.kind == NodeKind::Function)
            .map(|(key, record)| (key.canonical(&self.symbols), record.vector.clone()))
            .collect();
        drop(vectors);

        let partial = entries.len() > CANDIDATE_CAP;
        entries.truncate(CANDIDATE_CAP);

        let pairs = run_blocking(move || {
            let mut pairs = Vec::new();
            for i in 0..entries.len() {
                for j in (i + 1)..entries.len() {
                    let similarity: f32 = entries[i]
                        .1
                        .iter()
                        .zip(&entries[j].1)
                        .map(|(a, b)| a * b)
                        .sum();
                    if similarity >= threshold {
                        pairs.push(DuplicatePair {
                            a: entries[i].0.clone(),
                            b: entries[j].0.clone(),
                            similarity,
                        });
                    }
                }
            }
            pairs.sort_by(|x, y| {
                y.similarity
                    .partial_cmp(&x.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| (x.a.clone(), x.b.clone()).cmp(&(y.a.clone(), y.b.clone())))
            });
            pairs.truncate(PAIR_CAP);
            pairs
        })
        .await?;

        Ok(DuplicatesReport { pairs, partial })
    }

    pub async fn graph_stats(&self) -> GraphStats {
        let store = self.store.read().await;
        let vectors = self.vectors.read().await;
        let tracker = self.tracker.read().await;
        GraphStats {
            nodes_by_kind: NodeKind::ALL
                .iter()
                .map(|kind| (kind.as_str().to_string(), store.count_nodes_by_type(*kind)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            edges_by_kind: store
                .edge_kind_counts()
                .into_iter()
                .map(|(kind, count)| (kind.as_str().to_string(), count))
                .collect(),
            total_nodes: store.node_count(),
            total_edges: store.edge_count(),
            tracked_files: tracker.len(),
            embeddings: vectors.size(),
            model: vectors.model_id().to_string(),
        }
    }

    // ── Persistence ──────────────────────────────────────────

    pub async fn save_cache(&self) -> CoreResult<PathBuf> {
        if !self.config.cache_enabled {
            return Err(CoreError::InvalidArgument("cache is disabled".into()));
        }
        let vectors = self.vectors.read().await;
        let tracker = self.tracker.read().await;
        self.cache.save(&vectors, &tracker, self.pool.info())
    }

    /// Save only when something changed since the last save. Failures are
    /// warnings: in-memory state is authoritative.
    pub async fn save_cache_if_dirty(&self) {
        if !self.config.cache_enabled || !self.cache.take_dirty() {
            return;
        }
        if let Err(e) = self.save_cache().await {
            self.cache.mark_dirty();
            warn!(error = %e, "embedding cache save failed");
        }
    }

    pub async fn load_cache(&self) -> CoreResult<usize> {
        if !self.config.cache_enabled {
            return Err(CoreError::InvalidArgument("cache is disabled".into()));
        }
        let mut vectors = self.vectors.write().await;
        let mut tracker = self.tracker.write().await;
        self.cache.load(&mut vectors, &mut tracker, self.pool.info())
    }

    pub async fn clear_cache(&self, scope: ClearScope) -> CoreResult<usize> {
        self.cache.clear(scope)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats(self.pool.info())
    }

    async fn snapshot(&self) -> GraphSnapshot {
        self.store.read().await.snapshot()
    }
}

fn effective_k(k: usize) -> usize {
    if k == 0 { 10 } else { k.min(100) }
}

fn render_scored(snapshot: &GraphSnapshot, scores: Vec<(NodeKey, f64)>) -> Vec<ScoredNode> {
    scores
        .into_iter()
        .map(|(key, score)| ScoredNode {
            key: snapshot.canonical(&key),
            score,
        })
        .collect()
}

async fn run_analyzer(
    analyzer: Arc<dyn FileAnalyzer>,
    bytes: Vec<u8>,
    path: PathBuf,
) -> CoreResult<ingest::AnalyzedFile> {
    run_blocking(move || analyzer.analyze(&bytes, &path)).await?
}

/// Off-runtime execution for CPU-bound work over snapshots.
async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
) -> CoreResult<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Internal(format!("blocking task failed: {e}")))
}
