//! CLI command implementations

use anyhow::Context;
use lattice_core::{
    CancelToken, ClearScope, Engine, EngineConfig, HashEmbedder, SearchIntent, SearchOptions,
    SearchStrategy,
};
use lattice_watcher::{DebouncedWatcher, FileEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Build the engine for a project root: config from env, the built-in
/// feature-hash embedder, every bundled language front-end.
fn build_engine(root: &PathBuf) -> anyhow::Result<Arc<Engine>> {
    let config = EngineConfig::new(root.clone()).overlay_env();
    let embedder = HashEmbedder::from_model_id(&config.model)
        .with_context(|| format!("embedding model `{}`", config.model))?;
    let registry = lattice_indexer::default_registry();
    Ok(Arc::new(Engine::new(config, Arc::new(embedder), registry)))
}

/// Warm start from the on-disk cache when it is compatible; any refusal
/// just means a cold start.
async fn try_load_cache(engine: &Engine) {
    match engine.load_cache().await {
        Ok(count) => info!(embeddings = count, "embedding cache loaded"),
        Err(e) => info!("starting cold: {e}"),
    }
}

pub async fn serve(root: PathBuf, socket: Option<PathBuf>, watch: bool) -> anyhow::Result<()> {
    let engine = build_engine(&root)?;
    try_load_cache(&engine).await;

    for dir in engine.config().auto_analyze_dirs.clone() {
        info!(dir = %dir.display(), "auto-analyzing");
        if let Err(e) = engine.analyze_directory(&dir, true).await {
            warn!(dir = %dir.display(), "auto-analyze failed: {e}");
        }
    }

    if watch {
        spawn_watcher(engine.clone(), root.clone())?;
    }
    spawn_periodic_save(engine.clone());

    let served = match socket {
        Some(path) => lattice_mcp::serve_unix_socket(engine.clone(), &path).await,
        None => lattice_mcp::serve_stdio(engine.clone()).await,
    };

    engine.save_cache_if_dirty().await;
    served
}

/// Forward debounced filesystem events into the ingest pipeline.
fn spawn_watcher(engine: Arc<Engine>, root: PathBuf) -> anyhow::Result<()> {
    let debounce = engine.config().debounce;
    let (watcher, mut events) = DebouncedWatcher::watch(&root, debounce)?;
    tokio::spawn(async move {
        // The watcher handle must outlive the stream.
        let _watcher = watcher;
        while let Some(event) = events.recv().await {
            let result = match &event {
                FileEvent::Changed(path) => engine.analyze_file(path).await.map(|_| ()),
                FileEvent::Removed(path) => engine.remove_file(path).await.map(|_| ()),
            };
            if let Err(e) = result {
                warn!(path = %event.path().display(), "watch ingest failed: {e}");
            }
        }
    });
    info!(root = %root.display(), "filesystem watcher running");
    Ok(())
}

/// Periodic save policy: the cache is flushed when dirty, not per file.
fn spawn_periodic_save(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            engine.save_cache_if_dirty().await;
        }
    });
}

pub async fn index(root: PathBuf, recursive: bool) -> anyhow::Result<()> {
    let engine = build_engine(&root)?;
    try_load_cache(&engine).await;

    let report = engine.analyze_directory(&root, recursive).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match engine.save_cache().await {
        Ok(path) => info!(path = %path.display(), "embedding cache saved"),
        Err(e) => warn!("cache save skipped: {e}"),
    }
    Ok(())
}

pub async fn search(
    root: PathBuf,
    query: String,
    k: usize,
    semantic: bool,
    intent: String,
) -> anyhow::Result<()> {
    let engine = build_engine(&root)?;
    try_load_cache(&engine).await;
    if engine.graph_stats().await.total_nodes == 0 {
        info!("no index yet, analyzing project first");
        engine.analyze_directory(&root, true).await?;
    }

    let intent = match intent.as_str() {
        "general" => SearchIntent::General,
        "explain" => SearchIntent::Explain,
        "refactor" => SearchIntent::Refactor,
        "debug" => SearchIntent::Debug,
        other => anyhow::bail!("unknown intent `{other}`"),
    };
    let opts = SearchOptions {
        k,
        threshold: None,
        intent,
        strategy: if semantic {
            SearchStrategy::Semantic
        } else {
            SearchStrategy::Hybrid
        },
        kind: None,
    };

    let results = engine
        .hybrid_search(&query, &opts, &CancelToken::new())
        .await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

pub async fn stats(root: PathBuf) -> anyhow::Result<()> {
    let engine = build_engine(&root)?;
    try_load_cache(&engine).await;

    let graph = engine.graph_stats().await;
    let cache = engine.cache_stats().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "graph": graph,
            "cache": cache,
        }))?
    );
    Ok(())
}

pub async fn clear_cache(root: PathBuf, all: bool, older_than: Option<u64>) -> anyhow::Result<()> {
    let engine = build_engine(&root)?;
    let scope = if all {
        ClearScope::All
    } else if let Some(days) = older_than {
        ClearScope::OlderThan { days }
    } else {
        ClearScope::CurrentProject
    };
    let removed = engine.clear_cache(scope).await?;
    info!(removed, "cache cleared");
    Ok(())
}
