//! Integration tests: the engine driven through the real language
//! front-ends, cache and search pipeline.

use lattice_core::algo::CycleScope;
use lattice_core::{
    CancelToken, Engine, EngineConfig, HashEmbedder, NodeKind, SearchOptions,
};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

/// Engine over a temp project, cache isolated inside the temp dir.
fn engine_for(root: &Path, dims: usize) -> Engine {
    let mut config = EngineConfig::new(root);
    config.cache_root = root.join(".lattice-cache");
    config.model = format!("feature-hash-{dims}");
    Engine::new(
        config,
        Arc::new(HashEmbedder::new(dims)),
        lattice_indexer::default_registry(),
    )
}

fn write(root: &Path, name: &str, content: &str) {
    std::fs::write(root.join(name), content).unwrap();
}

#[test]
fn cli_help_is_wired_up() {
    let output = Command::new(env!("CARGO_BIN_EXE_lattice"))
        .arg("--help")
        .output()
        .expect("failed to run lattice binary");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lattice"));
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("index"));
}

#[tokio::test]
async fn rust_project_round_trip() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "auth.rs",
        r#"
use billing::charge;

/// Validates an email address before account creation.
pub fn validate_email(address: &str) -> bool {
    address.contains('@')
}

pub fn signup(address: &str) {
    validate_email(address);
}
"#,
    );
    write(
        dir.path(),
        "billing.rs",
        r#"
pub fn charge(customer: u32, amount: u64) -> u64 { amount }
"#,
    );

    let engine = engine_for(dir.path(), 64);
    let report = engine.analyze_directory(dir.path(), true).await.unwrap();
    assert_eq!(report.files_ingested, 2);
    assert_eq!(report.files_failed, 0);

    let stats = engine.graph_stats().await;
    assert_eq!(stats.nodes_by_kind.get("function"), Some(&3));
    assert!(stats.edges_by_kind.get("imports").is_some());
    assert!(stats.edges_by_kind.get("calls").is_some());
    assert!(stats.embeddings > 0);

    // signup -> validate_email is a resolvable same-file call.
    let paths = engine
        .find_paths(
            "function:auth::signup/1",
            "function:auth::validate_email/1",
            3,
            10,
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(paths.paths.len(), 1);
}

#[tokio::test]
async fn module_cycle_detection_scenario() {
    // A -> B -> C -> A over imports; adding B -> A introduces the 2-cycle.
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.py", "import b\n\ndef fa():\n    pass\n");
    write(dir.path(), "b.py", "import c\n\ndef fb():\n    pass\n");
    write(dir.path(), "c.py", "import a\n\ndef fc():\n    pass\n");

    let engine = engine_for(dir.path(), 32);
    engine.analyze_directory(dir.path(), true).await.unwrap();

    let cycles = engine
        .find_cycles(CycleScope::Module, 2, 100, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(cycles.cycles.len(), 1);
    assert_eq!(
        cycles.cycles[0],
        vec!["module:a".to_string(), "module:b".to_string(), "module:c".to_string()],
        "cycle must be normalized to start at its minimal element"
    );

    write(dir.path(), "b.py", "import c\nimport a\n\ndef fb():\n    pass\n");
    engine.analyze_file(&dir.path().join("b.py")).await.unwrap();

    let cycles = engine
        .find_cycles(CycleScope::Module, 2, 100, &CancelToken::new())
        .await
        .unwrap();
    assert!(cycles.cycles.contains(&vec!["module:a".to_string(), "module:b".to_string()]));
    assert!(cycles.cycles.iter().any(|c| c.len() == 3));
}

#[tokio::test]
async fn hybrid_search_ranks_docstring_matches() {
    let dir = TempDir::new().unwrap();
    let mut corpus = String::new();
    corpus.push_str(
        r#"
def validate_email(address):
    """Performs email validation on the given address."""
    return "@" in address

def check_address(address):
    """Performs email validation on the given address."""
    return "@" in address

"#,
    );
    for i in 0..50 {
        corpus.push_str(&format!(
            "def worker_{i}(batch):\n    \"\"\"Processes queue batch number {i}.\"\"\"\n    return batch\n\n"
        ));
    }
    write(dir.path(), "accounts.py", &corpus);

    let engine = engine_for(dir.path(), 128);
    engine.analyze_directory(dir.path(), true).await.unwrap();

    let opts = SearchOptions {
        k: 10,
        kind: Some(NodeKind::Function),
        ..Default::default()
    };
    let results = engine
        .hybrid_search("email validation", &opts, &CancelToken::new())
        .await
        .unwrap();

    let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
    let pos = |needle: &str| keys.iter().position(|k| k.contains(needle));
    let validate = pos("validate_email").expect("validate_email in top 10");
    let check = pos("check_address").expect("docstring match in top 10");
    assert!(
        validate < check,
        "name match must outrank an identical docstring: {keys:?}"
    );
}

#[tokio::test]
async fn cache_incompatibility_scenario() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "m.rs", "pub fn f(a: u32) -> u32 { a }");

    let engine = engine_for(dir.path(), 64);
    engine.analyze_directory(dir.path(), true).await.unwrap();
    engine.save_cache().await.unwrap();

    // Same project, different model dims: the cache must refuse.
    let other = engine_for(dir.path(), 96);
    let err = other.load_cache().await.unwrap_err();
    assert_eq!(err.kind(), "incompatible");
    assert_eq!(other.graph_stats().await.embeddings, 0);
    assert!(!other.cache_stats().await.valid);

    // The original model still loads it.
    let same = engine_for(dir.path(), 64);
    let loaded = same.load_cache().await.unwrap();
    assert!(loaded > 0);
    assert!(same.cache_stats().await.valid);
}

#[tokio::test]
async fn pagerank_numeric_sanity() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "pair.rs",
        r#"
fn ping() { pong(); }
fn pong() { ping(); }
"#,
    );

    let engine = engine_for(dir.path(), 32);
    engine.analyze_directory(dir.path(), true).await.unwrap();

    let report = engine.pagerank(&CancelToken::new()).await.unwrap();
    assert!(report.converged);
    assert_eq!(report.scores.len(), 2);
    let sum: f64 = report.scores.iter().map(|s| s.score).sum();
    assert!((sum - 1.0).abs() < 1e-3);
    assert!(
        (report.scores[0].score - report.scores[1].score).abs() < 1e-6,
        "symmetric two-node cycle must split rank evenly"
    );
}

#[tokio::test]
async fn incremental_ingest_scenario() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("f.py");

    std::fs::write(&file, "def foo():\n    pass\n").unwrap();
    let engine = engine_for(dir.path(), 32);
    engine.analyze_file(&file).await.unwrap();
    assert_eq!(function_names(&engine).await, vec!["foo/0"]);

    std::fs::write(&file, "def foo():\n    pass\n\ndef bar(x):\n    pass\n").unwrap();
    engine.analyze_file(&file).await.unwrap();
    assert_eq!(function_names(&engine).await, vec!["bar/1", "foo/0"]);

    let report = engine.analyze_file(&file).await.unwrap();
    assert_eq!(
        report.status,
        lattice_core::engine::IngestStatus::Unchanged,
        "identical re-ingest must be a tracker no-op"
    );
}

async fn function_names(engine: &Engine) -> Vec<String> {
    engine
        .list_nodes(Some(NodeKind::Function), None)
        .await
        .into_iter()
        .map(|n| n.key.rsplit("::").next().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn dead_code_and_duplicates_analyses() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "lib.rs",
        r#"
pub fn entry() { used(); }

fn used() {}

fn never_called() {}
"#,
    );
    write(
        dir.path(),
        "copy_a.rs",
        "/// Sums a slice of prices into a total.\npub fn total(prices: &[u64]) -> u64 { prices.iter().sum() }",
    );
    write(
        dir.path(),
        "copy_b.rs",
        "/// Sums a slice of prices into a total.\npub fn total(prices: &[u64]) -> u64 { prices.iter().sum() }",
    );

    let engine = engine_for(dir.path(), 128);
    engine.analyze_directory(dir.path(), true).await.unwrap();

    let dead = engine.find_dead_code().await.unwrap();
    assert!(dead.iter().any(|d| d.key.contains("never_called")));
    assert!(
        !dead.iter().any(|d| d.key.contains("::used")),
        "called functions are not dead"
    );

    let duplicates = engine.find_duplicates(Some(0.95)).await.unwrap();
    assert!(duplicates.pairs.iter().any(|p| {
        p.a.contains("copy_a::total") && p.b.contains("copy_b::total")
    }));
}

#[tokio::test]
async fn repeated_searches_are_byte_identical() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "svc.rs",
        r#"
pub fn parse_config(raw: &str) -> u32 { raw.len() as u32 }
pub fn parse_headers(raw: &str) -> u32 { raw.len() as u32 }
pub fn parse_body(raw: &str) -> u32 { raw.len() as u32 }
"#,
    );
    let engine = engine_for(dir.path(), 64);
    engine.analyze_directory(dir.path(), true).await.unwrap();

    let opts = SearchOptions {
        k: 10,
        ..Default::default()
    };
    let baseline = engine
        .hybrid_search("parse request", &opts, &CancelToken::new())
        .await
        .unwrap();
    let rendered = serde_json::to_string(&baseline).unwrap();
    for _ in 0..5 {
        let again = engine
            .hybrid_search("parse request", &opts, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(serde_json::to_string(&again).unwrap(), rendered);
    }
}
