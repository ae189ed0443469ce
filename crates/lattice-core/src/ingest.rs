//! Ingest orchestration: analyzed-file payloads applied to the stores
//!
//! Language front-ends produce neutral [`AnalyzedFile`] records; this
//! module owns the contract and the diff logic that folds one payload
//! into the graph under the store's write discipline. Embedding work is
//! returned as jobs, not performed here, so the caller controls the
//! worker pool and the write-lock hold time stays one logical batch.

use crate::error::CoreResult;
use crate::model::{
    EdgeKind, Language, NodeAttrs, NodeId, NodeKey, NodeKind, Visibility,
};
use crate::store::GraphStore;
use crate::vector::VectorIndex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One module declared by a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRecord {
    pub name: String,
    pub span: Option<(u32, u32)>,
    pub doc: Option<String>,
    pub visibility: Visibility,
}

/// One function declared by a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    pub module: String,
    pub name: String,
    pub arity: u32,
    pub span: Option<(u32, u32)>,
    pub doc: Option<String>,
    pub visibility: Visibility,
    pub signature: Option<String>,
    /// Front-end extensions (purity, complexity, origin tags).
    pub extra: HashMap<String, String>,
}

/// A named non-function item: type, macro or variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub kind: NodeKind,
    pub module: String,
    pub name: String,
    pub span: Option<(u32, u32)>,
    pub doc: Option<String>,
    pub visibility: Visibility,
}

/// A possibly under-specified reference to another entity. Call sites
/// know the callee name and argument count, but not always its module.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolRef {
    Module(String),
    Function {
        module: Option<String>,
        name: String,
        arity: Option<u32>,
    },
}

/// One relationship declared by a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDecl {
    pub from: SymbolRef,
    pub to: SymbolRef,
    pub kind: EdgeKind,
    pub line: Option<u32>,
}

/// The neutral per-file payload every language front-end produces.
#[derive(Debug, Clone, Default)]
pub struct AnalyzedFile {
    pub path: PathBuf,
    pub language: Option<Language>,
    pub modules: Vec<ModuleRecord>,
    pub functions: Vec<FunctionRecord>,
    pub items: Vec<ItemRecord>,
    pub edges: Vec<EdgeDecl>,
}

/// Capability set of a language front-end.
pub trait FileAnalyzer: Send + Sync {
    fn supported_extensions(&self) -> &'static [&'static str];

    fn analyze(&self, bytes: &[u8], path: &Path) -> CoreResult<AnalyzedFile>;
}

/// Front-end plugin registry keyed by file extension.
#[derive(Default)]
pub struct AnalyzerRegistry {
    by_extension: HashMap<String, Arc<dyn FileAnalyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, analyzer: Arc<dyn FileAnalyzer>) {
        for ext in analyzer.supported_extensions() {
            self.by_extension.insert(ext.to_string(), analyzer.clone());
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn FileAnalyzer>> {
        let ext = path.extension()?.to_str()?;
        self.by_extension.get(ext).cloned()
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }
}

/// An edge whose target did not resolve during its own file's batch.
/// Retried after the surrounding directory batch, when the target's file
/// may have been ingested.
#[derive(Debug, Clone)]
pub struct DeferredEdge {
    pub from: NodeKey,
    pub to: SymbolRef,
    pub kind: EdgeKind,
    pub line: Option<u32>,
}

/// Result of folding one payload into the graph.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub nodes_upserted: usize,
    pub edges_added: usize,
    pub edges_skipped: usize,
    /// Stale nodes dropped by this batch; the caller cascades their
    /// embeddings out of the vector index.
    pub removed_keys: Vec<NodeKey>,
    /// `(key, embedding source text)` for nodes whose text changed.
    pub embedding_jobs: Vec<(NodeKey, String)>,
    pub deferred_edges: Vec<DeferredEdge>,
}

impl IngestStats {
    pub fn nodes_removed(&self) -> usize {
        self.removed_keys.len()
    }
}

/// Apply one analyzed file: upsert new/changed nodes, delete stale ones,
/// declare edges. Must run under the store's write discipline so
/// concurrent readers see pre- or post-batch state, never the middle.
pub fn apply_analyzed_file(
    store: &mut GraphStore,
    vectors: &VectorIndex,
    payload: &AnalyzedFile,
) -> CoreResult<IngestStats> {
    let mut stats = IngestStats::default();
    let symbols = store.symbols().clone();
    let path = payload.path.clone();
    let previous: HashSet<NodeKey> = store.nodes_in_file(&path).into_iter().collect();
    let mut current: HashSet<NodeKey> = HashSet::new();

    let file_key = NodeKey::file(&path);
    store.upsert_node(
        file_key.clone(),
        NodeAttrs {
            file: Some(path.clone()),
            language: payload.language,
            ..Default::default()
        },
    )?;
    current.insert(file_key);
    stats.nodes_upserted += 1;

    let upsert =
        |store: &mut GraphStore, current: &mut HashSet<NodeKey>, stats: &mut IngestStats,
         key: NodeKey, attrs: NodeAttrs| -> CoreResult<()> {
            let canonical = store.canonical(&key);
            let text = attrs.embedding_text(&canonical);
            let needs_embedding = vectors
                .get(&key)
                .map(|record| record.source_text != text)
                .unwrap_or(true);
            store.upsert_node(key.clone(), attrs)?;
            if needs_embedding {
                stats.embedding_jobs.push((key.clone(), text));
            }
            current.insert(key);
            stats.nodes_upserted += 1;
            Ok(())
        };

    for module in &payload.modules {
        let key = NodeKey::module(&symbols, &module.name);
        let attrs = NodeAttrs {
            file: Some(path.clone()),
            span: module.span,
            visibility: module.visibility,
            doc: module.doc.clone(),
            language: payload.language,
            extra: HashMap::new(),
        };
        upsert(store, &mut current, &mut stats, key, attrs)?;
    }

    for function in &payload.functions {
        let key = NodeKey::function(&symbols, &function.module, &function.name, function.arity);
        let mut extra = function.extra.clone();
        if let Some(signature) = &function.signature {
            extra.insert("signature".to_string(), signature.clone());
        }
        let attrs = NodeAttrs {
            file: Some(path.clone()),
            span: function.span,
            visibility: function.visibility,
            doc: function.doc.clone(),
            language: payload.language,
            extra,
        };
        upsert(store, &mut current, &mut stats, key.clone(), attrs)?;

        // The declaring module defines its functions.
        let module_key = NodeKey::module(&symbols, &function.module);
        if store.contains(&module_key) {
            store.add_edge(&module_key, &key, EdgeKind::Defines, None, HashMap::new())?;
            stats.edges_added += 1;
        }
    }

    for item in &payload.items {
        let key = NodeKey::item(&symbols, item.kind, &item.module, &item.name);
        let attrs = NodeAttrs {
            file: Some(path.clone()),
            span: item.span,
            visibility: item.visibility,
            doc: item.doc.clone(),
            language: payload.language,
            extra: HashMap::new(),
        };
        upsert(store, &mut current, &mut stats, key.clone(), attrs)?;

        let module_key = NodeKey::module(&symbols, &item.module);
        if store.contains(&module_key) {
            store.add_edge(&module_key, &key, EdgeKind::Defines, None, HashMap::new())?;
            stats.edges_added += 1;
        }
    }

    // Stale nodes: previously derived from this path, no longer declared.
    for stale in previous.difference(&current) {
        store.remove_node(stale);
        stats.removed_keys.push(stale.clone());
    }

    // Relationships re-declared below are cleared first, so an import or
    // call dropped from the source disappears on re-ingest instead of
    // lingering while its endpoints survive.
    for key in &current {
        if key.kind == NodeKind::File {
            continue;
        }
        for kind in [
            EdgeKind::Calls,
            EdgeKind::Imports,
            EdgeKind::References,
            EdgeKind::DependsOn,
        ] {
            store.remove_edges_from(key, kind);
        }
    }

    for decl in &payload.edges {
        match declare_edge(store, decl) {
            EdgeOutcome::Added => stats.edges_added += 1,
            EdgeOutcome::Deferred(deferred) => stats.deferred_edges.push(deferred),
            EdgeOutcome::Skipped(reason) => {
                debug!(file = %path.display(), reason, "edge declaration skipped");
                stats.edges_skipped += 1;
            }
        }
    }

    Ok(stats)
}

enum EdgeOutcome {
    Added,
    Deferred(DeferredEdge),
    Skipped(&'static str),
}

fn declare_edge(store: &mut GraphStore, decl: &EdgeDecl) -> EdgeOutcome {
    let Some(from) = resolve_ref(store, &decl.from, false) else {
        return EdgeOutcome::Skipped("unresolved source");
    };
    match resolve_ref(store, &decl.to, true) {
        Some(to) => match add_declared_edge(store, &from, &to, decl.kind, decl.line) {
            Ok(()) => EdgeOutcome::Added,
            Err(_) => EdgeOutcome::Skipped("endpoint vanished"),
        },
        None => EdgeOutcome::Deferred(DeferredEdge {
            from,
            to: decl.to.clone(),
            kind: decl.kind,
            line: decl.line,
        }),
    }
}

/// Retry a deferred edge after the batch; returns true when it landed.
pub fn retry_deferred_edge(store: &mut GraphStore, deferred: &DeferredEdge) -> bool {
    if !store.contains(&deferred.from) {
        return false;
    }
    let Some(to) = resolve_ref(store, &deferred.to, false) else {
        return false;
    };
    add_declared_edge(store, &deferred.from, &to, deferred.kind, deferred.line).is_ok()
}

fn add_declared_edge(
    store: &mut GraphStore,
    from: &NodeKey,
    to: &NodeKey,
    kind: EdgeKind,
    line: Option<u32>,
) -> CoreResult<()> {
    let mut attrs = HashMap::new();
    if let Some(line) = line {
        attrs.insert("line".to_string(), line.to_string());
    }
    store.add_edge(from, to, kind, None, attrs)
}

/// Resolve a symbol reference against the current graph.
///
/// Modules referenced as edge targets are created on demand: an import
/// of an external module is real information even when that module's
/// source is outside the project. (Such placeholder nodes carry no file
/// attribute, so no file removal ever cascades into them.)
///
/// Functions resolve by `(module, name, arity)` when fully specified,
/// otherwise by unique `name/arity` match across the function bucket.
fn resolve_ref(store: &mut GraphStore, reference: &SymbolRef, create_modules: bool) -> Option<NodeKey> {
    let symbols = store.symbols().clone();
    match reference {
        SymbolRef::Module(name) => {
            if name.is_empty() {
                return None;
            }
            let key = NodeKey::module(&symbols, name);
            if store.contains(&key) {
                return Some(key);
            }
            if create_modules {
                store.upsert_node(key.clone(), NodeAttrs::default()).ok()?;
                return Some(key);
            }
            None
        }
        SymbolRef::Function {
            module,
            name,
            arity,
        } => {
            if let (Some(module), Some(arity)) = (module, arity) {
                let key = NodeKey::function(&symbols, module, name, *arity);
                return store.contains(&key).then_some(key);
            }
            let candidates = store.list_nodes(Some(NodeKind::Function), None);
            let mut matches = candidates.into_iter().filter_map(|(key, _)| match &key.id {
                NodeId::Function {
                    module: m,
                    name: n,
                    arity: a,
                } => {
                    let name_ok = symbols.resolve(*n).as_ref() == name.as_str();
                    let arity_ok = arity.is_none_or(|want| want == *a);
                    let module_ok = module
                        .as_ref()
                        .is_none_or(|want| symbols.resolve(*m).as_ref() == want.as_str());
                    (name_ok && arity_ok && module_ok).then_some(key)
                }
                _ => None,
            });
            let first = matches.next()?;
            // Ambiguity skips rather than guessing.
            matches.next().is_none().then_some(first)
        }
    }
}
