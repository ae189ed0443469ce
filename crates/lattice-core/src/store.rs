//! Typed multigraph store with per-kind secondary indexes
//!
//! Backed by `petgraph::StableDiGraph`. Lookup by `(kind, id)` is O(1)
//! through a primary map; per-kind buckets keep canonical-id order for
//! stable enumeration; an explicit `(from, to, kind)` map makes edge
//! upsert O(1) while still allowing parallel edges of distinct kinds.

use crate::error::{CoreError, CoreResult};
use crate::model::{EdgeKind, EdgeView, NodeAttrs, NodeKey, NodeKind};
use crate::symbols::SymbolTable;
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub key: NodeKey,
    /// Cached `kind:id` rendering, used for ordering and serialization.
    pub canonical: String,
    pub attrs: NodeAttrs,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    kind: EdgeKind,
    weight: f32,
    attrs: HashMap<String, String>,
}

/// The knowledge graph store. Exclusively owns node and edge storage;
/// readers obtain either locked access or a cloned [`GraphSnapshot`].
#[derive(Clone)]
pub struct GraphStore {
    symbols: Arc<SymbolTable>,
    graph: StableDiGraph<NodeRecord, EdgeRecord>,
    index: HashMap<NodeKey, NodeIndex>,
    buckets: BTreeMap<NodeKind, BTreeMap<String, NodeKey>>,
    edge_index: HashMap<(NodeKey, NodeKey, EdgeKind), EdgeIndex>,
    /// Reverse index by `attrs.file`, driving incremental ingest diffs.
    by_file: HashMap<PathBuf, HashSet<NodeKey>>,
    generation: u64,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("node_count", &self.graph.node_count())
            .field("edge_count", &self.graph.edge_count())
            .field("generation", &self.generation)
            .finish()
    }
}

impl GraphStore {
    pub fn new(symbols: Arc<SymbolTable>) -> Self {
        GraphStore {
            symbols,
            graph: StableDiGraph::new(),
            index: HashMap::new(),
            buckets: BTreeMap::new(),
            edge_index: HashMap::new(),
            by_file: HashMap::new(),
            generation: 0,
        }
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    pub fn canonical(&self, key: &NodeKey) -> String {
        key.canonical(&self.symbols)
    }

    /// Monotonic mutation counter; bumped by every successful write.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Insert or replace a node. Identity is preserved across upserts of
    /// the same `(kind, id)`; incident edges are untouched.
    pub fn upsert_node(&mut self, key: NodeKey, attrs: NodeAttrs) -> CoreResult<()> {
        self.generation += 1;
        if let Some(&idx) = self.index.get(&key) {
            let record = self
                .graph
                .node_weight_mut(idx)
                .ok_or_else(|| CoreError::Internal(format!("index desync for {key:?}")))?;
            if record.attrs.file != attrs.file {
                if let Some(old) = &record.attrs.file {
                    if let Some(set) = self.by_file.get_mut(old) {
                        set.remove(&key);
                        if set.is_empty() {
                            self.by_file.remove(old);
                        }
                    }
                }
                if let Some(new) = &attrs.file {
                    self.by_file.entry(new.clone()).or_default().insert(key.clone());
                }
            }
            record.attrs = attrs;
            return Ok(());
        }

        let canonical = key.canonical(&self.symbols);
        if let Some(file) = &attrs.file {
            self.by_file.entry(file.clone()).or_default().insert(key.clone());
        }
        let idx = self.graph.add_node(NodeRecord {
            key: key.clone(),
            canonical: canonical.clone(),
            attrs,
        });
        self.buckets
            .entry(key.kind)
            .or_default()
            .insert(canonical, key.clone());
        self.index.insert(key, idx);
        Ok(())
    }

    /// Remove a node, cascading to all incident edges atomically.
    /// Returns false (no-op) when the node is absent. The caller owns the
    /// matching embedding cascade.
    pub fn remove_node(&mut self, key: &NodeKey) -> bool {
        let Some(idx) = self.index.remove(key) else {
            return false;
        };
        self.generation += 1;

        // Drop secondary edge entries before petgraph removes the edges.
        let incident: Vec<(NodeKey, NodeKey, EdgeKind)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| {
                let to = self.graph[e.target()].key.clone();
                (key.clone(), to, e.weight().kind)
            })
            .chain(self.graph.edges_directed(idx, Direction::Incoming).map(|e| {
                let from = self.graph[e.source()].key.clone();
                (from, key.clone(), e.weight().kind)
            }))
            .collect();
        for entry in incident {
            self.edge_index.remove(&entry);
        }

        if let Some(record) = self.graph.remove_node(idx) {
            if let Some(bucket) = self.buckets.get_mut(&key.kind) {
                bucket.remove(&record.canonical);
            }
            if let Some(file) = &record.attrs.file {
                if let Some(set) = self.by_file.get_mut(file) {
                    set.remove(key);
                    if set.is_empty() {
                        self.by_file.remove(file);
                    }
                }
            }
        }
        true
    }

    pub fn find_node(&self, key: &NodeKey) -> Option<NodeAttrs> {
        self.index
            .get(key)
            .and_then(|&idx| self.graph.node_weight(idx))
            .map(|record| record.attrs.clone())
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    /// Enumerate nodes in canonical-id order. When `kind` is omitted,
    /// iterates every bucket (kinds in a fixed order).
    pub fn list_nodes(
        &self,
        kind: Option<NodeKind>,
        limit: Option<usize>,
    ) -> Vec<(NodeKey, NodeAttrs)> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        let kinds: Vec<NodeKind> = match kind {
            Some(k) => vec![k],
            None => NodeKind::ALL.to_vec(),
        };
        'outer: for k in kinds {
            if let Some(bucket) = self.buckets.get(&k) {
                for key in bucket.values() {
                    if out.len() >= limit {
                        break 'outer;
                    }
                    if let Some(attrs) = self.find_node(key) {
                        out.push((key.clone(), attrs));
                    }
                }
            }
        }
        out
    }

    pub fn count_nodes_by_type(&self, kind: NodeKind) -> usize {
        self.buckets.get(&kind).map_or(0, |b| b.len())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Insert or replace the `(from, to, kind)` edge. Both endpoints must
    /// already exist; a missing endpoint rejects the insert.
    pub fn add_edge(
        &mut self,
        from: &NodeKey,
        to: &NodeKey,
        kind: EdgeKind,
        weight: Option<f32>,
        attrs: HashMap<String, String>,
    ) -> CoreResult<()> {
        let from_idx = *self.index.get(from).ok_or_else(|| {
            CoreError::MissingEndpoint(self.canonical(from))
        })?;
        let to_idx = *self.index.get(to).ok_or_else(|| {
            CoreError::MissingEndpoint(self.canonical(to))
        })?;
        let weight = weight.unwrap_or(1.0);
        if weight < 0.0 {
            return Err(CoreError::InvalidArgument(format!(
                "edge weight must be non-negative, got {weight}"
            )));
        }
        self.generation += 1;

        let map_key = (from.clone(), to.clone(), kind);
        if let Some(&edge_idx) = self.edge_index.get(&map_key) {
            if let Some(record) = self.graph.edge_weight_mut(edge_idx) {
                record.weight = weight;
                record.attrs = attrs;
                return Ok(());
            }
        }
        let edge_idx = self
            .graph
            .add_edge(from_idx, to_idx, EdgeRecord { kind, weight, attrs });
        self.edge_index.insert(map_key, edge_idx);
        Ok(())
    }

    /// Outgoing edges of a node, optionally filtered by kind, ordered by
    /// `(kind, target canonical)`.
    pub fn outgoing(&self, key: &NodeKey, kind: Option<EdgeKind>) -> Vec<EdgeView> {
        self.adjacent(key, kind, Direction::Outgoing)
    }

    /// Incoming edges of a node, optionally filtered by kind, ordered by
    /// `(kind, source canonical)`.
    pub fn incoming(&self, key: &NodeKey, kind: Option<EdgeKind>) -> Vec<EdgeView> {
        self.adjacent(key, kind, Direction::Incoming)
    }

    fn adjacent(
        &self,
        key: &NodeKey,
        kind: Option<EdgeKind>,
        direction: Direction,
    ) -> Vec<EdgeView> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut edges: Vec<EdgeView> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| kind.is_none_or(|k| e.weight().kind == k))
            .map(|e| EdgeView {
                from: self.graph[e.source()].key.clone(),
                to: self.graph[e.target()].key.clone(),
                kind: e.weight().kind,
                weight: e.weight().weight,
                attrs: e.weight().attrs.clone(),
            })
            .collect();
        edges.sort_by(|a, b| {
            let peer_a = if direction == Direction::Outgoing { &a.to } else { &a.from };
            let peer_b = if direction == Direction::Outgoing { &b.to } else { &b.from };
            (a.kind, self.canonical(peer_a)).cmp(&(b.kind, self.canonical(peer_b)))
        });
        edges
    }

    /// Enumerate edges, optionally filtered by kind, in deterministic
    /// `(from, to, kind)` canonical order.
    pub fn list_edges(&self, kind: Option<EdgeKind>, limit: Option<usize>) -> Vec<EdgeView> {
        let mut edges: Vec<EdgeView> = self
            .graph
            .edge_references()
            .filter(|e| kind.is_none_or(|k| e.weight().kind == k))
            .map(|e| EdgeView {
                from: self.graph[e.source()].key.clone(),
                to: self.graph[e.target()].key.clone(),
                kind: e.weight().kind,
                weight: e.weight().weight,
                attrs: e.weight().attrs.clone(),
            })
            .collect();
        edges.sort_by(|a, b| {
            (self.canonical(&a.from), self.canonical(&a.to), a.kind)
                .cmp(&(self.canonical(&b.from), self.canonical(&b.to), b.kind))
        });
        if let Some(limit) = limit {
            edges.truncate(limit);
        }
        edges
    }

    /// Remove every outgoing edge of one kind from a node. Returns the
    /// number removed. Ingest uses this to clear re-declarable
    /// relationships before re-applying a file's declarations.
    pub fn remove_edges_from(&mut self, key: &NodeKey, kind: EdgeKind) -> usize {
        let Some(&idx) = self.index.get(key) else {
            return 0;
        };
        let doomed: Vec<(NodeKey, EdgeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| e.weight().kind == kind)
            .map(|e| (self.graph[e.target()].key.clone(), e.id()))
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.generation += 1;
        for (to, edge_idx) in &doomed {
            self.edge_index.remove(&(key.clone(), to.clone(), kind));
            self.graph.remove_edge(*edge_idx);
        }
        doomed.len()
    }

    /// Edge totals per kind, in a fixed kind order.
    pub fn edge_kind_counts(&self) -> Vec<(EdgeKind, usize)> {
        let mut counts: BTreeMap<EdgeKind, usize> = BTreeMap::new();
        for edge in self.graph.edge_references() {
            *counts.entry(edge.weight().kind).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }

    /// All nodes whose `attrs.file` equals `path`, in canonical order.
    pub fn nodes_in_file(&self, path: &Path) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self
            .by_file
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort_by_key(|k| self.canonical(k));
        keys
    }

    /// Paths currently referenced by at least one node.
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.by_file.keys().cloned().collect();
        files.sort();
        files
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.graph.clear();
        self.index.clear();
        self.buckets.clear();
        self.edge_index.clear();
        self.by_file.clear();
    }

    /// A logically immutable view for long-running reads. Full clone of
    /// the graph and its indexes; algorithms see a stable generation.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            inner: Arc::new(self.clone()),
        }
    }
}

/// Read-only handle over a cloned store. Cheap to clone and send across
/// threads; mutation methods are unreachable through it.
#[derive(Clone)]
pub struct GraphSnapshot {
    inner: Arc<GraphStore>,
}

impl std::ops::Deref for GraphSnapshot {
    type Target = GraphStore;

    fn deref(&self) -> &GraphStore {
        &self.inner
    }
}

impl std::fmt::Debug for GraphSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSnapshot")
            .field("generation", &self.inner.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;

    fn store() -> GraphStore {
        GraphStore::new(Arc::new(SymbolTable::new()))
    }

    fn attrs_in(file: &str) -> NodeAttrs {
        NodeAttrs {
            file: Some(PathBuf::from(file)),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_preserves_identity_and_replaces_attrs() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let key = NodeKey::function(&symbols, "auth", "validate", 1);

        for round in 0..5u32 {
            let mut attrs = attrs_in("src/auth.rs");
            attrs.span = Some((round, round + 10));
            store.upsert_node(key.clone(), attrs).unwrap();
        }

        assert_eq!(store.count_nodes_by_type(NodeKind::Function), 1);
        assert_eq!(store.find_node(&key).unwrap().span, Some((4, 14)));
    }

    #[test]
    fn edge_insert_requires_both_endpoints() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let a = NodeKey::module(&symbols, "a");
        let b = NodeKey::module(&symbols, "b");
        store.upsert_node(a.clone(), NodeAttrs::default()).unwrap();

        let err = store
            .add_edge(&a, &b, EdgeKind::Imports, None, HashMap::new())
            .unwrap_err();
        assert_eq!(err.kind(), "missing_endpoint");

        store.upsert_node(b.clone(), NodeAttrs::default()).unwrap();
        store
            .add_edge(&a, &b, EdgeKind::Imports, None, HashMap::new())
            .unwrap();
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn edge_upsert_replaces_by_triple() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let a = NodeKey::module(&symbols, "a");
        let b = NodeKey::module(&symbols, "b");
        store.upsert_node(a.clone(), NodeAttrs::default()).unwrap();
        store.upsert_node(b.clone(), NodeAttrs::default()).unwrap();

        store
            .add_edge(&a, &b, EdgeKind::Imports, Some(1.0), HashMap::new())
            .unwrap();
        store
            .add_edge(&a, &b, EdgeKind::Imports, Some(3.0), HashMap::new())
            .unwrap();
        // A distinct kind between the same pair is a parallel edge.
        store
            .add_edge(&a, &b, EdgeKind::DependsOn, None, HashMap::new())
            .unwrap();

        assert_eq!(store.edge_count(), 2);
        let imports = store.outgoing(&a, Some(EdgeKind::Imports));
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].weight, 3.0);
    }

    #[test]
    fn remove_node_cascades_edges() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let a = NodeKey::module(&symbols, "a");
        let b = NodeKey::module(&symbols, "b");
        let c = NodeKey::module(&symbols, "c");
        for key in [&a, &b, &c] {
            store.upsert_node(key.clone(), NodeAttrs::default()).unwrap();
        }
        store.add_edge(&a, &b, EdgeKind::Imports, None, HashMap::new()).unwrap();
        store.add_edge(&b, &c, EdgeKind::Imports, None, HashMap::new()).unwrap();
        store.add_edge(&c, &b, EdgeKind::DependsOn, None, HashMap::new()).unwrap();

        assert!(store.remove_node(&b));
        assert!(!store.remove_node(&b), "second removal is a no-op");

        for kind in [EdgeKind::Imports, EdgeKind::DependsOn] {
            assert!(store.outgoing(&a, Some(kind)).is_empty());
            assert!(store.incoming(&c, Some(kind)).is_empty());
        }
        assert!(store.list_edges(None, None).is_empty());

        // The (from, to, kind) slot is reusable after the cascade.
        store.upsert_node(b.clone(), NodeAttrs::default()).unwrap();
        store.add_edge(&a, &b, EdgeKind::Imports, None, HashMap::new()).unwrap();
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn remove_edges_from_clears_one_kind_only() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let a = NodeKey::module(&symbols, "a");
        let b = NodeKey::module(&symbols, "b");
        let c = NodeKey::module(&symbols, "c");
        for key in [&a, &b, &c] {
            store.upsert_node(key.clone(), NodeAttrs::default()).unwrap();
        }
        store.add_edge(&a, &b, EdgeKind::Imports, None, HashMap::new()).unwrap();
        store.add_edge(&a, &c, EdgeKind::Imports, None, HashMap::new()).unwrap();
        store.add_edge(&a, &b, EdgeKind::DependsOn, None, HashMap::new()).unwrap();
        store.add_edge(&b, &a, EdgeKind::Imports, None, HashMap::new()).unwrap();

        assert_eq!(store.remove_edges_from(&a, EdgeKind::Imports), 2);
        assert!(store.outgoing(&a, Some(EdgeKind::Imports)).is_empty());
        assert_eq!(store.outgoing(&a, Some(EdgeKind::DependsOn)).len(), 1);
        assert_eq!(store.incoming(&a, Some(EdgeKind::Imports)).len(), 1);

        // The cleared slot accepts a fresh insert.
        store.add_edge(&a, &b, EdgeKind::Imports, None, HashMap::new()).unwrap();
        assert_eq!(store.outgoing(&a, Some(EdgeKind::Imports)).len(), 1);
    }

    #[test]
    fn list_nodes_is_ordered_and_bounded() {
        let mut store = store();
        let symbols = store.symbols().clone();
        for name in ["zeta", "alpha", "mid"] {
            store
                .upsert_node(NodeKey::module(&symbols, name), NodeAttrs::default())
                .unwrap();
        }
        let listed = store.list_nodes(Some(NodeKind::Module), None);
        let names: Vec<String> = listed.iter().map(|(k, _)| store.canonical(k)).collect();
        assert_eq!(names, vec!["module:alpha", "module:mid", "module:zeta"]);

        assert_eq!(store.list_nodes(Some(NodeKind::Module), Some(2)).len(), 2);
    }

    #[test]
    fn by_file_reverse_index_tracks_moves() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let key = NodeKey::function(&symbols, "auth", "validate", 1);
        store.upsert_node(key.clone(), attrs_in("src/a.rs")).unwrap();
        assert_eq!(store.nodes_in_file(Path::new("src/a.rs")), vec![key.clone()]);

        store.upsert_node(key.clone(), attrs_in("src/b.rs")).unwrap();
        assert!(store.nodes_in_file(Path::new("src/a.rs")).is_empty());
        assert_eq!(store.nodes_in_file(Path::new("src/b.rs")), vec![key.clone()]);

        store.remove_node(&key);
        assert!(store.nodes_in_file(Path::new("src/b.rs")).is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let a = NodeKey::module(&symbols, "a");
        store.upsert_node(a.clone(), NodeAttrs::default()).unwrap();

        let snapshot = store.snapshot();
        let generation = snapshot.generation();
        store.upsert_node(NodeKey::module(&symbols, "b"), NodeAttrs::default()).unwrap();
        store.remove_node(&a);

        assert_eq!(snapshot.generation(), generation);
        assert_eq!(snapshot.node_count(), 1);
        assert!(snapshot.contains(&a));
    }

    #[test]
    fn visibility_survives_round_trip() {
        let mut store = store();
        let symbols = store.symbols().clone();
        let key = NodeKey::function(&symbols, "auth", "validate", 1);
        let attrs = NodeAttrs {
            visibility: Visibility::Public,
            ..Default::default()
        };
        store.upsert_node(key.clone(), attrs).unwrap();
        assert_eq!(store.find_node(&key).unwrap().visibility, Visibility::Public);
    }
}
