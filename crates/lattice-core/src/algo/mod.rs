//! Graph algorithms over store snapshots
//!
//! Every algorithm reads a [`GraphSnapshot`], never the live store, and
//! reports truncation instead of erroring on oversize inputs. Long loops
//! poll a [`CancelToken`] at their outer boundaries.

mod centrality;
mod components;
mod coupling;
mod cycles;
mod pagerank;
mod paths;

pub use centrality::{BetweennessResult, DegreeCentrality, betweenness, closeness, degree};
pub use components::{strongly_connected, weakly_connected};
pub use coupling::{ModuleCoupling, coupling};
pub use cycles::{CycleScope, CyclesResult, find_cycles};
pub use pagerank::{PageRankScores, pagerank};
pub use paths::{PathsResult, find_paths};

use crate::model::{EdgeKind, NodeKey, NodeKind};
use crate::store::GraphSnapshot;
use std::collections::{HashMap, HashSet};

/// A dense index projection of some subgraph: nodes renumbered 0..n with
/// sorted, deduplicated adjacency. All algorithms run on this shape so
/// their inner loops stay allocation-free and deterministic.
pub struct Projection {
    pub keys: Vec<NodeKey>,
    /// Canonical renderings aligned with `keys`; the ordering authority
    /// for normalization and tie-breaks.
    pub canon: Vec<String>,
    pub out: Vec<Vec<usize>>,
    pub inn: Vec<Vec<usize>>,
    index: HashMap<NodeKey, usize>,
}

impl Projection {
    fn from_nodes_and_edges(
        nodes: Vec<(NodeKey, String)>,
        edges: impl IntoIterator<Item = (NodeKey, NodeKey)>,
    ) -> Projection {
        let mut nodes = nodes;
        nodes.sort_by(|a, b| a.1.cmp(&b.1));
        let index: HashMap<NodeKey, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, (key, _))| (key.clone(), i))
            .collect();
        let n = nodes.len();
        let mut out: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        let mut inn: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        for (from, to) in edges {
            if let (Some(&f), Some(&t)) = (index.get(&from), index.get(&to)) {
                if f != t {
                    out[f].insert(t);
                    inn[t].insert(f);
                }
            }
        }
        let sort = |sets: Vec<HashSet<usize>>| -> Vec<Vec<usize>> {
            sets.into_iter()
                .map(|set| {
                    let mut v: Vec<usize> = set.into_iter().collect();
                    v.sort_unstable();
                    v
                })
                .collect()
        };
        let (keys, canon): (Vec<NodeKey>, Vec<String>) = nodes.into_iter().unzip();
        Projection {
            keys,
            canon,
            out: sort(out),
            inn: sort(inn),
            index,
        }
    }

    /// Function nodes and `calls` edges.
    pub fn call_graph(snapshot: &GraphSnapshot) -> Projection {
        let nodes: Vec<(NodeKey, String)> = snapshot
            .list_nodes(Some(NodeKind::Function), None)
            .into_iter()
            .map(|(key, _)| {
                let canon = snapshot.canonical(&key);
                (key, canon)
            })
            .collect();
        let mut edges = Vec::new();
        for (key, _) in &nodes {
            for edge in snapshot.outgoing(key, Some(EdgeKind::Calls)) {
                edges.push((edge.from, edge.to));
            }
        }
        Self::from_nodes_and_edges(nodes, edges)
    }

    /// Module nodes with `imports` edges plus an inter-module rollup of
    /// function-level `calls`.
    pub fn module_graph(snapshot: &GraphSnapshot) -> Projection {
        let nodes: Vec<(NodeKey, String)> = snapshot
            .list_nodes(Some(NodeKind::Module), None)
            .into_iter()
            .map(|(key, _)| {
                let canon = snapshot.canonical(&key);
                (key, canon)
            })
            .collect();

        let mut edges = Vec::new();
        for (key, _) in &nodes {
            for edge in snapshot.outgoing(key, Some(EdgeKind::Imports)) {
                if edge.to.kind == NodeKind::Module {
                    edges.push((edge.from, edge.to));
                }
            }
        }
        for (key, _) in snapshot.list_nodes(Some(NodeKind::Function), None) {
            let Some(from_module) = key.module_of() else { continue };
            for edge in snapshot.outgoing(&key, Some(EdgeKind::Calls)) {
                if let Some(to_module) = edge.to.module_of() {
                    if from_module != to_module {
                        edges.push((
                            NodeKey {
                                kind: NodeKind::Module,
                                id: crate::model::NodeId::Module(from_module),
                            },
                            NodeKey {
                                kind: NodeKind::Module,
                                id: crate::model::NodeId::Module(to_module),
                            },
                        ));
                    }
                }
            }
        }
        Self::from_nodes_and_edges(nodes, edges)
    }

    /// Every node, every edge kind. Used by generic path queries.
    pub fn full_graph(snapshot: &GraphSnapshot) -> Projection {
        let nodes: Vec<(NodeKey, String)> = snapshot
            .list_nodes(None, None)
            .into_iter()
            .map(|(key, _)| {
                let canon = snapshot.canonical(&key);
                (key, canon)
            })
            .collect();
        let edges: Vec<(NodeKey, NodeKey)> = snapshot
            .list_edges(None, None)
            .into_iter()
            .map(|e| (e.from, e.to))
            .collect();
        Self::from_nodes_and_edges(nodes, edges)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.index.get(key).copied()
    }
}


#[cfg(test)]
mod tests {
    use super::testgraph::*;
    use super::*;

    #[test]
    fn call_graph_projection_orders_by_canonical() {
        let store = call_store(&["c", "a", "b"], &[("a", "b"), ("b", "c")]);
        let proj = Projection::call_graph(&store.snapshot());
        assert_eq!(proj.len(), 3);
        assert!(proj.canon.windows(2).all(|w| w[0] < w[1]));
        let a = proj.index_of(&func(&store, "a")).unwrap();
        let b = proj.index_of(&func(&store, "b")).unwrap();
        assert_eq!(proj.out[a], vec![b]);
        assert_eq!(proj.inn[b], vec![a]);
    }

    #[test]
    fn module_graph_rolls_up_cross_module_calls() {
        let symbols = std::sync::Arc::new(crate::symbols::SymbolTable::new());
        let mut store = crate::store::GraphStore::new(symbols.clone());
        for name in ["alpha", "beta"] {
            store
                .upsert_node(NodeKey::module(&symbols, name), Default::default())
                .unwrap();
        }
        let f = NodeKey::function(&symbols, "alpha", "f", 0);
        let g = NodeKey::function(&symbols, "beta", "g", 0);
        store.upsert_node(f.clone(), Default::default()).unwrap();
        store.upsert_node(g.clone(), Default::default()).unwrap();
        store
            .add_edge(&f, &g, EdgeKind::Calls, None, Default::default())
            .unwrap();

        let proj = Projection::module_graph(&store.snapshot());
        let alpha = proj.index_of(&NodeKey::module(&symbols, "alpha")).unwrap();
        let beta = proj.index_of(&NodeKey::module(&symbols, "beta")).unwrap();
        assert_eq!(proj.out[alpha], vec![beta]);
    }
}
