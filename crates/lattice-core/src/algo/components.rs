//! Weakly and strongly connected components

use super::Projection;
use crate::model::NodeKey;
use petgraph::graph::DiGraph;
use std::collections::VecDeque;

/// Weakly connected components by undirected BFS. Components are ordered
/// largest first (canonical-first tie-break); members are in canonical
/// order.
pub fn weakly_connected(proj: &Projection) -> Vec<Vec<NodeKey>> {
    let n = proj.len();
    let mut component = vec![usize::MAX; n];
    let mut count = 0;
    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        let id = count;
        count += 1;
        let mut queue = VecDeque::new();
        component[start] = id;
        queue.push_back(start);
        while let Some(v) = queue.pop_front() {
            for &w in proj.out[v].iter().chain(&proj.inn[v]) {
                if component[w] == usize::MAX {
                    component[w] = id;
                    queue.push_back(w);
                }
            }
        }
    }
    collect_components(proj, &component, count)
}

/// Strongly connected components via Tarjan's algorithm.
pub fn strongly_connected(proj: &Projection) -> Vec<Vec<NodeKey>> {
    let n = proj.len();
    let mut graph = DiGraph::<usize, ()>::with_capacity(n, 0);
    let indices: Vec<_> = (0..n).map(|i| graph.add_node(i)).collect();
    for (v, targets) in proj.out.iter().enumerate() {
        for &w in targets {
            graph.add_edge(indices[v], indices[w], ());
        }
    }

    let sccs = petgraph::algo::tarjan_scc(&graph);
    let mut component = vec![usize::MAX; n];
    for (id, scc) in sccs.iter().enumerate() {
        for &node in scc {
            component[graph[node]] = id;
        }
    }
    collect_components(proj, &component, sccs.len())
}

fn collect_components(proj: &Projection, component: &[usize], count: usize) -> Vec<Vec<NodeKey>> {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); count];
    // Node indices are already in canonical order.
    for (node, &id) in component.iter().enumerate() {
        groups[id].push(node);
    }
    let mut out: Vec<Vec<usize>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    out.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| proj.canon[a[0]].cmp(&proj.canon[b[0]]))
    });
    out.into_iter()
        .map(|group| group.into_iter().map(|i| proj.keys[i].clone()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::testgraph::*;
    use super::*;

    #[test]
    fn weak_components_ignore_direction() {
        let store = call_store(
            &["a", "b", "c", "d", "lone"],
            &[("a", "b"), ("c", "b"), ("c", "d")],
        );
        let components = weakly_connected(&Projection::call_graph(&store.snapshot()));
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 4);
        assert_eq!(components[1], vec![func(&store, "lone")]);
    }

    #[test]
    fn strong_components_respect_direction() {
        let store = call_store(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "a"), ("b", "c")],
        );
        let components = strongly_connected(&Projection::call_graph(&store.snapshot()));
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 2, "a and b form the cycle scc");
        assert_eq!(components[1], vec![func(&store, "c")]);
    }

    #[test]
    fn empty_graph_has_no_components() {
        let store = call_store(&[], &[]);
        let proj = Projection::call_graph(&store.snapshot());
        assert!(weakly_connected(&proj).is_empty());
        assert!(strongly_connected(&proj).is_empty());
    }
}
