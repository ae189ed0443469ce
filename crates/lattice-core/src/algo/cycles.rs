//! DFS cycle enumeration with rotation-normalized deduplication

use super::Projection;
use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use crate::model::NodeKey;
use crate::store::GraphSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which graph the cycle hunt runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleScope {
    /// Project module graph: `imports` plus the inter-module call rollup.
    Module,
    /// Direct function-level `calls`.
    Function,
}

#[derive(Debug, Clone)]
pub struct CyclesResult {
    /// Each cycle rotated so its lexicographically minimal element is
    /// first; no two returned cycles are rotations of each other.
    pub cycles: Vec<Vec<NodeKey>>,
    /// True when the global limit stopped enumeration early.
    pub truncated: bool,
}

pub fn find_cycles(
    snapshot: &GraphSnapshot,
    scope: CycleScope,
    min_length: usize,
    limit: usize,
    cancel: &CancelToken,
) -> CoreResult<CyclesResult> {
    let proj = match scope {
        CycleScope::Module => Projection::module_graph(snapshot),
        CycleScope::Function => Projection::call_graph(snapshot),
    };
    let min_length = min_length.max(2);
    let n = proj.len();

    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut cycles: Vec<Vec<usize>> = Vec::new();
    let mut truncated = false;

    'starts: for start in 0..n {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        // Per-start visit set: a node fully explored from this start is
        // not re-entered through another prefix.
        let mut visited = vec![false; n];
        let mut on_path = vec![false; n];
        let mut path = vec![start];
        on_path[start] = true;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if frame.1 < proj.out[node].len() {
                let next = proj.out[node][frame.1];
                frame.1 += 1;
                if next == start {
                    if path.len() >= min_length
                        && record(&proj, &path, &mut seen, &mut cycles)
                        && cycles.len() >= limit
                    {
                        truncated = true;
                        break 'starts;
                    }
                } else if !on_path[next] && !visited[next] {
                    on_path[next] = true;
                    path.push(next);
                    stack.push((next, 0));
                }
            } else {
                visited[node] = true;
                on_path[node] = false;
                path.pop();
                stack.pop();
            }
        }
    }

    let mut out: Vec<Vec<NodeKey>> = cycles
        .into_iter()
        .map(|cycle| cycle.into_iter().map(|i| proj.keys[i].clone()).collect())
        .collect();
    // Deterministic presentation: shortest first, then canonical order.
    out.sort_by(|a, b| {
        a.len().cmp(&b.len()).then_with(|| {
            let ca: Vec<&str> = a
                .iter()
                .map(|k| proj.canon[proj.index_of(k).unwrap_or(0)].as_str())
                .collect();
            let cb: Vec<&str> = b
                .iter()
                .map(|k| proj.canon[proj.index_of(k).unwrap_or(0)].as_str())
                .collect();
            ca.cmp(&cb)
        })
    });

    Ok(CyclesResult {
        cycles: out,
        truncated,
    })
}

/// Rotate the cycle so its minimal canonical element leads, then insert
/// it unless an equivalent rotation was already recorded.
fn record(
    proj: &Projection,
    path: &[usize],
    seen: &mut HashSet<Vec<usize>>,
    cycles: &mut Vec<Vec<usize>>,
) -> bool {
    let pivot = path
        .iter()
        .enumerate()
        .min_by(|a, b| proj.canon[*a.1].cmp(&proj.canon[*b.1]))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut normalized = Vec::with_capacity(path.len());
    normalized.extend_from_slice(&path[pivot..]);
    normalized.extend_from_slice(&path[..pivot]);
    if seen.insert(normalized.clone()) {
        cycles.push(normalized);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::testgraph::*;
    use super::*;

    fn canon_cycles(store: &crate::store::GraphStore, result: &CyclesResult) -> Vec<Vec<String>> {
        result
            .cycles
            .iter()
            .map(|cycle| cycle.iter().map(|k| store.canonical(k)).collect())
            .collect()
    }

    #[test]
    fn triangle_yields_one_normalized_cycle() {
        let store = module_store(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let result = find_cycles(
            &store.snapshot(),
            CycleScope::Module,
            2,
            100,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(
            canon_cycles(&store, &result),
            vec![vec!["module:a", "module:b", "module:c"]]
        );
        assert!(!result.truncated);
    }

    #[test]
    fn extra_back_edge_adds_the_two_cycle() {
        let store = module_store(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "c"), ("c", "a"), ("b", "a")],
        );
        let result = find_cycles(
            &store.snapshot(),
            CycleScope::Module,
            2,
            100,
            &CancelToken::new(),
        )
        .unwrap();

        let cycles = canon_cycles(&store, &result);
        assert!(cycles.contains(&vec!["module:a".to_string(), "module:b".to_string()]));
        assert!(cycles.contains(&vec![
            "module:a".to_string(),
            "module:b".to_string(),
            "module:c".to_string()
        ]));
    }

    #[test]
    fn rotations_are_never_duplicated() {
        // Every node is a potential start; the same triangle must come
        // back exactly once.
        let store = module_store(
            &["m1", "m2", "m3", "m4"],
            &[("m1", "m2"), ("m2", "m3"), ("m3", "m1"), ("m3", "m4")],
        );
        let result = find_cycles(
            &store.snapshot(),
            CycleScope::Module,
            2,
            100,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(store.canonical(&result.cycles[0][0]), "module:m1");
    }

    #[test]
    fn min_length_filters_short_cycles() {
        let store = module_store(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "a"), ("a", "c"), ("c", "b"), ("b", "a")],
        );
        let result = find_cycles(
            &store.snapshot(),
            CycleScope::Module,
            3,
            100,
            &CancelToken::new(),
        )
        .unwrap();
        for cycle in &result.cycles {
            assert!(cycle.len() >= 3);
        }
    }

    #[test]
    fn limit_truncates() {
        let store = module_store(
            &["a", "b", "c"],
            &[("a", "b"), ("b", "a"), ("b", "c"), ("c", "b"), ("c", "a"), ("a", "c")],
        );
        let result = find_cycles(
            &store.snapshot(),
            CycleScope::Module,
            2,
            1,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(result.cycles.len(), 1);
        assert!(result.truncated);
    }

    #[test]
    fn function_scope_walks_calls() {
        let store = call_store(&["f", "g"], &[("f", "g"), ("g", "f")]);
        let result = find_cycles(
            &store.snapshot(),
            CycleScope::Function,
            2,
            100,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(result.cycles.len(), 1);
        assert_eq!(result.cycles[0].len(), 2);
    }
}
