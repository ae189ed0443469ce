//! Bounded simple-path enumeration

use super::Projection;
use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use crate::model::NodeKey;
use crate::store::GraphSnapshot;

#[derive(Debug, Clone)]
pub struct PathsResult {
    /// Simple paths from source to target, each at most `max_depth`
    /// edges long. At most `max_paths` entries.
    pub paths: Vec<Vec<NodeKey>>,
    /// True when `max_paths` stopped enumeration early.
    pub truncated: bool,
    /// Soft warning attached when the explored fan-out crossed the
    /// configured threshold; results are still returned within limits.
    pub warning: Option<String>,
}

/// All simple paths `from -> to` over every edge kind, depth- and
/// count-bounded. Neighbor order is canonical, so output is
/// deterministic.
pub fn find_paths(
    snapshot: &GraphSnapshot,
    from: &NodeKey,
    to: &NodeKey,
    max_depth: usize,
    max_paths: usize,
    warn_fanout: usize,
    cancel: &CancelToken,
) -> CoreResult<PathsResult> {
    let proj = Projection::full_graph(snapshot);
    let source = proj
        .index_of(from)
        .ok_or_else(|| CoreError::NotFound(snapshot.canonical(from)))?;
    let target = proj
        .index_of(to)
        .ok_or_else(|| CoreError::NotFound(snapshot.canonical(to)))?;

    let mut paths: Vec<Vec<usize>> = Vec::new();
    let mut truncated = false;
    let mut fanout_seen = 0usize;

    if max_paths > 0 && max_depth > 0 {
        let mut on_path = vec![false; proj.len()];
        let mut path = vec![source];
        on_path[source] = true;
        let mut stack: Vec<(usize, usize)> = vec![(source, 0)];

        while let Some(frame) = stack.last_mut() {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let node = frame.0;
            if frame.1 == 0 {
                fanout_seen += proj.out[node].len();
            }
            if frame.1 < proj.out[node].len() {
                let next = proj.out[node][frame.1];
                frame.1 += 1;
                if next == target {
                    let mut found = path.clone();
                    found.push(target);
                    paths.push(found);
                    if paths.len() >= max_paths {
                        truncated = true;
                        break;
                    }
                } else if !on_path[next] && path.len() < max_depth {
                    on_path[next] = true;
                    path.push(next);
                    stack.push((next, 0));
                }
            } else {
                on_path[node] = false;
                path.pop();
                stack.pop();
            }
        }
    }

    let warning = (fanout_seen > warn_fanout).then(|| {
        format!(
            "path search visited {fanout_seen} neighbors (threshold {warn_fanout}); \
             consider lowering max_depth"
        )
    });

    Ok(PathsResult {
        paths: paths
            .into_iter()
            .map(|p| p.into_iter().map(|i| proj.keys[i].clone()).collect())
            .collect(),
        truncated,
        warning,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testgraph::*;
    use super::*;

    fn run(
        store: &crate::store::GraphStore,
        from: &str,
        to: &str,
        max_depth: usize,
        max_paths: usize,
    ) -> PathsResult {
        find_paths(
            &store.snapshot(),
            &func(store, from),
            &func(store, to),
            max_depth,
            max_paths,
            1_000,
            &CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn finds_both_branches_of_a_diamond() {
        let store = call_store(
            &["s", "l", "r", "t"],
            &[("s", "l"), ("s", "r"), ("l", "t"), ("r", "t")],
        );
        let result = run(&store, "s", "t", 5, 10);
        assert_eq!(result.paths.len(), 2);
        assert!(!result.truncated);
        for path in &result.paths {
            assert_eq!(path.first(), Some(&func(&store, "s")));
            assert_eq!(path.last(), Some(&func(&store, "t")));
        }
    }

    #[test]
    fn depth_bound_excludes_long_paths() {
        let store = call_store(
            &["s", "m1", "m2", "t"],
            &[("s", "t"), ("s", "m1"), ("m1", "m2"), ("m2", "t")],
        );
        // Direct edge is 1 hop; the detour is 3.
        let shallow = run(&store, "s", "t", 1, 10);
        assert_eq!(shallow.paths.len(), 1);
        let deep = run(&store, "s", "t", 3, 10);
        assert_eq!(deep.paths.len(), 2);
        for path in &deep.paths {
            assert!(path.len() - 1 <= 3, "path exceeds depth bound");
        }
    }

    #[test]
    fn max_paths_truncates() {
        let store = call_store(
            &["s", "a", "b", "c", "t"],
            &[("s", "a"), ("s", "b"), ("s", "c"), ("a", "t"), ("b", "t"), ("c", "t")],
        );
        let result = run(&store, "s", "t", 4, 2);
        assert_eq!(result.paths.len(), 2);
        assert!(result.truncated);
    }

    #[test]
    fn cycles_do_not_loop_forever() {
        let store = call_store(&["s", "x", "t"], &[("s", "x"), ("x", "s"), ("x", "t")]);
        let result = run(&store, "s", "t", 10, 100);
        assert_eq!(result.paths.len(), 1);
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let store = call_store(&["s"], &[]);
        let missing = NodeKey::function(store.symbols(), "app", "ghost", 0);
        let err = find_paths(
            &store.snapshot(),
            &func(&store, "s"),
            &missing,
            3,
            10,
            1_000,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn heavy_fanout_attaches_warning() {
        let names: Vec<String> = (0..30).map(|i| format!("n{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut calls: Vec<(&str, &str)> = Vec::new();
        for i in 0..29 {
            calls.push(("n00", refs[i + 1]));
            calls.push((refs[i + 1], "n29"));
        }
        let store = call_store(&refs, &calls);
        let result = find_paths(
            &store.snapshot(),
            &func(&store, "n00"),
            &func(&store, "n29"),
            3,
            1_000,
            10,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(result.warning.is_some());
        assert!(!result.paths.is_empty());
    }
}
