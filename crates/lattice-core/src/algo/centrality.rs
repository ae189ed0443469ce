//! Degree, betweenness and closeness centrality

use super::Projection;
use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use crate::model::NodeKey;
use crate::store::GraphSnapshot;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DegreeCentrality {
    pub in_degree: usize,
    pub out_degree: usize,
    pub total_degree: usize,
}

/// Per-node degree over every edge kind; one pass over the forward
/// adjacency per node. Ordered by canonical id.
pub fn degree(snapshot: &GraphSnapshot) -> Vec<(NodeKey, DegreeCentrality)> {
    snapshot
        .list_nodes(None, None)
        .into_iter()
        .map(|(key, _)| {
            let out_degree = snapshot.outgoing(&key, None).len();
            let in_degree = snapshot.incoming(&key, None).len();
            (
                key,
                DegreeCentrality {
                    in_degree,
                    out_degree,
                    total_degree: in_degree + out_degree,
                },
            )
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BetweennessResult {
    /// Descending by score, canonical tie-breaks.
    pub scores: Vec<(NodeKey, f64)>,
    /// True when the node budget truncated the source set. Brandes is
    /// O(V·E); the budget keeps dense graphs from monopolizing a core.
    pub partial: bool,
    pub sources_used: usize,
}

const CANCEL_CHUNK: usize = 64;

/// Brandes' algorithm, capped at `budget` source nodes. Sources beyond
/// the budget are dropped (canonical order decides which stay) and the
/// result is flagged partial.
pub fn betweenness(
    proj: &Projection,
    budget: usize,
    cancel: &CancelToken,
) -> CoreResult<BetweennessResult> {
    let n = proj.len();
    let sources_used = n.min(budget);
    let partial = n > budget;
    let mut centrality = vec![0.0f64; n];

    for chunk_start in (0..sources_used).step_by(CANCEL_CHUNK) {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let chunk_end = (chunk_start + CANCEL_CHUNK).min(sources_used);
        let partials: Vec<Vec<f64>> = (chunk_start..chunk_end)
            .into_par_iter()
            .map(|s| single_source_dependencies(proj, s))
            .collect();
        for partial_scores in partials {
            for (acc, value) in centrality.iter_mut().zip(partial_scores) {
                *acc += value;
            }
        }
    }

    let mut scores: Vec<(NodeKey, f64)> = proj.keys.iter().cloned().zip(centrality).collect();
    scores.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ia = proj.index_of(&a.0).unwrap_or(0);
                let ib = proj.index_of(&b.0).unwrap_or(0);
                proj.canon[ia].cmp(&proj.canon[ib])
            })
    });

    Ok(BetweennessResult {
        scores,
        partial,
        sources_used,
    })
}

/// One Brandes accumulation pass from source `s`.
fn single_source_dependencies(proj: &Projection, s: usize) -> Vec<f64> {
    let n = proj.len();
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut order = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    sigma[s] = 1.0;
    dist[s] = 0;
    queue.push_back(s);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &w in &proj.out[v] {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    let mut out = vec![0.0f64; n];
    for &w in order.iter().rev() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != s {
            out[w] += delta[w];
        }
    }
    out
}

/// Closeness per node: `(reachable - 1) / sum of BFS distances`;
/// unreachable pairs are skipped, isolated nodes score 0.
pub fn closeness(proj: &Projection, cancel: &CancelToken) -> CoreResult<Vec<(NodeKey, f64)>> {
    let n = proj.len();
    let mut scores = Vec::with_capacity(n);
    for (start, key) in proj.keys.iter().enumerate() {
        if start % CANCEL_CHUNK == 0 && cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let mut dist = vec![-1i64; n];
        let mut queue = VecDeque::new();
        dist[start] = 0;
        queue.push_back(start);
        let mut reachable = 0usize;
        let mut total = 0i64;
        while let Some(v) = queue.pop_front() {
            for &w in &proj.out[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    reachable += 1;
                    total += dist[w];
                    queue.push_back(w);
                }
            }
        }
        let score = if reachable == 0 || total == 0 {
            0.0
        } else {
            reachable as f64 / total as f64
        };
        scores.push((key.clone(), score));
    }
    Ok(scores)
}
