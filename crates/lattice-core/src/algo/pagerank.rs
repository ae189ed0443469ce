//! PageRank over the call-graph projection

use super::Projection;
use crate::cancel::CancelToken;
use crate::config::PageRankConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::NodeKey;

#[derive(Debug, Clone)]
pub struct PageRankScores {
    /// Descending by score, canonical-id tie-breaks.
    pub scores: Vec<(NodeKey, f64)>,
    pub iterations: usize,
    pub converged: bool,
}

/// Iterative power method. Dangling nodes (no out-edges) redistribute
/// their mass uniformly, which keeps the scores strictly positive and
/// summing to ~1 across the projection.
pub fn pagerank(
    proj: &Projection,
    config: &PageRankConfig,
    cancel: &CancelToken,
) -> CoreResult<PageRankScores> {
    let n = proj.len();
    if n == 0 {
        return Ok(PageRankScores {
            scores: Vec::new(),
            iterations: 0,
            converged: true,
        });
    }

    let d = config.damping;
    let uniform = 1.0 / n as f64;
    let mut scores = vec![uniform; n];
    let mut next = vec![0.0f64; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        iterations += 1;

        let dangling_mass: f64 = (0..n)
            .filter(|&i| proj.out[i].is_empty())
            .map(|i| scores[i])
            .sum();

        let base = (1.0 - d) * uniform + d * dangling_mass * uniform;
        next.iter_mut().for_each(|x| *x = base);
        for i in 0..n {
            let out = &proj.out[i];
            if !out.is_empty() {
                let share = d * scores[i] / out.len() as f64;
                for &j in out {
                    next[j] += share;
                }
            }
        }

        let delta: f64 = scores
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .sum();
        std::mem::swap(&mut scores, &mut next);
        if delta < config.tolerance {
            converged = true;
            break;
        }
    }

    let mut ranked: Vec<(NodeKey, f64)> = proj
        .keys
        .iter()
        .cloned()
        .zip(scores)
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ia = proj.index_of(&a.0).unwrap_or(0);
                let ib = proj.index_of(&b.0).unwrap_or(0);
                proj.canon[ia].cmp(&proj.canon[ib])
            })
    });

    Ok(PageRankScores {
        scores: ranked,
        iterations,
        converged,
    })
}
