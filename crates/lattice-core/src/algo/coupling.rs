//! Afferent/efferent coupling and instability per module

use super::Projection;
use crate::error::{CoreError, CoreResult};
use crate::model::NodeKey;
use crate::store::GraphSnapshot;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize)]
pub struct ModuleCoupling {
    pub module: String,
    /// Distinct external modules depending on this module.
    pub afferent: usize,
    /// Distinct external modules this module depends on.
    pub efferent: usize,
    /// `efferent / (afferent + efferent)`, 0 for isolated modules.
    pub instability: f64,
}

/// Coupling metrics over the module graph (imports + inter-module call
/// rollup). `module = None` reports every module in canonical order; the
/// transitive variant counts BFS closures instead of direct neighbors.
pub fn coupling(
    snapshot: &GraphSnapshot,
    module: Option<&NodeKey>,
    transitive: bool,
) -> CoreResult<Vec<ModuleCoupling>> {
    let proj = Projection::module_graph(snapshot);
    let targets: Vec<usize> = match module {
        Some(key) => {
            let idx = proj
                .index_of(key)
                .ok_or_else(|| CoreError::NotFound(snapshot.canonical(key)))?;
            vec![idx]
        }
        None => (0..proj.len()).collect(),
    };

    Ok(targets
        .into_iter()
        .map(|i| {
            let (afferent, efferent) = if transitive {
                (closure(&proj.inn, i), closure(&proj.out, i))
            } else {
                (proj.inn[i].len(), proj.out[i].len())
            };
            let total = afferent + efferent;
            let instability = if total == 0 {
                0.0
            } else {
                efferent as f64 / total as f64
            };
            ModuleCoupling {
                module: proj.canon[i].clone(),
                afferent,
                efferent,
                instability,
            }
        })
        .collect())
}

/// Size of the BFS closure from `start` along `adjacency`, excluding
/// `start` itself.
fn closure(adjacency: &[Vec<usize>], start: usize) -> usize {
    let mut seen = vec![false; adjacency.len()];
    seen[start] = true;
    let mut queue = VecDeque::from([start]);
    let mut count = 0;
    while let Some(v) = queue.pop_front() {
        for &w in &adjacency[v] {
            if !seen[w] {
                seen[w] = true;
                count += 1;
                queue.push_back(w);
            }
        }
    }
    count
}
