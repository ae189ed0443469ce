//! Hybrid retrieval pipeline: expansion, candidates, fusion, re-ranking
//!
//! Each stage is a plain function with explicit inputs and outputs; the
//! engine threads them together (and a cancellation token) per query.

mod expand;
mod fuse;
mod rerank;

pub use expand::{ExpandedQuery, expand_query, tokenize_query};
pub use fuse::{FusedCandidate, reciprocal_rank_fusion};
pub use rerank::boost_for;

use crate::model::{NodeAttrs, NodeKey, NodeKind};
use crate::store::GraphSnapshot;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::{Deserialize, Serialize};

/// Search intents drive query expansion and re-ranking weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    #[default]
    General,
    Explain,
    Refactor,
    Debug,
}

/// Which pipeline a search request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    Hybrid,
    Semantic,
}

/// A ranked candidate produced by one retrieval stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: NodeKey,
    pub canonical: String,
}

/// Final result envelope item.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub key: String,
    pub kind: NodeKind,
    pub attrs: NodeAttrs,
    pub fused_score: f32,
    pub boost: f32,
    pub boosted_score: f32,
    pub intent: SearchIntent,
}

/// Lexical/graph candidate stage: nodes whose name, doc or file path
/// contain query tokens (with a fuzzy assist on the name), plus the
/// 1-hop neighborhood of the strongest matches. Deterministically
/// ordered by `(score desc, canonical)`.
pub fn lexical_candidates(
    snapshot: &GraphSnapshot,
    expanded: &ExpandedQuery,
    kind: Option<NodeKind>,
    limit: usize,
) -> Vec<Candidate> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, Candidate)> = Vec::new();

    for (key, attrs) in snapshot.list_nodes(kind, None) {
        let canonical = snapshot.canonical(&key);
        let name = name_part(&canonical);
        let mut score = 0i64;
        for term in &expanded.terms {
            let term = term.to_lowercase();
            if name.to_lowercase().contains(&term) {
                score += 100;
            }
            if let Some(doc) = &attrs.doc {
                if doc.to_lowercase().contains(&term) {
                    score += 25;
                }
            }
            if let Some(file) = &attrs.file {
                if file.to_string_lossy().to_lowercase().contains(&term) {
                    score += 15;
                }
            }
        }
        if let Some(fuzzy) = matcher.fuzzy_match(name, &expanded.original) {
            score += fuzzy / 10;
        }
        if score > 0 {
            scored.push((score, Candidate { key, canonical }));
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.canonical.cmp(&b.1.canonical)));
    scored.truncate(limit);

    // 1-hop neighbors of direct hits join the candidate pool at the tail.
    let mut out: Vec<Candidate> = scored.into_iter().map(|(_, c)| c).collect();
    let mut seen: std::collections::HashSet<NodeKey> =
        out.iter().map(|c| c.key.clone()).collect();
    let mut neighbors: Vec<Candidate> = Vec::new();
    for candidate in &out {
        for edge in snapshot
            .outgoing(&candidate.key, None)
            .into_iter()
            .chain(snapshot.incoming(&candidate.key, None))
        {
            for peer in [edge.from, edge.to] {
                if kind.is_some_and(|k| peer.kind != k) {
                    continue;
                }
                if seen.insert(peer.clone()) {
                    neighbors.push(Candidate {
                        canonical: snapshot.canonical(&peer),
                        key: peer,
                    });
                }
            }
        }
    }
    neighbors.sort_by(|a, b| a.canonical.cmp(&b.canonical));
    out.extend(neighbors);
    out.truncate(limit.saturating_mul(2));
    out
}

/// The display name inside a canonical id: the last `::` segment with
/// any arity suffix stripped.
pub(crate) fn name_part(canonical: &str) -> &str {
    let after_kind = canonical.split_once(':').map(|(_, rest)| rest).unwrap_or(canonical);
    let last = after_kind.rsplit("::").next().unwrap_or(after_kind);
    last.split_once('/').map(|(name, _)| name).unwrap_or(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeAttrs;
    use crate::store::GraphStore;
    use crate::symbols::SymbolTable;
    use std::sync::Arc;

    fn store_with_docs(entries: &[(&str, &str)]) -> GraphStore {
        let symbols = Arc::new(SymbolTable::new());
        let mut store = GraphStore::new(symbols.clone());
        for (name, doc) in entries {
            let key = NodeKey::function(&symbols, "app", name, 1);
            let attrs = NodeAttrs {
                doc: Some(doc.to_string()),
                ..Default::default()
            };
            store.upsert_node(key, attrs).unwrap();
        }
        store
    }

    #[test]
    fn name_part_strips_kind_module_and_arity() {
        assert_eq!(name_part("function:auth::validate_email/1"), "validate_email");
        assert_eq!(name_part("module:auth"), "auth");
        assert_eq!(name_part("type:auth::Token"), "Token");
    }

    #[test]
    fn name_match_outranks_doc_match() {
        let store = store_with_docs(&[
            ("validate_email", "checks an address"),
            ("helper", "validate email addresses for the app"),
        ]);
        let expanded = expand_query("validate email", SearchIntent::General, 8);
        let candidates = lexical_candidates(&store.snapshot(), &expanded, None, 10);
        assert_eq!(name_part(&candidates[0].canonical), "validate_email");
    }

    #[test]
    fn neighbors_of_hits_are_pulled_in() {
        let symbols = Arc::new(SymbolTable::new());
        let mut store = GraphStore::new(symbols.clone());
        let hit = NodeKey::function(&symbols, "app", "parse_config", 1);
        let neighbor = NodeKey::function(&symbols, "app", "unrelated_name", 0);
        store.upsert_node(hit.clone(), NodeAttrs::default()).unwrap();
        store.upsert_node(neighbor.clone(), NodeAttrs::default()).unwrap();
        store
            .add_edge(&hit, &neighbor, crate::model::EdgeKind::Calls, None, Default::default())
            .unwrap();

        let expanded = expand_query("parse config", SearchIntent::General, 8);
        let candidates = lexical_candidates(&store.snapshot(), &expanded, None, 10);
        assert!(candidates.iter().any(|c| c.key == neighbor));
        // Direct hits stay ahead of pulled-in neighbors.
        assert_eq!(candidates[0].key, hit);
    }
}
