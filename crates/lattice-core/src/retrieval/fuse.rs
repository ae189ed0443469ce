//! Reciprocal-rank fusion of ranked candidate lists

use super::Candidate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub candidate: Candidate,
    pub fused_score: f32,
}

/// `score(d) = Σ_lists 1/(k + rank_in_list)`, rank starting at 1.
/// Absence from a list contributes nothing. Output descends by fused
/// score with canonical-id tie-breaks, so fusion is deterministic for
/// identical inputs.
pub fn reciprocal_rank_fusion(lists: &[Vec<Candidate>], k: f32) -> Vec<FusedCandidate> {
    let mut scores: HashMap<String, (Candidate, f32)> = HashMap::new();
    for list in lists {
        for (rank, candidate) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (rank + 1) as f32);
            scores
                .entry(candidate.canonical.clone())
                .and_modify(|(_, score)| *score += contribution)
                .or_insert_with(|| (candidate.clone(), contribution));
        }
    }

    let mut fused: Vec<FusedCandidate> = scores
        .into_values()
        .map(|(candidate, fused_score)| FusedCandidate {
            candidate,
            fused_score,
        })
        .collect();
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.canonical.cmp(&b.candidate.canonical))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKey;
    use crate::symbols::SymbolTable;

    fn candidates(symbols: &SymbolTable, names: &[&str]) -> Vec<Candidate> {
        names
            .iter()
            .map(|name| {
                let key = NodeKey::function(symbols, "m", name, 0);
                Candidate {
                    canonical: key.canonical(symbols),
                    key,
                }
            })
            .collect()
    }

    #[test]
    fn members_of_both_lists_rise() {
        let symbols = SymbolTable::new();
        let dense = candidates(&symbols, &["shared", "dense_only", "other"]);
        let lexical = candidates(&symbols, &["lex_only", "shared"]);

        let fused = reciprocal_rank_fusion(&[dense, lexical], 60.0);
        assert_eq!(
            super::super::name_part(&fused[0].candidate.canonical),
            "shared"
        );
        for pair in fused.windows(2) {
            assert!(pair[0].fused_score >= pair[1].fused_score);
        }
    }

    #[test]
    fn single_list_preserves_order() {
        let symbols = SymbolTable::new();
        let only = candidates(&symbols, &["first", "second", "third"]);
        let fused = reciprocal_rank_fusion(&[only.clone()], 60.0);
        let names: Vec<&str> = fused
            .iter()
            .map(|f| super::super::name_part(&f.candidate.canonical))
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn empty_input_fuses_to_empty() {
        assert!(reciprocal_rank_fusion(&[], 60.0).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], 60.0).is_empty());
    }

    #[test]
    fn equal_scores_tie_break_on_canonical() {
        let symbols = SymbolTable::new();
        let list_a = candidates(&symbols, &["bbb"]);
        let list_b = candidates(&symbols, &["aaa"]);
        // Both rank 1 in their own list -> identical scores.
        let fused = reciprocal_rank_fusion(&[list_a, list_b], 60.0);
        assert_eq!(super::super::name_part(&fused[0].candidate.canonical), "aaa");
    }
}
