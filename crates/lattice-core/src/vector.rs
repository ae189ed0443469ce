//! Per-entity embedding table with cosine-similarity search
//!
//! A brute-force scan is the contract here, not an ANN structure: one
//! vector per code entity keeps the table small enough that a
//! rayon-parallel dot-product pass is fast and exact.

use crate::error::{CoreError, CoreResult};
use crate::model::{NodeKey, NodeKind};
use crate::symbols::SymbolTable;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// L2-normalized vector; dot product equals cosine similarity.
    pub vector: Vec<f32>,
    /// The text the vector was computed from; compared on re-ingest to
    /// decide whether a node needs re-embedding.
    pub source_text: String,
    canonical: String,
}

/// A scored search hit, descending by score, ties broken by canonical id.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub key: NodeKey,
    pub canonical: String,
    pub score: f32,
}

/// Exclusively owns embedding storage. All vectors share the dimensionality
/// of the active model; inserts of a different width are rejected.
pub struct VectorIndex {
    symbols: Arc<SymbolTable>,
    model_id: String,
    dims: usize,
    records: HashMap<NodeKey, EmbeddingRecord>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model_id", &self.model_id)
            .field("dims", &self.dims)
            .field("size", &self.records.len())
            .finish()
    }
}

impl VectorIndex {
    pub fn new(symbols: Arc<SymbolTable>, model_id: impl Into<String>, dims: usize) -> Self {
        VectorIndex {
            symbols,
            model_id: model_id.into(),
            dims,
            records: HashMap::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store the embedding for a node, replacing any previous one. The
    /// vector is normalized before storage.
    pub fn upsert(
        &mut self,
        key: NodeKey,
        vector: Vec<f32>,
        source_text: String,
    ) -> CoreResult<()> {
        if vector.len() != self.dims {
            return Err(CoreError::InvalidArgument(format!(
                "embedding dims mismatch: index is {}, got {}",
                self.dims,
                vector.len()
            )));
        }
        let canonical = key.canonical(&self.symbols);
        self.records.insert(
            key,
            EmbeddingRecord {
                vector: normalize(vector),
                source_text,
                canonical,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, key: &NodeKey) -> bool {
        self.records.remove(key).is_some()
    }

    pub fn get(&self, key: &NodeKey) -> Option<&EmbeddingRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Reset model identity and dimensionality, dropping all records.
    pub fn reset_model(&mut self, model_id: impl Into<String>, dims: usize) {
        self.model_id = model_id.into();
        self.dims = dims;
        self.records.clear();
    }

    /// Top-k cosine search. Scores below `threshold` are elided; results
    /// descend by score with canonical-id tie-breaks, so identical inputs
    /// return byte-identical orderings.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
        kind_filter: Option<NodeKind>,
    ) -> CoreResult<Vec<SearchHit>> {
        if query.len() != self.dims {
            return Err(CoreError::InvalidArgument(format!(
                "query dims mismatch: index is {}, got {}",
                self.dims,
                query.len()
            )));
        }
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        let query = normalize(query.to_vec());

        let mut hits: Vec<SearchHit> = self
            .records
            .par_iter()
            .filter(|(key, _)| kind_filter.is_none_or(|kind| key.kind == kind))
            .filter_map(|(key, record)| {
                let score = dot(&query, &record.vector);
                (score >= threshold).then(|| SearchHit {
                    key: key.clone(),
                    canonical: record.canonical.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.canonical.cmp(&b.canonical))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Entries in canonical order, for persistence and duplicate scans.
    pub fn entries_sorted(&self) -> Vec<(&NodeKey, &EmbeddingRecord)> {
        let mut entries: Vec<_> = self.records.iter().collect();
        entries.sort_by(|a, b| a.1.canonical.cmp(&b.1.canonical));
        entries
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(dims: usize) -> VectorIndex {
        VectorIndex::new(Arc::new(SymbolTable::new()), "feature-hash-test", dims)
    }

    fn key(index: &VectorIndex, module: &str, name: &str) -> NodeKey {
        NodeKey::function(&index.symbols, module, name, 0)
    }

    #[test]
    fn upsert_and_search_ranks_exact_match_first() {
        let mut idx = index(3);
        let a = key(&idx, "m", "a");
        let b = key(&idx, "m", "b");
        idx.upsert(a.clone(), vec![1.0, 0.0, 0.0], "a".into()).unwrap();
        idx.upsert(b.clone(), vec![0.6, 0.8, 0.0], "b".into()).unwrap();

        let hits = idx.search(&[1.0, 0.0, 0.0], 10, -1.0, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, a);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn dims_mismatch_is_rejected() {
        let mut idx = index(3);
        let k = key(&idx, "m", "a");
        let err = idx.upsert(k, vec![1.0, 0.0], "a".into()).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert_eq!(idx.size(), 0);

        let err = idx.search(&[1.0, 0.0], 5, 0.0, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn threshold_monotonicity() {
        let mut idx = index(2);
        for (i, v) in [[1.0, 0.0], [0.9, 0.435], [0.0, 1.0], [-1.0, 0.0]]
            .iter()
            .enumerate()
        {
            let k = key(&idx, "m", &format!("f{i}"));
            idx.upsert(k, v.to_vec(), format!("f{i}")).unwrap();
        }
        let query = [1.0, 0.0];
        let loose = idx.search(&query, 10, 0.1, None).unwrap();
        let tight = idx.search(&query, 10, 0.8, None).unwrap();
        for hit in &tight {
            assert!(
                loose.iter().any(|l| l.key == hit.key),
                "tight results must be a subset of loose results"
            );
        }
        assert!(tight.len() <= loose.len());
    }

    #[test]
    fn equal_scores_break_ties_lexicographically() {
        let mut idx = index(2);
        let b = key(&idx, "m", "bbb");
        let a = key(&idx, "m", "aaa");
        // Same vector -> same score for any query.
        idx.upsert(b.clone(), vec![1.0, 0.0], "b".into()).unwrap();
        idx.upsert(a.clone(), vec![1.0, 0.0], "a".into()).unwrap();

        for _ in 0..5 {
            let hits = idx.search(&[0.7, 0.2], 10, -1.0, None).unwrap();
            assert_eq!(hits[0].key, a);
            assert_eq!(hits[1].key, b);
        }
    }

    #[test]
    fn kind_filter_restricts_results() {
        let mut idx = index(2);
        let func = key(&idx, "m", "f");
        let module = NodeKey::module(&idx.symbols, "m");
        idx.upsert(func.clone(), vec![1.0, 0.0], "f".into()).unwrap();
        idx.upsert(module, vec![1.0, 0.0], "m".into()).unwrap();

        let hits = idx
            .search(&[1.0, 0.0], 10, 0.0, Some(NodeKind::Function))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, func);
    }

    #[test]
    fn remove_deletes_record() {
        let mut idx = index(2);
        let k = key(&idx, "m", "f");
        idx.upsert(k.clone(), vec![1.0, 0.0], "f".into()).unwrap();
        assert!(idx.remove(&k));
        assert!(!idx.remove(&k));
        assert!(idx.get(&k).is_none());
    }

    #[test]
    fn k_bounds_result_length() {
        let mut idx = index(2);
        for i in 0..20 {
            let k = key(&idx, "m", &format!("f{i:02}"));
            idx.upsert(k, vec![1.0, i as f32 / 20.0], format!("f{i}")).unwrap();
        }
        assert_eq!(idx.search(&[1.0, 0.0], 7, -1.0, None).unwrap().len(), 7);
    }
}
