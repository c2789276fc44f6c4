//! HybridSearch — embed a query, issue dense + sparse sub-requests, fuse by
//! Reciprocal Rank Fusion, post-filter, return ranked hits (spec.md §4.8).

use std::collections::BTreeMap;

use crate::embedding::EmbeddingClient;
use crate::error::{IndexError, Recoverability};
use crate::filter::Expr;
use crate::vector_store::{Document, Hit, SubRequest, VectorStore};

/// The RRF constant (spec.md §9 "Design notes": "chosen to match existing
/// operational data ... flag any change as a behavioral break").
pub const RRF_K: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub filter_expr: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f64,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub hits: Vec<ScoredDocument>,
    /// True when the collection is dense-only and RRF fusion degraded to a
    /// dense-only ranking (spec.md §4.8 edge case).
    pub degraded_mode: bool,
}

pub struct HybridSearch<'a> {
    embedding: &'a EmbeddingClient,
    store: &'a VectorStore,
}

impl<'a> HybridSearch<'a> {
    pub fn new(embedding: &'a EmbeddingClient, store: &'a VectorStore) -> Self {
        Self { embedding, store }
    }

    pub async fn search(
        &self,
        collection_name: &str,
        query_text: &str,
        collection_dimension: usize,
        collection_is_hybrid: bool,
        options: SearchOptions,
    ) -> Result<SearchOutcome, IndexError> {
        let embedded = self.embedding.embed(query_text).await?;
        if embedded.dimension != collection_dimension {
            return Err(IndexError::SchemaMismatch { expected: collection_dimension, got: embedded.dimension });
        }

        let dense_req = SubRequest::dense(embedded.vector, options.limit);
        let dense_result = self.store.hybrid_search_sub_request(collection_name, &dense_req).await;

        let (lists, degraded_mode) = if collection_is_hybrid {
            let sparse_req = SubRequest::sparse(query_text.to_string(), options.limit);
            let sparse_result = self.store.hybrid_search_sub_request(collection_name, &sparse_req).await;

            match (dense_result, sparse_result) {
                (Ok(d), Ok(s)) => (vec![d, s], false),
                (Ok(d), Err(_)) => (vec![d], false),
                (Err(_), Ok(s)) => (vec![s], false),
                (Err(de), Err(se)) => {
                    return Err(IndexError::VectorStore {
                        message: format!("both sub-requests failed: dense={de}, sparse={se}"),
                        recoverability: Recoverability::NonRecoverable,
                    })
                }
            }
        } else {
            let dense = dense_result?;
            (vec![dense], true)
        };

        let fused = reciprocal_rank_fusion(&lists, RRF_K);

        let filtered: Vec<ScoredDocument> = fused
            .into_iter()
            .filter(|sd| match &options.filter_expr {
                Some(expr) => crate::filter::eval(expr, &sd.document),
                None => true,
            })
            .collect();

        let mut ranked = filtered;
        ranked.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.document.id.cmp(&b.document.id))
        });
        ranked.truncate(options.limit);

        Ok(SearchOutcome { hits: ranked, degraded_mode })
    }
}

/// `score(d) = Σ_i 1 / (k + r_i)` over every ranked list `d` appears in,
/// 1-based rank (spec.md §4.8 step 3, §8.4 scenario 5).
pub fn reciprocal_rank_fusion(lists: &[Vec<Hit>], k: f64) -> Vec<ScoredDocument> {
    let mut scores: BTreeMap<String, f64> = BTreeMap::new();
    let mut documents: BTreeMap<String, Document> = BTreeMap::new();

    for list in lists {
        for (idx, hit) in list.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(hit.document.id.clone()).or_insert(0.0) += 1.0 / (k + rank);
            documents.entry(hit.document.id.clone()).or_insert_with(|| hit.document.clone());
        }
    }

    let mut out: Vec<ScoredDocument> = scores
        .into_iter()
        .filter_map(|(id, score)| documents.remove(&id).map(|document| ScoredDocument { document, score }))
        .collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.document.id.cmp(&b.document.id)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            relative_path: format!("src/{id}.ts"),
            content: "fn x() {}".to_string(),
            start_line: 1,
            end_line: 1,
            file_extension: "ts".to_string(),
            metadata: Map::new(),
        }
    }

    fn hit(id: &str, score: f32) -> Hit {
        Hit { document: doc(id), score }
    }

    #[test]
    fn fuses_scores_matching_worked_example() {
        // spec.md §8.4 scenario 5
        let dense = vec![hit("d1", 0.0), hit("d2", 0.0), hit("d3", 0.0)];
        let sparse = vec![hit("d3", 0.0), hit("d4", 0.0), hit("d5", 0.0)];

        let fused = reciprocal_rank_fusion(&[dense, sparse], 100.0);
        let score_of = |id: &str| fused.iter().find(|sd| sd.document.id == id).unwrap().score;

        assert!((score_of("d1") - 1.0 / 101.0).abs() < 1e-9);
        assert!((score_of("d2") - 1.0 / 102.0).abs() < 1e-9);
        assert!((score_of("d3") - (1.0 / 103.0 + 1.0 / 101.0)).abs() < 1e-9);
        assert!((score_of("d4") - 1.0 / 102.0).abs() < 1e-9);
        assert!((score_of("d5") - 1.0 / 103.0).abs() < 1e-9);

        assert_eq!(fused[0].document.id, "d3");
        assert_eq!(fused[1].document.id, "d1");
        // d2 and d4 tie; lexicographic tie-break picks d2 before d4.
        assert_eq!(fused[2].document.id, "d2");
        assert_eq!(fused[3].document.id, "d4");
    }

    #[test]
    fn documents_in_only_one_list_contribute_one_term() {
        let dense = vec![hit("a", 0.0)];
        let fused = reciprocal_rank_fusion(&[dense, vec![]], 100.0);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 101.0).abs() < 1e-9);
    }

    #[test]
    fn empty_lists_produce_no_hits() {
        let fused = reciprocal_rank_fusion(&[vec![], vec![]], 100.0);
        assert!(fused.is_empty());
    }
}
