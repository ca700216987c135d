use serde::{Deserialize, Serialize};

use crate::space::{SparseVector, SparseVectorSpace};
use crate::PostingId;

/// A windowed posting sharing at least one concept with a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relevance {
    pub id: PostingId,
    /// Weighted count of shared concepts.
    pub weight: f64,
}

/// Outcome of scoring a concept list against the current space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredQuery {
    /// Recognised concept occurrences in the query (`|Q|`).
    pub query_concepts: usize,
    /// Results in matrix column order.
    pub relevance: Vec<Relevance>,
}

impl ScoredQuery {
    /// `weight / |Q|` for each result, or `None` when nothing was recognised.
    pub fn normalized(&self) -> Option<Vec<(PostingId, f64)>> {
        if self.query_concepts == 0 {
            return None;
        }
        Some(self.relevance.iter().filter_map(|r| Some((r.id, normalize(r.weight, self.query_concepts)?))).collect())
    }

    pub fn ids(&self) -> Vec<PostingId> { self.relevance.iter().map(|r| r.id).collect() }
}

pub struct RelevanceScorer<'a> {
    space: &'a SparseVectorSpace,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(space: &'a SparseVectorSpace) -> Self { Self { space } }

    /// `matrixᵀ · query`, keeping only non-zero weights, in column order.
    pub fn score(&self, query: &SparseVector) -> Vec<Relevance> {
        if query.is_empty() || self.space.matrix().cols() == 0 {
            return Vec::new();
        }
        let occurrences = self.space.matrix().multiply_t(query);
        occurrences
            .into_iter()
            .zip(self.space.window())
            .filter(|(weight, _)| *weight != 0.0)
            .map(|(weight, &id)| Relevance { id, weight })
            .collect()
    }

    pub fn score_concepts<S: AsRef<str>>(&self, concepts: &[S]) -> ScoredQuery {
        let query = self.space.project_vector(concepts);
        ScoredQuery { query_concepts: query.total() as usize, relevance: self.score(&query) }
    }
}

/// Average relevance of a raw weight over `total_query_concepts`.
pub fn normalize(raw_weight: f64, total_query_concepts: usize) -> Option<f64> {
    if total_query_concepts == 0 {
        return None;
    }
    Some(raw_weight / total_query_concepts as f64)
}

/// Orders results by weight descending, then id ascending.
pub fn rank(results: &mut [Relevance]) {
    results.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_requires_recognised_concepts() {
        assert_eq!(normalize(2.0, 4), Some(0.5));
        assert_eq!(normalize(2.0, 0), None);
    }

    #[test]
    fn rank_breaks_ties_by_id() {
        let mut r = vec![
            Relevance { id: 9, weight: 1.0 },
            Relevance { id: 2, weight: 3.0 },
            Relevance { id: 4, weight: 1.0 },
        ];
        rank(&mut r);
        let ids: Vec<_> = r.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![2, 4, 9]);
    }

    #[test]
    fn rank_orders_nan_weights_consistently() {
        let mut r = vec![
            Relevance { id: 1, weight: 1.0 },
            Relevance { id: 5, weight: f64::NAN },
            Relevance { id: 3, weight: 3.0 },
            Relevance { id: 2, weight: 1.0 },
        ];
        rank(&mut r);
        let ids: Vec<_> = r.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![5, 3, 1, 2]);
    }
}
