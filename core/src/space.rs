use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

use crate::vocabulary::ConceptVocabulary;
use crate::{ConceptId, Posting, PostingId};

/// Trailing span, in days, of postings encoded into the feature space.
pub const WINDOW_DAYS: i64 = 14;

/// Sparse vector over concept ids, entries sorted by id with no zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(ConceptId, f64)>,
}

impl SparseVector {
    pub fn from_counts(counts: BTreeMap<ConceptId, u32>) -> Self {
        let entries = counts
            .into_iter()
            .filter(|(_, c)| *c > 0)
            .map(|(id, c)| (id, c as f64))
            .collect();
        Self { entries }
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Sum of all weights, i.e. the number of recognised concept occurrences.
    pub fn total(&self) -> f64 { self.entries.iter().map(|(_, w)| w).sum() }

    pub fn get(&self, id: ConceptId) -> f64 {
        match self.entries.binary_search_by_key(&id, |(i, _)| *i) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConceptId, f64)> + '_ { self.entries.iter().copied() }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (a, wa) = self.entries[i];
            let (b, wb) = other.entries[j];
            if a == b {
                acc += wa * wb;
                i += 1;
                j += 1;
            } else if a < b {
                i += 1;
            } else {
                j += 1;
            }
        }
        acc
    }
}

/// Concept × posting matrix stored column-wise, one column per windowed posting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptMatrix {
    rows: usize,
    columns: Vec<SparseVector>,
}

impl ConceptMatrix {
    pub fn rows(&self) -> usize { self.rows }

    pub fn cols(&self) -> usize { self.columns.len() }

    pub fn column(&self, col: usize) -> Option<&SparseVector> { self.columns.get(col) }

    /// `selfᵀ · v`: one entry per column.
    pub fn multiply_t(&self, v: &SparseVector) -> Vec<f64> {
        self.columns.iter().map(|col| col.dot(v)).collect()
    }
}

/// Bag-of-concepts encoding of the postings published within the window.
#[derive(Debug, Clone)]
pub struct SparseVectorSpace {
    vocabulary: ConceptVocabulary,
    matrix: ConceptMatrix,
    window: Vec<PostingId>,
    built_at: OffsetDateTime,
}

impl SparseVectorSpace {
    /// A space with no postings and no concepts.
    pub fn empty(now: OffsetDateTime) -> Self {
        Self { vocabulary: ConceptVocabulary::new(), matrix: ConceptMatrix::default(), window: Vec::new(), built_at: now }
    }

    /// Encodes every posting dated after `now - WINDOW_DAYS`, in input order.
    pub fn rebuild(postings: &[Posting], now: OffsetDateTime) -> Self {
        let cutoff = window_cutoff(now);
        let mut vocabulary = ConceptVocabulary::new();
        let mut columns = Vec::new();
        let mut window = Vec::new();
        for posting in postings.iter().filter(|p| p.date > cutoff) {
            let mut counts: BTreeMap<ConceptId, u32> = BTreeMap::new();
            for concept in &posting.concepts {
                *counts.entry(vocabulary.insert(concept)).or_insert(0) += 1;
            }
            columns.push(SparseVector::from_counts(counts));
            window.push(posting.id);
        }
        let matrix = ConceptMatrix { rows: vocabulary.len(), columns };
        tracing::debug!(postings = window.len(), concepts = vocabulary.len(), "feature space rebuilt");
        Self { vocabulary, matrix, window, built_at: now }
    }

    /// Encodes a concept multiset over the current vocabulary; unknown names are dropped.
    pub fn project_vector<S: AsRef<str>>(&self, concepts: &[S]) -> SparseVector {
        let mut counts: BTreeMap<ConceptId, u32> = BTreeMap::new();
        for concept in concepts {
            if let Some(id) = self.vocabulary.get(concept.as_ref()) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        SparseVector::from_counts(counts)
    }

    pub fn vocabulary(&self) -> &ConceptVocabulary { &self.vocabulary }

    pub fn matrix(&self) -> &ConceptMatrix { &self.matrix }

    /// Posting ids aligned with matrix columns.
    pub fn window(&self) -> &[PostingId] { &self.window }

    pub fn built_at(&self) -> OffsetDateTime { self.built_at }

    pub fn cutoff(&self) -> OffsetDateTime { window_cutoff(self.built_at) }
}

pub fn window_cutoff(now: OffsetDateTime) -> OffsetDateTime {
    now - Duration::days(WINDOW_DAYS)
}
