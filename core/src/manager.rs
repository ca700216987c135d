use parking_lot::RwLock;
use std::ops::Deref;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::relevance::{RelevanceScorer, ScoredQuery};
use crate::space::SparseVectorSpace;
use crate::Posting;

/// A published feature space together with the reset that produced it.
#[derive(Debug, Clone)]
pub struct SpaceHandle {
    generation: u64,
    space: Arc<SparseVectorSpace>,
}

impl SpaceHandle {
    pub fn generation(&self) -> u64 { self.generation }
}

impl Deref for SpaceHandle {
    type Target = SparseVectorSpace;
    fn deref(&self) -> &SparseVectorSpace { &self.space }
}

/// Owns the lifecycle of the concept feature space.
///
/// A reset builds the vocabulary, matrix and window off to the side and then
/// swaps them in as one snapshot, so readers only ever see a complete space.
pub struct FeatureSpaceManager {
    current: RwLock<SpaceHandle>,
}

impl FeatureSpaceManager {
    pub fn new(now: OffsetDateTime) -> Self {
        Self { current: RwLock::new(SpaceHandle { generation: 0, space: Arc::new(SparseVectorSpace::empty(now)) }) }
    }

    /// Rebuilds the space from `postings` and publishes it as a new generation.
    pub fn reset(&self, postings: &[Posting], now: OffsetDateTime) -> SpaceHandle {
        self.publish(SparseVectorSpace::rebuild(postings, now))
    }

    /// Publishes an already built space as a new generation.
    pub fn publish(&self, space: SparseVectorSpace) -> SpaceHandle {
        let mut current = self.current.write();
        let handle = SpaceHandle { generation: current.generation + 1, space: Arc::new(space) };
        *current = handle.clone();
        tracing::info!(
            generation = handle.generation,
            window = handle.window().len(),
            concepts = handle.vocabulary().len(),
            "feature space reset"
        );
        handle
    }

    /// The most recently published space.
    pub fn current(&self) -> SpaceHandle { self.current.read().clone() }

    pub fn generation(&self) -> u64 { self.current.read().generation }

    /// Scores through a previously obtained handle, rejecting handles from an earlier reset.
    pub fn score_with<S: AsRef<str>>(&self, handle: &SpaceHandle, concepts: &[S]) -> Result<ScoredQuery> {
        let current = self.generation();
        if handle.generation != current {
            return Err(Error::StaleSpace { handle: handle.generation, current });
        }
        Ok(RelevanceScorer::new(handle).score_concepts(concepts))
    }

    /// Scores against the current space.
    pub fn relevant<S: AsRef<str>>(&self, concepts: &[S]) -> ScoredQuery {
        let handle = self.current();
        RelevanceScorer::new(&handle).score_concepts(concepts)
    }

    /// Keeps the concepts the current space can score against, in input order.
    pub fn known_concepts<S: AsRef<str>>(&self, concepts: &[S]) -> Vec<String> {
        let handle = self.current();
        concepts
            .iter()
            .map(AsRef::as_ref)
            .filter(|c| handle.vocabulary().contains(c))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Location, Posting};
    use time::macros::datetime;

    fn posting(id: u64, concepts: &[&str]) -> Posting {
        Posting {
            id,
            uri: None,
            url: None,
            date: datetime!(2016-06-10 12:00 UTC),
            title: format!("job {id}"),
            description: String::new(),
            location: Location { name: "Ljubljana".into(), coord: None, country: "Slovenia".into(), uri: None, country_uri: None },
            organization: String::new(),
            source: None,
            skills: vec![],
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn stale_handles_are_rejected() {
        let now = datetime!(2016-06-12 0:00 UTC);
        let manager = FeatureSpaceManager::new(now);
        let first = manager.reset(&[posting(0, &["Rust"])], now);
        assert!(manager.score_with(&first, &["Rust"]).is_ok());

        manager.reset(&[posting(0, &["Rust"]), posting(1, &["Go"])], now);
        match manager.score_with(&first, &["Rust"]) {
            Err(Error::StaleSpace { handle: 1, current: 2 }) => {}
            other => panic!("expected stale handle, got {other:?}"),
        }
    }

    #[test]
    fn empty_manager_scores_nothing() {
        let manager = FeatureSpaceManager::new(datetime!(2016-06-12 0:00 UTC));
        let scored = manager.relevant(&["Rust"]);
        assert_eq!(scored.query_concepts, 0);
        assert!(scored.relevance.is_empty());
    }

    #[test]
    fn known_concepts_filters_unseen_names() {
        let now = datetime!(2016-06-12 0:00 UTC);
        let manager = FeatureSpaceManager::new(now);
        manager.reset(&[posting(0, &["Rust", "Linux"])], now);
        assert_eq!(manager.known_concepts(&["Linux", "Cobol", "Rust"]), vec!["Linux", "Rust"]);
    }
}
