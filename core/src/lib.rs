//! Job-postings analytics: a concept feature space for relevance scoring and
//! top-N statistics over a sled-backed posting store.

pub mod context;
pub mod error;
pub mod manager;
pub mod persist;
pub mod posting;
pub mod query;
pub mod relevance;
pub mod space;
pub mod stats;
pub mod store;
pub mod vocabulary;

pub type PostingId = u64;
pub type ConceptId = u32;

pub use context::{AnalyticsContext, UpdateReport};
pub use error::{Error, Result};
pub use manager::{FeatureSpaceManager, SpaceHandle};
pub use posting::{Location, Posting};
pub use query::JobQuery;
pub use relevance::{Relevance, RelevanceScorer, ScoredQuery};
pub use space::{SparseVector, SparseVectorSpace, WINDOW_DAYS};
pub use stats::{StatBucket, StatEntry, StatsAggregator, TopN};
pub use store::{PostingStore, SledStore, StoreMode};
pub use vocabulary::ConceptVocabulary;
