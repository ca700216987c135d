use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::manager::FeatureSpaceManager;
use crate::persist::PendingPostings;
use crate::query::JobQuery;
use crate::relevance::ScoredQuery;
use crate::space::{window_cutoff, SparseVectorSpace};
use crate::stats::StatsAggregator;
use crate::store::{PostingStore, StoreMode};
use crate::{Posting, PostingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Pending postings written to the store.
    pub appended: usize,
    /// Postings in the store after the update.
    pub total: usize,
    /// Postings inside the feature-space window.
    pub window: usize,
    pub generation: u64,
}

/// Everything a request needs: the record store, the concept feature space,
/// the statistics snapshot and the pending-postings queue.
///
/// Reads see the last published snapshot. [`AnalyticsContext::update_database`]
/// and [`AnalyticsContext::rebuild`] never overlap, and a failed rebuild leaves
/// the previous snapshot in place.
pub struct AnalyticsContext<S: PostingStore> {
    store: RwLock<S>,
    space: FeatureSpaceManager,
    stats: RwLock<Arc<StatsAggregator>>,
    pending: Mutex<PendingPostings>,
    update_lock: Mutex<()>,
}

impl<S: PostingStore> AnalyticsContext<S> {
    /// Wraps `store` and builds the first snapshot as of `now`.
    pub fn new(store: S, pending: PendingPostings, now: OffsetDateTime) -> Result<Self> {
        let ctx = Self {
            store: RwLock::new(store),
            space: FeatureSpaceManager::new(now),
            stats: RwLock::new(Arc::new(StatsAggregator::default())),
            pending: Mutex::new(pending),
            update_lock: Mutex::new(()),
        };
        ctx.rebuild(now)?;
        Ok(ctx)
    }

    /// Recomputes the feature space and statistics from the store as it is.
    pub fn rebuild(&self, now: OffsetDateTime) -> Result<UpdateReport> {
        let _exclusive = self.update_lock.lock();
        let store = self.store.read();
        self.rebuild_from(&*store, 0, now)
    }

    /// Applies the pending postings and rebuilds, as one exclusive step:
    /// reopen for writing, append, reopen read-only, rebuild space and stats.
    pub fn update_database(&self, now: OffsetDateTime) -> Result<UpdateReport> {
        let _exclusive = self.update_lock.lock();
        let mut pending = self.pending.lock();
        let mut store = self.store.write();

        store.reopen(StoreMode::Write)?;
        let appended = store.append(pending.postings());
        let reopened = store.reopen(StoreMode::ReadOnly);
        let ids = appended?;

        // Appended postings leave the queue even when the read-only reopen fails.
        pending.clear();
        if let Err(err) = pending.save() {
            tracing::warn!(error = %err, "failed to persist cleared pending postings");
        }
        if let Err(err) = reopened {
            tracing::error!(error = %err, appended = ids.len(), "store did not reopen read-only after append");
            return Err(err);
        }

        let report = self.rebuild_from(&*store, ids.len(), now);
        match &report {
            Ok(r) => tracing::info!(appended = r.appended, total = r.total, generation = r.generation, "database updated"),
            Err(err) => tracing::error!(error = %err, "rebuild after database update failed; keeping previous snapshot"),
        }
        report
    }

    fn rebuild_from(&self, store: &S, appended: usize, now: OffsetDateTime) -> Result<UpdateReport> {
        let all = store.all()?;
        let cutoff = window_cutoff(now);
        let recent: Vec<Posting> = all.iter().filter(|p| p.date > cutoff).cloned().collect();
        let stats = Arc::new(StatsAggregator::compute_from_scratch(&all).sorted());
        let space = SparseVectorSpace::rebuild(&recent, now);

        let mut published_stats = self.stats.write();
        let handle = self.space.publish(space);
        *published_stats = stats;
        drop(published_stats);
        Ok(UpdateReport { appended, total: all.len(), window: handle.window().len(), generation: handle.generation() })
    }

    /// Queues postings for the next database update and persists the queue.
    pub fn store_pending(&self, postings: Vec<Posting>) -> Result<usize> {
        let mut pending = self.pending.lock();
        let count = pending.store(postings);
        pending.save()?;
        Ok(count)
    }

    pub fn pending_len(&self) -> usize { self.pending.lock().len() }

    pub fn query(&self, query: &JobQuery) -> Result<Vec<Posting>> { self.store.read().query(query) }

    pub fn posting(&self, id: PostingId) -> Result<Posting> {
        self.store.read().get(id)?.ok_or(Error::NotFound(id))
    }

    /// Postings for `ids` in the given order; ids missing from the store are skipped.
    pub fn postings(&self, ids: &[PostingId]) -> Result<Vec<Posting>> {
        let store = self.store.read();
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(p) = store.get(id)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    pub fn store_len(&self) -> usize { self.store.read().len() }

    /// Current statistics snapshot.
    pub fn stats(&self) -> Arc<StatsAggregator> { self.stats.read().clone() }

    pub fn feature_space(&self) -> &FeatureSpaceManager { &self.space }

    pub fn relevant_jobs<C: AsRef<str>>(&self, concepts: &[C]) -> ScoredQuery { self.space.relevant(concepts) }
}
