use serde::Serialize;
use std::path::Path;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::query::JobQuery;
use crate::{Posting, PostingId};

const POSTINGS_TREE: &str = "postings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    ReadOnly,
    Write,
}

/// The record store the analytics core reads postings from.
///
/// Mutation goes through `&mut self`; callers hold the store behind a lock and
/// take it exclusively for the write/reopen cycle.
pub trait PostingStore: Send + Sync {
    fn all(&self) -> Result<Vec<Posting>>;

    /// Postings published strictly after `cutoff`.
    fn since(&self, cutoff: OffsetDateTime) -> Result<Vec<Posting>> {
        Ok(self.all()?.into_iter().filter(|p| p.date > cutoff).collect())
    }

    fn get(&self, id: PostingId) -> Result<Option<Posting>>;

    fn query(&self, query: &JobQuery) -> Result<Vec<Posting>> {
        query.validate()?;
        Ok(self.all()?.into_iter().filter(|p| query.matches(p)).collect())
    }

    /// Appends postings, assigning fresh ids. Fails unless open for writing.
    fn append(&mut self, postings: &[Posting]) -> Result<Vec<PostingId>>;

    fn reopen(&mut self, mode: StoreMode) -> Result<()>;

    fn mode(&self) -> StoreMode;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Postings in a sled tree keyed by big-endian id, values bincode-encoded.
pub struct SledStore {
    db: sled::Db,
    postings: sled::Tree,
    mode: StoreMode,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P, mode: StoreMode) -> Result<Self> {
        let db = sled::open(path)?;
        Self::with_db(db, mode)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db, StoreMode::ReadOnly)
    }

    fn with_db(db: sled::Db, mode: StoreMode) -> Result<Self> {
        let postings = db.open_tree(POSTINGS_TREE)?;
        Ok(Self { db, postings, mode })
    }

    fn next_id(&self) -> Result<PostingId> {
        Ok(match self.postings.last()? {
            Some((key, _)) => decode_id(&key) + 1,
            None => 0,
        })
    }
}

impl PostingStore for SledStore {
    fn all(&self) -> Result<Vec<Posting>> {
        self.postings.iter().values().map(|v| Ok(bincode::deserialize(&v?)?)).collect()
    }

    fn get(&self, id: PostingId) -> Result<Option<Posting>> {
        Ok(self.postings.get(id.to_be_bytes())?.map(|v| bincode::deserialize(&v)).transpose()?)
    }

    fn append(&mut self, postings: &[Posting]) -> Result<Vec<PostingId>> {
        if self.mode != StoreMode::Write {
            return Err(Error::ReadOnly);
        }
        let mut next = self.next_id()?;
        let mut batch = sled::Batch::default();
        let mut ids = Vec::with_capacity(postings.len());
        for posting in postings {
            let mut record = posting.clone();
            record.id = next;
            batch.insert(next.to_be_bytes().to_vec(), bincode::serialize(&record)?);
            ids.push(next);
            next += 1;
        }
        self.postings.apply_batch(batch)?;
        tracing::info!(appended = ids.len(), total = self.postings.len(), "postings appended");
        Ok(ids)
    }

    fn reopen(&mut self, mode: StoreMode) -> Result<()> {
        self.db.flush()?;
        self.mode = mode;
        tracing::debug!(?mode, "record store reopened");
        Ok(())
    }

    fn mode(&self) -> StoreMode { self.mode }

    fn len(&self) -> usize { self.postings.len() }
}

fn decode_id(key: &[u8]) -> PostingId {
    <[u8; 8]>::try_from(key).map(u64::from_be_bytes).unwrap_or_default()
}
