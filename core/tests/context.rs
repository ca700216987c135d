use jobs_core::persist::PendingPostings;
use jobs_core::{AnalyticsContext, Error, JobQuery, Location, Posting, PostingId, PostingStore, SledStore, StoreMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const NOW: OffsetDateTime = datetime!(2016-06-15 12:00 UTC);

fn posting(age_days: i64, city: &str, country: &str, skills: &[&str], concepts: &[&str]) -> Posting {
    Posting {
        id: 0,
        uri: None,
        url: None,
        date: NOW - Duration::days(age_days),
        title: "<strong>Developer</strong>".into(),
        description: String::new(),
        location: Location { name: city.into(), coord: Some([0.0, 0.0]), country: country.into(), uri: None, country_uri: None },
        organization: "ACME".into(),
        source: None,
        skills: skills.iter().map(|s| s.to_string()).collect(),
        concepts: concepts.iter().map(|c| c.to_string()).collect(),
    }
}

fn seeded_store() -> SledStore {
    let mut store = SledStore::temporary().unwrap();
    store.reopen(StoreMode::Write).unwrap();
    store
        .append(&[
            posting(1, "Berlin", "Germany", &["css", "html"], &["Web design"]),
            posting(2, "Bath", "United Kingdom", &["css"], &["Cascading Style Sheets"]),
            posting(30, "Berlin", "Germany", &["java"], &["Web design"]),
        ])
        .unwrap();
    store.reopen(StoreMode::ReadOnly).unwrap();
    store
}

#[test]
fn context_builds_initial_snapshot() {
    let ctx = AnalyticsContext::new(seeded_store(), PendingPostings::in_memory(), NOW).unwrap();
    assert_eq!(ctx.stats().counts().num_of_jobs, 3);
    assert_eq!(ctx.feature_space().current().window(), &[0, 1]);
    let scored = ctx.relevant_jobs(&["Web design"]);
    assert_eq!(scored.ids(), vec![0]);
}

#[test]
fn update_applies_pending_and_rebuilds() {
    let dir = tempdir().unwrap();
    let pending = PendingPostings::open(dir.path().join("pending.json")).unwrap();
    let ctx = AnalyticsContext::new(seeded_store(), pending, NOW).unwrap();
    let before = ctx.feature_space().generation();

    assert_eq!(ctx.store_pending(vec![posting(0, "Bath", "United Kingdom", &["rust"], &["Rust (programming language)"])]).unwrap(), 1);
    assert!(ctx.relevant_jobs(&["Rust (programming language)"]).relevance.is_empty());

    let report = ctx.update_database(NOW).unwrap();
    assert_eq!(report.appended, 1);
    assert_eq!(report.total, 4);
    assert_eq!(report.window, 3);
    assert_eq!(report.generation, before + 1);
    assert_eq!(ctx.pending_len(), 0);
    assert!(PendingPostings::open(dir.path().join("pending.json")).unwrap().is_empty());

    assert_eq!(ctx.relevant_jobs(&["Rust (programming language)"]).ids(), vec![3]);
    assert_eq!(ctx.stats().skill_bucket().get("rust"), Some(1));
    assert_eq!(ctx.posting(3).unwrap().location.name, "Bath");
}

#[test]
fn update_without_pending_still_rebuilds() {
    let ctx = AnalyticsContext::new(seeded_store(), PendingPostings::in_memory(), NOW).unwrap();
    let later = NOW + Duration::days(20);
    let report = ctx.update_database(later).unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(report.window, 0, "both recent postings have aged out");
    assert!(ctx.relevant_jobs(&["Web design"]).relevance.is_empty());
}

#[test]
fn queries_go_through_the_store() {
    let ctx = AnalyticsContext::new(seeded_store(), PendingPostings::in_memory(), NOW).unwrap();

    let css = ctx.query(&JobQuery::from_lists(Some("css"), None, None).unwrap()).unwrap();
    assert_eq!(css.len(), 2);

    let css_html = ctx.query(&JobQuery::from_lists(Some("css,html"), None, None).unwrap()).unwrap();
    assert_eq!(css_html.len(), 1);

    let either = ctx.query(&JobQuery::from_lists(None, Some("Bath"), Some("Germany")).unwrap()).unwrap();
    assert_eq!(either.len(), 3);

    let css_in_bath = ctx.query(&JobQuery::from_lists(Some("css"), Some("Bath"), None).unwrap()).unwrap();
    assert_eq!(css_in_bath.len(), 1);
    assert_eq!(css_in_bath[0].id, 1);

    assert!(matches!(ctx.query(&JobQuery::default()), Err(Error::InvalidQuery(_))));
    assert!(matches!(ctx.posting(99), Err(Error::NotFound(99))));
}

/// In-memory store that can be told to fail read-only reopens or full scans.
struct FlakyStore {
    postings: Vec<Posting>,
    mode: StoreMode,
    failing_reopens: usize,
    scans_before_failure: Option<usize>,
    scans: AtomicUsize,
}

impl FlakyStore {
    fn new(postings: Vec<Posting>) -> Self {
        let postings = postings.into_iter().enumerate().map(|(i, mut p)| { p.id = i as PostingId; p }).collect();
        Self { postings, mode: StoreMode::ReadOnly, failing_reopens: 0, scans_before_failure: None, scans: AtomicUsize::new(0) }
    }
}

fn unavailable(what: &str) -> Error { Error::Io(std::io::Error::new(std::io::ErrorKind::Other, what.to_string())) }

impl PostingStore for FlakyStore {
    fn all(&self) -> jobs_core::Result<Vec<Posting>> {
        let scan = self.scans.fetch_add(1, Ordering::SeqCst);
        if self.scans_before_failure.is_some_and(|limit| scan >= limit) {
            return Err(unavailable("store unavailable"));
        }
        Ok(self.postings.clone())
    }

    fn get(&self, id: PostingId) -> jobs_core::Result<Option<Posting>> { Ok(self.postings.iter().find(|p| p.id == id).cloned()) }

    fn append(&mut self, postings: &[Posting]) -> jobs_core::Result<Vec<PostingId>> {
        if self.mode != StoreMode::Write {
            return Err(Error::ReadOnly);
        }
        let mut ids = Vec::new();
        for p in postings {
            let mut record = p.clone();
            record.id = self.postings.len() as PostingId;
            ids.push(record.id);
            self.postings.push(record);
        }
        Ok(ids)
    }

    fn reopen(&mut self, mode: StoreMode) -> jobs_core::Result<()> {
        if mode == StoreMode::ReadOnly && self.failing_reopens > 0 {
            self.failing_reopens -= 1;
            return Err(unavailable("flush failed"));
        }
        self.mode = mode;
        Ok(())
    }

    fn mode(&self) -> StoreMode { self.mode }

    fn len(&self) -> usize { self.postings.len() }
}

#[test]
fn failed_reopen_after_append_does_not_requeue_postings() {
    let mut store = FlakyStore::new(vec![]);
    store.failing_reopens = 1;
    let ctx = AnalyticsContext::new(store, PendingPostings::in_memory(), NOW).unwrap();
    ctx.store_pending(vec![posting(0, "Bath", "United Kingdom", &["rust"], &["Rust (programming language)"])]).unwrap();

    assert!(matches!(ctx.update_database(NOW), Err(Error::Io(_))));
    assert_eq!(ctx.store_len(), 1);
    assert_eq!(ctx.pending_len(), 0);

    let report = ctx.update_database(NOW).unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(report.total, 1);
    assert_eq!(ctx.relevant_jobs(&["Rust (programming language)"]).ids(), vec![0]);
}

#[test]
fn failed_rebuild_keeps_previous_snapshot() {
    let mut store = FlakyStore::new(vec![
        posting(1, "Berlin", "Germany", &["css", "html"], &["Web design"]),
        posting(2, "Bath", "United Kingdom", &["css"], &["Cascading Style Sheets"]),
    ]);
    store.scans_before_failure = Some(1);
    let ctx = AnalyticsContext::new(store, PendingPostings::in_memory(), NOW).unwrap();
    let generation = ctx.feature_space().generation();
    let window = ctx.feature_space().current().window().to_vec();
    let counts = ctx.stats().counts();

    assert!(ctx.rebuild(NOW + Duration::days(20)).is_err());
    assert_eq!(ctx.feature_space().generation(), generation);
    assert_eq!(ctx.feature_space().current().window(), window.as_slice());
    assert_eq!(ctx.stats().counts(), counts);
    assert_eq!(ctx.relevant_jobs(&["Web design"]).ids(), vec![0]);
}
