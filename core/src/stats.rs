use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use time::Date;

use crate::posting::day_string;
use crate::Posting;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub name: String,
    pub value: u64,
}

/// Name → count tally with unique names, kept in first-seen order until sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StatEntry>", into = "Vec<StatEntry>")]
pub struct StatBucket {
    entries: Vec<StatEntry>,
    index: HashMap<String, usize>,
}

impl From<Vec<StatEntry>> for StatBucket {
    fn from(list: Vec<StatEntry>) -> Self {
        let mut bucket = StatBucket::default();
        for entry in list {
            bucket.add(&entry.name, entry.value);
        }
        bucket
    }
}

impl From<StatBucket> for Vec<StatEntry> {
    fn from(bucket: StatBucket) -> Self { bucket.entries }
}

impl StatBucket {
    pub fn new() -> Self { Self::default() }

    pub fn increment(&mut self, name: &str) { self.add(name, 1) }

    fn add(&mut self, name: &str, by: u64) {
        match self.index.get(name) {
            Some(&pos) => self.entries[pos].value += by,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(StatEntry { name: name.to_string(), value: by });
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> { self.index.get(name).map(|&pos| self.entries[pos].value) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entries(&self) -> &[StatEntry] { &self.entries }

    /// Count descending, name ascending.
    pub fn sort(&mut self) {
        self.entries.sort_by(by_count_desc);
        self.index = self.entries.iter().enumerate().map(|(pos, e)| (e.name.clone(), pos)).collect();
    }

    pub fn truncate(&mut self, len: usize) {
        if len >= self.entries.len() {
            return;
        }
        for dropped in self.entries.drain(len..) {
            self.index.remove(&dropped.name);
        }
    }
}

fn by_count_desc(a: &StatEntry, b: &StatEntry) -> Ordering {
    b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name))
}

/// The first `n` entries of a bucket alongside the size of the whole bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopN<T> {
    /// Entries returned.
    pub count: usize,
    /// Entries in the full collection.
    pub total: usize,
    pub data: Vec<T>,
}

pub fn top_n(bucket: &StatBucket, n: usize) -> TopN<StatEntry> {
    let data: Vec<StatEntry> = bucket.entries().iter().take(n).cloned().collect();
    TopN { count: data.len(), total: bucket.len(), data }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesEntry {
    /// Day string, `YYYY-M-D`.
    pub name: String,
    #[serde(skip)]
    pub date: Date,
    /// Postings published that day.
    pub value: u64,
    pub skillset: StatBucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub num_of_jobs: usize,
    pub num_of_locations: usize,
    pub num_of_countries: usize,
    pub num_of_skills: usize,
}

/// Top-N tallies of skills, locations and countries plus a per-day series.
///
/// Always recomputed from the full posting set; there is no per-record update.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    num_of_jobs: usize,
    skills: StatBucket,
    locations: StatBucket,
    countries: StatBucket,
    time_series: Vec<TimeSeriesEntry>,
}

impl StatsAggregator {
    /// Tallies every posting once. Buckets keep first-seen order; call
    /// [`StatsAggregator::sort`] to order them by count.
    pub fn compute_from_scratch(postings: &[Posting]) -> Self {
        let mut stats = StatsAggregator { num_of_jobs: postings.len(), ..Default::default() };
        let mut days: BTreeMap<Date, TimeSeriesEntry> = BTreeMap::new();
        for posting in postings {
            for skill in &posting.skills {
                stats.skills.increment(skill);
            }
            if !posting.location.name.is_empty() {
                stats.locations.increment(&posting.location.name);
            }
            if !posting.location.country.is_empty() {
                stats.countries.increment(&posting.location.country);
            }
            let date = posting.date.date();
            let day = days.entry(date).or_insert_with(|| TimeSeriesEntry {
                name: day_string(date),
                date,
                value: 0,
                skillset: StatBucket::new(),
            });
            day.value += 1;
            for skill in &posting.skills {
                day.skillset.increment(skill);
            }
        }
        stats.time_series = days.into_values().collect();
        tracing::info!(
            jobs = stats.num_of_jobs,
            skills = stats.skills.len(),
            locations = stats.locations.len(),
            countries = stats.countries.len(),
            days = stats.time_series.len(),
            "statistics computed"
        );
        stats
    }

    /// Sorts every bucket, including the per-day skill sets, by count descending.
    pub fn sort(&mut self) {
        self.skills.sort();
        self.locations.sort();
        self.countries.sort();
        for day in &mut self.time_series {
            day.skillset.sort();
        }
    }

    pub fn sorted(mut self) -> Self {
        self.sort();
        self
    }

    pub fn counts(&self) -> Counts {
        Counts {
            num_of_jobs: self.num_of_jobs,
            num_of_locations: self.locations.len(),
            num_of_countries: self.countries.len(),
            num_of_skills: self.skills.len(),
        }
    }

    pub fn skills(&self, limit: Option<usize>) -> TopN<StatEntry> { top_n(&self.skills, limit.unwrap_or(usize::MAX)) }

    pub fn locations(&self, limit: Option<usize>) -> TopN<StatEntry> { top_n(&self.locations, limit.unwrap_or(usize::MAX)) }

    pub fn countries(&self, limit: Option<usize>) -> TopN<StatEntry> { top_n(&self.countries, limit.unwrap_or(usize::MAX)) }

    pub fn skill_bucket(&self) -> &StatBucket { &self.skills }

    pub fn location_bucket(&self) -> &StatBucket { &self.locations }

    pub fn country_bucket(&self) -> &StatBucket { &self.countries }

    /// All days, oldest first.
    pub fn time_series(&self) -> &[TimeSeriesEntry] { &self.time_series }

    /// The last `n` days (oldest first), each with its skills sorted by count
    /// and cut to `skills_per_day`. Leaves the aggregator untouched.
    pub fn recent_time_series(&self, n: usize, skills_per_day: usize) -> TopN<TimeSeriesEntry> {
        let start = self.time_series.len().saturating_sub(n);
        let data: Vec<TimeSeriesEntry> = self.time_series[start..]
            .iter()
            .cloned()
            .map(|mut day| {
                day.skillset.sort();
                day.skillset.truncate(skills_per_day);
                day
            })
            .collect();
        TopN { count: data.len(), total: self.time_series.len(), data }
    }
}
