use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::PostingId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// City (or region) name as scraped, may be empty.
    pub name: String,
    /// `[lat, long]`; absent when the scraper could not geocode the posting.
    #[serde(default)]
    pub coord: Option<[f64; 2]>,
    pub country: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub country_uri: Option<String>,
}

/// A scraped job posting.
///
/// Everything except `concepts` is fixed once the posting is stored;
/// concepts are appended by the annotation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    /// Assigned by the record store on append; ignored on input.
    #[serde(default)]
    pub id: PostingId,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub source: Option<String>,
    /// Required skill names, in scraped order.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Concept names found by the annotation service.
    #[serde(default)]
    pub concepts: Vec<String>,
}

impl Posting {
    /// Calendar day key used by the time series, `YYYY-M-D` without padding.
    pub fn day_string(&self) -> String {
        day_string(self.date.date())
    }

    pub fn timestamp_millis(&self) -> i64 {
        (self.date.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Appends concepts not already attached to the posting.
    pub fn attach_concepts<I, S>(&mut self, concepts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for concept in concepts {
            let concept = concept.into();
            if !self.concepts.contains(&concept) {
                self.concepts.push(concept);
            }
        }
    }
}

pub fn day_string(date: Date) -> String {
    format!("{}-{}-{}", date.year(), u8::from(date.month()), date.day())
}

/// Parses the date formats found in scraped batch files: RFC 3339, a naive
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a bare `YYYY-MM-DD`.
pub fn parse_posting_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt);
    }
    let naive = raw.split('+').next().unwrap_or(raw).trim_end_matches('Z');
    let with_time = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(naive, with_time) {
        return Some(dt.assume_utc());
    }
    let date_only = format_description!("[year]-[month]-[day]");
    Date::parse(naive, date_only).ok().map(|d| d.midnight().assume_utc())
}
