use jobs_core::{Posting, PostingId, StatBucket};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref STRONG_TAG: Regex = Regex::new(r"(?i)</?strong>|&lt;/?strong&gt;").unwrap();
}

/// Region name the scrapers use when a posting could not be placed in a city.
const UNPLACED_REGION: &str = "Northern Europe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Full,
    Location,
    Skills,
    LocationsAndSkills,
}

impl View {
    pub fn parse(name: &str) -> Option<View> {
        match name {
            "full" => Some(View::Full),
            "location" | "locations" => Some(View::Location),
            "skills" => Some(View::Skills),
            "locations_and_skills" => Some(View::LocationsAndSkills),
            _ => None,
        }
    }

    fn has_location(self) -> bool { !matches!(self, View::Skills) }

    fn has_skills(self) -> bool { !matches!(self, View::Location) }
}

/// A posting as the API returns it. Fields outside the requested view are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub id: PostingId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_coord: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skillset: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing<T> {
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(data: Vec<T>) -> Self { Listing { count: data.len(), data } }
}

pub fn strip_strong(title: &str) -> String { STRONG_TAG.replace_all(title, "").into_owned() }

pub fn render(posting: &Posting, view: View) -> JobView {
    let full = view == View::Full;
    let located = view.has_location();
    JobView {
        id: posting.id,
        timestamp: full.then(|| posting.timestamp_millis()),
        date: full.then(|| posting.day_string()),
        title: full.then(|| strip_strong(&posting.title)),
        organization: full.then(|| posting.organization.clone()),
        description: full.then(|| posting.description.clone()),
        location_coord: if located { posting.location.coord } else { None },
        location_city: located.then(|| posting.location.name.clone()),
        location_country: located.then(|| posting.location.country.clone()),
        skillset: view.has_skills().then(|| posting.skills.clone()),
    }
}

/// Renders a result set. Location-bearing views drop postings that cannot be
/// put on a map.
pub fn render_list(postings: &[Posting], view: View) -> Listing<JobView> {
    postings
        .iter()
        .filter(|p| !view.has_location() || is_mappable(p))
        .map(|p| render(p, view))
        .collect::<Vec<_>>()
        .into()
}

fn is_mappable(posting: &Posting) -> bool {
    posting.location.coord.is_some() && posting.location.name != UNPLACED_REGION
}

/// A lecture category that is also a known skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryMatch {
    /// Category as the lecture lists it.
    pub name: String,
    pub skill: String,
    /// Postings requiring the skill.
    pub count: u64,
}

/// Skill name for a category: lower case, whitespace runs replaced by `-`.
pub fn skill_slug(category: &str) -> String {
    category.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join("-")
}

/// Matches `categories` (separated by newlines or `>` breadcrumbs) against the
/// skills tally. Each skill is reported once, for its first category.
pub fn match_categories(categories: &str, skills: &StatBucket) -> Vec<CategoryMatch> {
    let mut matches: Vec<CategoryMatch> = Vec::new();
    for name in categories.split(['\n', '>']).map(str::trim).filter(|c| !c.is_empty()) {
        let skill = skill_slug(name);
        if matches.iter().any(|m| m.skill == skill) {
            continue;
        }
        if let Some(count) = skills.get(&skill) {
            matches.push(CategoryMatch { name: name.to_string(), skill, count });
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobs_core::Location;
    use time::macros::datetime;

    fn posting(id: PostingId, city: &str, coord: Option<[f64; 2]>) -> Posting {
        Posting {
            id,
            uri: None,
            url: None,
            date: datetime!(2016-09-30 12:00 UTC),
            title: "<strong>Senior</strong> &lt;strong&gt;Rust&lt;/strong&gt; engineer".into(),
            description: "Systems work".into(),
            location: Location { name: city.into(), coord, country: "Slovenia".into(), uri: None, country_uri: None },
            organization: "ACME".into(),
            source: None,
            skills: vec!["rust".into(), "sql".into()],
            concepts: vec![],
        }
    }

    #[test]
    fn strips_strong_tags_in_both_encodings() {
        assert_eq!(strip_strong("<STRONG>a</strong> &lt;strong&gt;b&lt;/strong&gt;"), "a b");
    }

    #[test]
    fn full_view_carries_everything() {
        let v = render(&posting(3, "Ljubljana", Some([46.05, 14.5])), View::Full);
        assert_eq!(v.title.as_deref(), Some("Senior Rust engineer"));
        assert_eq!(v.date.as_deref(), Some("2016-9-30"));
        assert_eq!(v.timestamp, Some(1_475_236_800_000));
        assert_eq!(v.skillset.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn partial_views_omit_fields() {
        let p = posting(3, "Ljubljana", Some([46.05, 14.5]));
        let skills = serde_json::to_value(render(&p, View::Skills)).unwrap();
        assert_eq!(skills, serde_json::json!({"id": 3, "skillset": ["rust", "sql"]}));
        let loc = render(&p, View::Location);
        assert!(loc.skillset.is_none());
        assert_eq!(loc.location_city.as_deref(), Some("Ljubljana"));
    }

    #[test]
    fn unmappable_postings_are_dropped_from_location_views() {
        let postings = vec![
            posting(0, "Ljubljana", Some([46.05, 14.5])),
            posting(1, "Maribor", None),
            posting(2, "Northern Europe", Some([60.0, 15.0])),
        ];
        assert_eq!(render_list(&postings, View::Full).count, 1);
        assert_eq!(render_list(&postings, View::LocationsAndSkills).count, 1);
        assert_eq!(render_list(&postings, View::Skills).count, 3);
    }

    #[test]
    fn categories_match_known_skills() {
        let mut skills = StatBucket::new();
        for name in ["machine-learning", "css", "css"] {
            skills.increment(name);
        }
        let found = match_categories("Computer Science > Machine  Learning\nCSS\ncss\n\nBiology", &skills);
        assert_eq!(
            found,
            vec![
                CategoryMatch { name: "Machine  Learning".into(), skill: "machine-learning".into(), count: 1 },
                CategoryMatch { name: "CSS".into(), skill: "css".into(), count: 2 },
            ]
        );
        assert!(match_categories("", &skills).is_empty());
    }
}
