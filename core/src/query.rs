use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::Posting;

/// Filter over stored postings.
///
/// Every listed skill must be required (AND). Locations and countries are
/// alternatives: a posting passes if its city is listed or its country is
/// listed (OR). The two groups are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQuery {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
}

impl JobQuery {
    /// Builds a query from comma-separated lists as they arrive in a query string.
    pub fn from_lists(skills: Option<&str>, locations: Option<&str>, countries: Option<&str>) -> Result<Self> {
        let query = JobQuery { skills: split_list(skills), locations: split_list(locations), countries: split_list(countries) };
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<()> {
        if self.skills.is_empty() && self.locations.is_empty() && self.countries.is_empty() {
            return Err(Error::InvalidQuery("query must contain 'skills', 'locations' and/or 'countries'".into()));
        }
        Ok(())
    }

    pub fn matches(&self, posting: &Posting) -> bool {
        let skills_ok = self.skills.iter().all(|s| posting.skills.iter().any(|p| p == s));
        if !skills_ok {
            return false;
        }
        if self.locations.is_empty() && self.countries.is_empty() {
            return true;
        }
        self.locations.iter().any(|l| *l == posting.location.name) || self.countries.iter().any(|c| *c == posting.location.country)
    }

    /// Stable cache key: the route followed by the JSON of the sorted lists.
    pub fn cache_key(&self, route: &str) -> Result<String> {
        let mut sorted = self.clone();
        for list in [&mut sorted.skills, &mut sorted.locations, &mut sorted.countries] {
            list.sort();
        }
        Ok(format!("{route}?{}", serde_json::to_string(&sorted)?))
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}
