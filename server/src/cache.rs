use moka::sync::Cache;
use serde_json::Value;
use std::time::Duration;

/// Rendered JSON answers keyed by request. Entries expire after `ttl`; the
/// whole cache is dropped whenever the store changes.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<String, Value>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_entries).time_to_live(ttl).build();
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<Value> { self.cache.get(key) }

    pub fn insert(&self, key: String, value: Value) { self.cache.insert(key, value); }

    pub fn clear(&self) {
        self.cache.invalidate_all();
        tracing::debug!("response cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_drops_entries() {
        let cache = ResponseCache::new(Duration::from_secs(60), 16);
        cache.insert("jobs?rust--".into(), serde_json::json!({"count": 0}));
        assert!(cache.get("jobs?rust--").is_some());
        cache.clear();
        assert!(cache.get("jobs?rust--").is_none());
    }
}
