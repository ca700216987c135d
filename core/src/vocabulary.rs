use std::collections::HashMap;

use crate::ConceptId;

/// Concept names seen by the feature space, with ids assigned in
/// first-seen order. Names are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptVocabulary {
    dictionary: HashMap<String, ConceptId>,
    names: Vec<String>,
}

impl ConceptVocabulary {
    pub fn new() -> Self { Self::default() }

    /// Returns the id of `name`, registering it if unseen.
    pub fn insert(&mut self, name: &str) -> ConceptId {
        if let Some(&id) = self.dictionary.get(name) {
            return id;
        }
        let id = self.names.len() as ConceptId;
        self.dictionary.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn get(&self, name: &str) -> Option<ConceptId> { self.dictionary.get(name).copied() }

    pub fn contains(&self, name: &str) -> bool { self.dictionary.contains_key(name) }

    pub fn name(&self, id: ConceptId) -> Option<&str> { self.names.get(id as usize).map(String::as_str) }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    /// Names in id order.
    pub fn names(&self) -> &[String] { &self.names }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_first_seen_order() {
        let mut v = ConceptVocabulary::new();
        assert_eq!(v.insert("Rust"), 0);
        assert_eq!(v.insert("Java"), 1);
        assert_eq!(v.insert("Rust"), 0);
        assert_eq!(v.len(), 2);
        assert_eq!(v.name(1), Some("Java"));
        assert!(v.get("rust").is_none());
    }
}
