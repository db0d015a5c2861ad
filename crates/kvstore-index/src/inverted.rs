use std::collections::{BTreeSet, HashMap, HashSet};

use kvstore_types::Key;

/// AND intersects posting sets across all query tokens; OR unions them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    And,
    Or,
}

/// Token -> ordered set of keys whose current value contains that token.
/// `BTreeSet` keeps postings in lex key order for free, matching the
/// "unspecified but deterministic order" requirement on `search_text`.
#[derive(Default)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<Key>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &Key, tokens: &HashSet<String>) {
        for token in tokens {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    pub fn remove(&mut self, key: &Key, tokens: &HashSet<String>) {
        for token in tokens {
            if let Some(postings) = self.postings.get_mut(token) {
                postings.remove(key);
                if postings.is_empty() {
                    self.postings.remove(token);
                }
            }
        }
    }

    pub fn search(&self, query_tokens: &[String], mode: SearchMode) -> Vec<Key> {
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut sets = query_tokens
            .iter()
            .map(|t| self.postings.get(t).cloned().unwrap_or_default());

        let combined = match mode {
            SearchMode::And => {
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect())
            }
            SearchMode::Or => {
                let mut union = BTreeSet::new();
                for s in sets {
                    union.extend(s);
                }
                union
            }
        };
        combined.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn and_search_requires_all_tokens_present() {
        let mut idx = InvertedIndex::new();
        idx.insert(&Key::from("doc1"), &tokens(&["the", "quick", "brown", "fox"]));
        idx.insert(&Key::from("doc2"), &tokens(&["quick", "brown", "dog"]));

        let hits = idx.search(&["quick".into(), "brown".into()], SearchMode::And);
        assert_eq!(hits, vec![Key::from("doc1"), Key::from("doc2")]);

        let hits = idx.search(&["fox".into(), "dog".into()], SearchMode::And);
        assert!(hits.is_empty());
    }

    #[test]
    fn or_search_unions_postings() {
        let mut idx = InvertedIndex::new();
        idx.insert(&Key::from("doc1"), &tokens(&["fox"]));
        idx.insert(&Key::from("doc2"), &tokens(&["dog"]));

        let hits = idx.search(&["fox".into(), "dog".into()], SearchMode::Or);
        assert_eq!(hits, vec![Key::from("doc1"), Key::from("doc2")]);
    }

    #[test]
    fn remove_retracts_postings() {
        let mut idx = InvertedIndex::new();
        let old = tokens(&["stale", "tokens"]);
        idx.insert(&Key::from("k"), &old);
        idx.remove(&Key::from("k"), &old);

        let hits = idx.search(&["stale".into()], SearchMode::Or);
        assert!(hits.is_empty());
    }

    #[test]
    fn results_are_in_ascending_lex_key_order() {
        let mut idx = InvertedIndex::new();
        idx.insert(&Key::from("z"), &tokens(&["shared"]));
        idx.insert(&Key::from("a"), &tokens(&["shared"]));
        idx.insert(&Key::from("m"), &tokens(&["shared"]));

        let hits = idx.search(&["shared".into()], SearchMode::Or);
        assert_eq!(hits, vec![Key::from("a"), Key::from("m"), Key::from("z")]);
    }
}
