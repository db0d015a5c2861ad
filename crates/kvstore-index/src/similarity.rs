use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use kvstore_types::Key;

use crate::ngram::jaccard;

/// Key -> n-gram set of its current value, for Jaccard similarity search.
#[derive(Default)]
pub struct NGramIndex {
    grams: HashMap<Key, HashSet<String>>,
}

impl NGramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &Key, grams: HashSet<String>) {
        self.grams.insert(key.clone(), grams);
    }

    pub fn remove(&mut self, key: &Key) {
        self.grams.remove(key);
    }

    /// Score every indexed key against `query_grams`, keep those at or above
    /// `threshold`, and return the top `k` ordered by descending score with
    /// ascending key as a tiebreak.
    pub fn search(
        &self,
        query_grams: &HashSet<String>,
        k: usize,
        threshold: f64,
    ) -> Vec<(Key, f64)> {
        let mut scored: Vec<(Key, f64)> = self
            .grams
            .iter()
            .map(|(key, grams)| (key.clone(), jaccard(query_grams, grams)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|(ka, sa), (kb, sb)| match sb.partial_cmp(sa) {
            Some(Ordering::Equal) | None => ka.cmp(kb),
            Some(ord) => ord,
        });
        scored.truncate(k);
        scored
    }
}
