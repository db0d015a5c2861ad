use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use kvstore_storage::{Applied, MutationObserver};
use kvstore_types::{Key, Value};
use tracing::trace;

use crate::inverted::{InvertedIndex, SearchMode};
use crate::ngram::ngrams;
use crate::similarity::NGramIndex;
use crate::text::{extract_text, tokenize};

struct IndexState {
    inverted: InvertedIndex,
    ngram: NGramIndex,
    /// Current token set per key, so an overwrite or delete can retract
    /// exactly the postings it previously contributed (§4.2 "update on
    /// overwrite").
    tokens_by_key: HashMap<Key, HashSet<String>>,
}

impl IndexState {
    fn new() -> Self {
        Self {
            inverted: InvertedIndex::new(),
            ngram: NGramIndex::new(),
            tokens_by_key: HashMap::new(),
        }
    }

    fn index_value(&mut self, key: &Key, value: &Value) {
        self.retract(key);
        let text = extract_text(value);
        let tokens: HashSet<String> = tokenize(&text).into_iter().collect();
        let grams = ngrams(&text);
        self.inverted.insert(key, &tokens);
        self.ngram.insert(key, grams);
        self.tokens_by_key.insert(key.clone(), tokens);
    }

    fn retract(&mut self, key: &Key) {
        if let Some(old_tokens) = self.tokens_by_key.remove(key) {
            self.inverted.remove(key, &old_tokens);
        }
        self.ngram.remove(key);
    }
}

/// Keeps the inverted token index and the n-gram similarity index in
/// lock-step with the storage engine's state by implementing
/// [`MutationObserver`]. Registered with the storage engine after both are
/// constructed, then driven purely by `on_apply` notifications plus an
/// initial [`IndexManager::rebuild_from`] call after WAL recovery.
pub struct IndexManager {
    state: RwLock<IndexState>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::new()),
        }
    }

    /// Rebuild both indexes from scratch against a freshly recovered or
    /// snapshot-replaced store state (§4.1 step 5, §4.3 snapshot resync).
    pub fn rebuild_from(&self, store: &HashMap<Key, Value>) {
        let mut state = self.state.write().expect("index lock poisoned");
        *state = IndexState::new();
        for (key, value) in store {
            state.index_value(key, value);
        }
        trace!(keys = store.len(), "index rebuilt from store state");
    }

    pub fn search_text(&self, query: &str, mode: SearchMode) -> Vec<Key> {
        let tokens = tokenize(query);
        self.state.read().expect("index lock poisoned").inverted.search(&tokens, mode)
    }

    pub fn search_semantic(&self, query: &str, k: usize, threshold: f64) -> Vec<(Key, f64)> {
        let query_grams = ngrams(query);
        self.state
            .read()
            .expect("index lock poisoned")
            .ngram
            .search(&query_grams, k, threshold)
    }
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationObserver for IndexManager {
    fn on_apply(&self, applied: &Applied) {
        let mut state = self.state.write().expect("index lock poisoned");
        match applied {
            Applied::Set { key, new, .. } => state.index_value(key, new),
            Applied::Delete { key, .. } => state.retract(key),
            Applied::BulkSet { pairs, .. } => {
                for (key, new, _old) in pairs {
                    state.index_value(key, new);
                }
            }
        }
    }
}
