use std::collections::HashSet;

/// Fixed n-gram size (§4.2: "n fixed; recommend n=3").
pub const NGRAM_SIZE: usize = 3;

/// Character n-grams of the lowercased text, spaces preserved. Strings
/// shorter than `NGRAM_SIZE` contribute a single gram: the string itself.
pub fn ngrams(text: &str) -> HashSet<String> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    let mut set = HashSet::new();
    if chars.is_empty() {
        return set;
    }
    if chars.len() < NGRAM_SIZE {
        set.insert(chars.into_iter().collect());
        return set;
    }
    for window in chars.windows(NGRAM_SIZE) {
        set.insert(window.iter().collect());
    }
    set
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|` between two n-gram sets. Two
/// empty sets are defined to have zero similarity (an unindexed or
/// non-textual value never matches, even against an empty query).
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ngrams_of_short_string_is_the_string_itself() {
        let grams = ngrams("hi");
        assert_eq!(grams.len(), 1);
        assert!(grams.contains("hi"));
    }

    #[test]
    fn ngrams_produces_sliding_trigrams() {
        let grams = ngrams("abcd");
        assert!(grams.contains("abc"));
        assert!(grams.contains("bcd"));
        assert_eq!(grams.len(), 2);
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a = ngrams("hello world");
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn jaccard_of_empty_sets_is_zero() {
        let empty = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }

    #[test]
    fn jaccard_is_order_independent() {
        let a = ngrams("hello world");
        let b = ngrams("help word");
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        assert!(jaccard(&a, &b) > 0.0);
        assert!(jaccard(&a, &b) < 1.0);
    }
}
