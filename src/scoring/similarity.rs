//! Character-level distance and per-word similarity.

/// Levenshtein distance (single-character insert / delete / substitute)
/// between `a` and `b`, counted over Unicode scalar values.
///
/// ```
/// use lesson_coach::scoring::edit_distance;
///
/// assert_eq!(edit_distance("cat", "bat"), 1);
/// assert_eq!(edit_distance("", ""), 0);
/// ```
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Similarity of two tokens on a 0 to 100 scale:
/// `(max_len - edit_distance) / max_len * 100`.
///
/// Two empty tokens are identical (100); exactly one empty token scores 0.
pub fn word_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100.0;
    }
    let distance = edit_distance(a, b);
    (max_len - distance) as f64 / max_len as f64 * 100.0
}
