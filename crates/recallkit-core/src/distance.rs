//! Levenshtein edit distance.

/// Minimum number of single-character insertions, deletions and
/// substitutions turning `a` into `b`, each at unit cost.
///
/// Counts Unicode scalar values and is symmetric in its arguments.
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}
