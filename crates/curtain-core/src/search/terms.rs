//! Search-term tokenisation

use std::collections::HashSet;

/// Split a free-text blob into distinct search terms
///
/// Lines first, then semicolons within a line. Terms are trimmed, empties
/// dropped, and the first occurrence of a repeated term keeps its position.
pub fn parse_search_terms(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .lines()
        .flat_map(|line| line.split(';'))
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(term.to_string()))
        .map(str::to_string)
        .collect()
}
