//! Filter expression composition.
//!
//! The core only composes predicates; it never interprets the planner's
//! filter. The exclusion predicate uses the `search.in` form understood by
//! Azure AI Search and by [`MemoryIndex`](super::MemoryIndex).

use std::collections::BTreeSet;

/// Delimiters tried in order for `search.in`; the first absent from every id wins.
const DELIMITERS: [char; 5] = [',', '|', ';', '~', '^'];

/// Escapes a value for a single-quoted filter literal.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Builds `not search.in(id, '...', '<delim>')` for the given ids.
///
/// When every candidate delimiter occurs in some id, falls back to a
/// conjunction of `id ne '...'` clauses.
///
/// Returns `None` for an empty set: an empty exclusion list must not be
/// sent, since some backends read it as "exclude everything".
#[must_use]
pub fn exclusion(ids: &BTreeSet<String>) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let Some(delim) = DELIMITERS
        .iter()
        .copied()
        .find(|d| !ids.iter().any(|id| id.contains(*d)))
    else {
        let clauses: Vec<String> = ids.iter().map(|id| format!("id ne {}", quote(id))).collect();
        return Some(clauses.join(" and "));
    };
    let joined = ids
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(&delim.to_string());
    Some(format!(
        "not search.in(id, {}, {})",
        quote(&joined),
        quote(&delim.to_string())
    ))
}

/// Treats blank or literal "null"/"none" filters from a model as absent.
#[must_use]
pub fn normalize(filter: Option<&str>) -> Option<&str> {
    filter.map(str::trim).filter(|f| {
        !f.is_empty() && !f.eq_ignore_ascii_case("null") && !f.eq_ignore_ascii_case("none")
    })
}

/// Conjoins the exclusion predicate with the planner's filter.
///
/// The planner's filter is parenthesized so its own `or` clauses cannot
/// escape the exclusion.
#[must_use]
pub fn compose(excluded: &BTreeSet<String>, filter: Option<&str>) -> Option<String> {
    let parts: Vec<String> = exclusion(excluded)
        .into_iter()
        .chain(normalize(filter).map(|f| format!("({f})")))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" and "))
    }
}
