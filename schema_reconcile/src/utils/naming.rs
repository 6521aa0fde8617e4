//! Naming utilities
//!
//! Table and field names are matched case-insensitively on both sides, and
//! rendered in a normalized, quoted form for the physical backend.

use std::collections::HashMap;

use crate::db::connection::Backend;

/// Case-folded key used for name matching
pub fn fold_case(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive name equality
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || fold_case(a) == fold_case(b)
}

/// Normalize an identifier for the physical side: first character lowercased
pub fn normalize_identifier(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Quote an identifier according to the backend's style
pub fn quote_identifier(name: &str, backend: Backend) -> String {
    match backend {
        Backend::MySql => format!("`{}`", name.replace('`', "``")),
    }
}

/// Normalize then quote; the form every emitted statement uses
pub fn format_sql_identifier(name: &str, backend: Backend) -> String {
    quote_identifier(&normalize_identifier(name), backend)
}

/// Check for name conflicts in a list of identifiers.
///
/// Returns the first pair of distinct names that collide, comparing
/// case-insensitively when `ignore_case` is set.
pub fn check_identifier_conflicts<'a, I>(names: I, ignore_case: bool) -> Option<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashMap::<String, &str>::new();

    for name in names {
        let key = if ignore_case {
            fold_case(name)
        } else {
            name.to_string()
        };

        match seen.get(&key) {
            Some(existing) if *existing != name => {
                return Some((existing.to_string(), name.to_string()));
            }
            Some(_) => {}
            None => {
                seen.insert(key, name);
            }
        }
    }

    None
}
