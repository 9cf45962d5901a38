//! Dedup gate: drops URLs that were already ingested.

use std::collections::HashSet;

/// `requested` minus `known`, in input order. Duplicates inside `requested`
/// are kept; later stages key by URL and collapse them.
pub fn select_new(requested: &[String], known: &HashSet<String>) -> Vec<String> {
    requested
        .iter()
        .filter(|url| !known.contains(*url))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_unknown_in_order() {
        let known: HashSet<String> = strings(&["http://b"]).into_iter().collect();
        let picked = select_new(&strings(&["http://c", "http://b", "http://a"]), &known);
        assert_eq!(picked, strings(&["http://c", "http://a"]));
    }

    #[test]
    fn keeps_duplicates() {
        let picked = select_new(&strings(&["http://a", "http://a"]), &HashSet::new());
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn idempotent_without_marking() {
        let known: HashSet<String> = strings(&["http://a"]).into_iter().collect();
        let requested = strings(&["http://a", "http://b"]);
        assert_eq!(select_new(&requested, &known), select_new(&requested, &known));
    }

    #[test]
    fn everything_known_yields_empty() {
        let known: HashSet<String> = strings(&["http://a"]).into_iter().collect();
        assert!(select_new(&strings(&["http://a"]), &known).is_empty());
    }
}
