//! The `EXCLUDE` exclusion set: containers kondense never samples or patches.

use std::collections::HashSet;
use std::env;

/// Parse the comma-separated `EXCLUDE` environment variable into a set of
/// container names. Empty/unset yields an empty set.
pub fn excluded_containers() -> HashSet<String> {
    match env::var("EXCLUDE") {
        Ok(raw) if !raw.is_empty() => raw.split(',').map(|s| s.trim().to_string()).collect(),
        _ => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_is_empty() {
        env::remove_var("EXCLUDE");
        assert!(excluded_containers().is_empty());
    }

    #[test]
    fn splits_on_comma() {
        env::set_var("EXCLUDE", "sidecar,envoy");
        let set = excluded_containers();
        assert!(set.contains("sidecar"));
        assert!(set.contains("envoy"));
        assert_eq!(set.len(), 2);
        env::remove_var("EXCLUDE");
    }
}
