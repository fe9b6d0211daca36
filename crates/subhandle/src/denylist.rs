//! Operator-reserved names.
//!
//! The denylist is configured as a single string (`BAN_LIST`) of entries
//! separated by commas or whitespace. An entry may be a bare label (`admin`)
//! or a fully qualified name (`admin.warga.cloud`); both forms reserve the
//! same handle. Matching is ASCII case-insensitive.

use crate::handle::sanitize_label;

#[derive(Clone, Debug, Default)]
pub struct Denylist {
    entries: Vec<String>,
}

impl Denylist {
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if `label` under `domain` is reserved.
    ///
    /// `label` is sanitized before matching so callers may pass raw input.
    pub fn is_denied(&self, label: &str, domain: &str) -> bool {
        let label = sanitize_label(label).to_ascii_lowercase();
        if label.is_empty() {
            return false;
        }
        let qualified = format!("{label}.{}", domain.to_ascii_lowercase());
        self.entries
            .iter()
            .any(|entry| *entry == label || *entry == qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "warga.cloud";

    #[test]
    fn parses_comma_and_whitespace_separated_entries() {
        let list = Denylist::parse(" admin, www.warga.cloud\n support  ,,");
        assert_eq!(list.len(), 3);
        assert!(!list.is_empty());
        assert!(Denylist::parse("").is_empty());
        assert!(Denylist::parse(" , ").is_empty());
    }

    #[test]
    fn bare_and_qualified_entries_reserve_the_same_label() {
        let list = Denylist::parse("admin,www.warga.cloud");
        assert!(list.is_denied("admin", DOMAIN));
        assert!(list.is_denied("www", DOMAIN));
        assert!(!list.is_denied("alice", DOMAIN));
    }

    #[test]
    fn matching_ignores_case_and_unsanitized_input() {
        let list = Denylist::parse("Admin");
        assert!(list.is_denied("ADMIN", DOMAIN));
        assert!(list.is_denied("ad.min!", DOMAIN));
    }

    #[test]
    fn entries_for_other_domains_do_not_match() {
        let list = Denylist::parse("www.example.com");
        assert!(!list.is_denied("www", DOMAIN));
        assert!(list.is_denied("www", "example.com"));
    }

    #[test]
    fn partial_matches_are_not_denied() {
        let list = Denylist::parse("admin");
        assert!(!list.is_denied("administrator", DOMAIN));
        assert!(!list.is_denied("", DOMAIN));
    }
}
