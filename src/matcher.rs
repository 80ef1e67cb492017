//! Sender classification against wildcard-domain and exact-address patterns.
//!
//! Wildcard patterns are a plain string-suffix test on the lowercased address:
//! `*@mail.beehiiv.com` matches anything ending in `mail.beehiiv.com`, so
//! `notmail.beehiiv.com` and `evilmail.com@mail.beehiiv.com` both match. The
//! domain part of the address is never parsed.

use std::collections::HashSet;

use serde::Serialize;

use crate::db::models::CuratedPattern;

const WILDCARD_PREFIX: &str = "*@";

/// Newsletter platforms recognised without any curated rows.
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("*@substack.com", "Substack"),
    ("*@mail.beehiiv.com", "beehiiv"),
    ("*@convertkit.com", "ConvertKit"),
    ("*@buttondown.email", "Buttondown"),
    ("*@ghost.io", "Ghost"),
    ("*@mailchimp.com", "Mailchimp"),
    ("*@list-manage.com", "Mailchimp"),
    ("*@mailerlite.com", "MailerLite"),
    ("*@revue.email", "Revue"),
    ("noreply@medium.com", "Medium"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SenderPattern {
    /// `*@domain`; stores the lowercased domain without the `*@` prefix.
    Domain { domain: String },
    /// A full address compared case-insensitively.
    Exact { address: String },
}

impl SenderPattern {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match normalized.strip_prefix(WILDCARD_PREFIX) {
            Some(domain) => Self::Domain {
                domain: domain.to_string(),
            },
            None => Self::Exact {
                address: normalized,
            },
        }
    }

    pub fn matches(&self, address: &str) -> bool {
        let address = address.to_lowercase();
        match self {
            Self::Domain { domain } => address.ends_with(domain.as_str()),
            Self::Exact { address: expected } => address == *expected,
        }
    }
}

/// True when any pattern matches; an empty slice never matches.
pub fn matches_any(address: &str, patterns: &[SenderPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(address))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternOrigin {
    Builtin,
    Curated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedPattern {
    pub raw: String,
    pub pattern: SenderPattern,
    pub display_name: Option<String>,
    pub origin: PatternOrigin,
}

impl NamedPattern {
    pub fn new(raw: &str, display_name: Option<&str>, origin: PatternOrigin) -> Self {
        Self {
            raw: raw.trim().to_string(),
            pattern: SenderPattern::parse(raw),
            display_name: display_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            origin,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<NamedPattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut set = Self::new();
        for (raw, name) in BUILTIN_PATTERNS {
            set.push(NamedPattern::new(raw, Some(*name), PatternOrigin::Builtin));
        }
        set
    }

    /// Built-in patterns followed by the curated rows.
    pub fn with_curated(curated: &[CuratedPattern]) -> Self {
        let mut set = Self::builtin();
        set.extend_curated(curated);
        set
    }

    pub fn extend_curated(&mut self, curated: &[CuratedPattern]) {
        for row in curated.iter().filter(|row| row.is_active) {
            self.push(NamedPattern::new(
                &row.pattern,
                row.display_name.as_deref(),
                PatternOrigin::Curated,
            ));
        }
    }

    /// Adds a pattern unless an equivalent one is already present.
    pub fn push(&mut self, pattern: NamedPattern) {
        if pattern.raw.is_empty() || self.patterns.iter().any(|p| p.pattern == pattern.pattern) {
            return;
        }
        self.patterns.push(pattern);
    }

    pub fn first_match(&self, address: &str) -> Option<&NamedPattern> {
        self.patterns.iter().find(|p| p.pattern.matches(address))
    }

    pub fn matches(&self, address: &str) -> bool {
        self.first_match(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedPattern> {
        self.patterns.iter()
    }

    pub fn display_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.patterns
            .iter()
            .filter_map(|p| p.display_name.as_deref())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{matches_any, NamedPattern, PatternOrigin, PatternSet, SenderPattern};
    use crate::db::models::CuratedPattern;

    fn curated(id: i64, pattern: &str, name: Option<&str>, active: bool) -> CuratedPattern {
        CuratedPattern {
            id,
            pattern: pattern.to_string(),
            display_name: name.map(str::to_string),
            is_active: active,
            created_at: None,
        }
    }

    #[test]
    fn wildcard_is_a_case_insensitive_suffix_test() {
        let pattern = SenderPattern::parse("*@Mail.Beehiiv.com");
        assert!(pattern.matches("a@mail.beehiiv.com"));
        assert!(pattern.matches("Writer@MAIL.BEEHIIV.COM"));
        assert!(!pattern.matches("a@beehiiv.com"));
        assert!(!pattern.matches("a@mail.beehiiv.com.evil.net"));
    }

    #[test]
    fn wildcard_keeps_suffix_false_positives() {
        let pattern = SenderPattern::parse("*@mail.beehiiv.com");
        assert!(pattern.matches("notmail.beehiiv.com"));
        assert!(pattern.matches("evilmail.com@mail.beehiiv.com"));
        assert!(pattern.matches("x@evilmail.beehiiv.com"));
    }

    #[test]
    fn exact_requires_full_case_insensitive_equality() {
        let pattern = SenderPattern::parse("Digest@Example.com");
        assert!(pattern.matches("digest@example.com"));
        assert!(pattern.matches("DIGEST@EXAMPLE.COM"));
        assert!(!pattern.matches("weekly.digest@example.com"));
        assert!(!pattern.matches("digest@example.com.au"));
    }

    #[test]
    fn wildcard_agrees_with_lowercase_ends_with() {
        let domains = ["substack.com", "Mail.Beehiiv.com", "ghost.io"];
        let addresses = [
            "a@substack.com",
            "A@SUBSTACK.COM",
            "writer@ghost.io",
            "ghost.io",
            "someone@example.com",
            "notmail.beehiiv.com",
            "",
        ];
        for domain in domains {
            let pattern = SenderPattern::parse(&format!("*@{domain}"));
            for address in addresses {
                assert_eq!(
                    pattern.matches(address),
                    address.to_lowercase().ends_with(&domain.to_lowercase()),
                    "{address} vs *@{domain}"
                );
            }
        }
    }

    #[test]
    fn matches_any_is_logical_or() {
        let patterns = vec![
            SenderPattern::parse("*@substack.com"),
            SenderPattern::parse("digest@example.com"),
        ];
        assert!(matches_any("a@substack.com", &patterns));
        assert!(matches_any("digest@example.com", &patterns));
        assert!(!matches_any("friend@example.com", &patterns));

        let mut reversed = patterns.clone();
        reversed.reverse();
        for address in ["a@substack.com", "digest@example.com", "friend@example.com"] {
            assert_eq!(
                matches_any(address, &patterns),
                matches_any(address, &reversed)
            );
        }
    }

    #[test]
    fn empty_pattern_list_never_matches() {
        assert!(!matches_any("a@substack.com", &[]));
        assert!(!matches_any("", &[]));
        assert!(!PatternSet::new().matches("a@substack.com"));
    }

    #[test]
    fn pattern_set_merges_curated_rows_and_skips_duplicates() {
        let rows = vec![
            curated(1, "*@SUBSTACK.com", Some("Dup"), true),
            curated(2, "weekly@news.example.org", Some("Weekly"), true),
            curated(3, "*@inactive.example", None, false),
        ];
        let set = PatternSet::with_curated(&rows);
        let builtin_len = PatternSet::builtin().len();
        assert_eq!(set.len(), builtin_len + 1);

        let hit = set
            .first_match("weekly@news.example.org")
            .expect("curated match");
        assert_eq!(hit.origin, PatternOrigin::Curated);
        assert_eq!(hit.display_name.as_deref(), Some("Weekly"));

        let substack = set.first_match("a@substack.com").expect("builtin match");
        assert_eq!(substack.display_name.as_deref(), Some("Substack"));
        assert!(!set.matches("x@inactive.example"));
    }

    #[test]
    fn blank_display_names_are_dropped() {
        let pattern = NamedPattern::new(" *@ghost.io ", Some("  "), PatternOrigin::Curated);
        assert_eq!(pattern.raw, "*@ghost.io");
        assert!(pattern.display_name.is_none());
    }

    #[test]
    fn display_names_are_unique() {
        let set = PatternSet::builtin();
        let names = set.display_names();
        assert_eq!(names.iter().filter(|n| **n == "Mailchimp").count(), 1);
    }
}
