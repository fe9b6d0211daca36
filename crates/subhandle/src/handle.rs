//! Handle names, labels and identities.
//!
//! A vanity handle is `label.domain`, where `label` is whatever the user asked
//! for with every character outside `[A-Za-z0-9-]` removed. The identity side
//! of a binding is an opaque DID string handed back by the resolver.

use crate::{Error, Result};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Opaque decentralized identifier, e.g. `did:plc:ewvi7nxzyoun6zhxrhs64oiz`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "identity must not be empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wraps a value read back from the store, which was validated on write.
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Removes every character outside `[A-Za-z0-9-]`.
///
/// Only ASCII letters and digits survive; accented or other non-ASCII
/// alphanumerics are dropped along with punctuation and whitespace.
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// A sanitized, non-empty subdomain label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HandleLabel(String);

impl HandleLabel {
    /// Sanitizes `raw` and rejects the result if nothing is left.
    pub fn parse(raw: &str) -> Result<Self> {
        let label = sanitize_label(raw);
        if label.is_empty() {
            return Err(Error::InvalidRequest {
                reason: format!("handle {raw:?} has no usable characters"),
            });
        }
        Ok(Self(label))
    }

    /// Like [`HandleLabel::parse`], but first drops a trailing `.domain` so
    /// `alice.warga.cloud` and `alice` name the same handle.
    pub fn parse_under(raw: &str, domain: &str) -> Result<Self> {
        let raw = raw.trim();
        let suffix = format!(".{domain}");
        let bare = match raw.len().checked_sub(suffix.len()) {
            Some(split)
                if raw.is_char_boundary(split) && raw[split..].eq_ignore_ascii_case(&suffix) =>
            {
                &raw[..split]
            }
            _ => raw,
        };
        Self::parse(bare)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `label.domain`.
    pub fn qualified(&self, domain: &str) -> String {
        format!("{}.{}", self.0, domain)
    }
}

impl fmt::Display for HandleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the subdomain label from a `Host` header value.
///
/// `alice.warga.cloud:8443` yields `alice`. Returns `None` for an empty host.
pub fn label_from_host(host: &str) -> Option<&str> {
    let host = host.trim();
    let host = host.split(':').next().unwrap_or(host);
    host.split('.').next().filter(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_everything_outside_the_allowed_set() {
        assert_eq!(sanitize_label("alice"), "alice");
        assert_eq!(sanitize_label("Al-ice_99"), "Al-ice99");
        assert_eq!(sanitize_label(" bob.warga.cloud "), "bobwargacloud");
        assert_eq!(sanitize_label("ça-va?!"), "a-va");
        assert_eq!(sanitize_label("<script>"), "script");
        assert_eq!(sanitize_label("@#$%"), "");
    }

    #[test]
    fn parse_rejects_labels_that_sanitize_to_nothing() {
        assert!(matches!(
            HandleLabel::parse("!!!"),
            Err(Error::InvalidRequest { .. })
        ));
        assert!(matches!(
            HandleLabel::parse(""),
            Err(Error::InvalidRequest { .. })
        ));
    }

    #[test]
    fn qualified_joins_label_and_domain() {
        let label = HandleLabel::parse("sri wedari").unwrap();
        assert_eq!(label.as_str(), "sriwedari");
        assert_eq!(label.qualified("warga.cloud"), "sriwedari.warga.cloud");
    }

    #[test]
    fn parse_under_drops_the_vanity_domain_suffix() {
        let parse = |raw| HandleLabel::parse_under(raw, "warga.cloud");
        assert_eq!(parse("alice.warga.cloud").unwrap().as_str(), "alice");
        assert_eq!(parse("Alice.WARGA.cloud").unwrap().as_str(), "Alice");
        assert_eq!(parse(" alice ").unwrap().as_str(), "alice");
        assert_eq!(parse("alice.bsky.social").unwrap().as_str(), "alicebskysocial");
        assert!(parse(".warga.cloud").is_err());
    }

    #[test]
    fn label_from_host_takes_the_first_label() {
        assert_eq!(label_from_host("alice.warga.cloud"), Some("alice"));
        assert_eq!(label_from_host("alice.warga.cloud:8443"), Some("alice"));
        assert_eq!(label_from_host("localhost:3000"), Some("localhost"));
        assert_eq!(label_from_host(".warga.cloud"), None);
        assert_eq!(label_from_host(""), None);
    }

    #[test]
    fn did_rejects_blank_input() {
        assert!(Did::new("   ").is_err());
        assert_eq!(Did::new(" did:plc:abc ").unwrap().as_str(), "did:plc:abc");
    }
}
