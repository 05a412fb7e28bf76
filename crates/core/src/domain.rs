//! Domain tags for experts and knowledge snippets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named specialty area.
///
/// The set of domains is agreed at configuration time (see
/// [`ConsiliumConfig::domains`](crate::ConsiliumConfig)). Names are
/// normalized to trimmed lowercase so `"Chemistry"` and `"chemistry"` tag the
/// same knowledge store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Create a domain tag from any string-like name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// The catch-all domain used by generalist experts.
    pub fn general() -> Self {
        Self::new("general")
    }

    /// Get the normalized domain name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Domain {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Domain {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Domain> for String {
    fn from(value: Domain) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_normalization() {
        assert_eq!(Domain::new(" Chemistry "), Domain::new("chemistry"));
        assert_eq!(Domain::from("BIOLOGY").as_str(), "biology");
    }

    #[test]
    fn test_domain_serde_roundtrip_normalizes() {
        let domain: Domain = serde_json::from_str("\"Physics\"").unwrap();
        assert_eq!(domain.as_str(), "physics");
        assert_eq!(serde_json::to_string(&domain).unwrap(), "\"physics\"");
    }
}
