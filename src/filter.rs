//! Declarative predicate restricting which documents are in scope.

use crate::error::ConfigError;
use crate::types::Document;

/// A document is in scope only if both its URI scheme and its language
/// identifier match. Out-of-scope documents never cause a spawn or a
/// protocol write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFilter {
    scheme: String,
    language_id: String,
}

impl SessionFilter {
    /// Both components must be non-empty; an empty component would match
    /// nothing, turning a misconfiguration into silently dropped documents.
    pub fn new(
        scheme: impl Into<String>,
        language_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let scheme = scheme.into();
        let language_id = language_id.into();
        if scheme.is_empty() {
            return Err(ConfigError::EmptyFilterField { field: "scheme" });
        }
        if language_id.is_empty() {
            return Err(ConfigError::EmptyFilterField { field: "language_id" });
        }
        Ok(Self {
            scheme,
            language_id,
        })
    }

    /// Pure, total: no side effects, no I/O.
    #[must_use]
    pub fn matches(&self, scheme: &str, language_id: &str) -> bool {
        self.scheme == scheme && self.language_id == language_id
    }

    #[must_use]
    pub fn matches_document(&self, doc: &Document) -> bool {
        self.matches(&doc.scheme, &doc.language_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_predicates_must_hold() {
        let filter = SessionFilter::new("file", "yaml").unwrap();
        assert!(filter.matches("file", "yaml"));
        assert!(!filter.matches("file", "json"));
        assert!(!filter.matches("untitled", "yaml"));
        assert!(!filter.matches("untitled", "json"));
    }

    #[test]
    fn empty_components_are_rejected() {
        assert!(matches!(
            SessionFilter::new("", "yaml"),
            Err(ConfigError::EmptyFilterField { field: "scheme" })
        ));
        assert!(matches!(
            SessionFilter::new("file", ""),
            Err(ConfigError::EmptyFilterField { field: "language_id" })
        ));
        assert!(SessionFilter::new("", "").is_err());
    }

    #[test]
    fn matches_document_delegates() {
        let filter = SessionFilter::new("file", "yaml").unwrap();
        assert!(filter.matches_document(&Document::new("file", "yaml", "a.yaml")));
        assert!(!filter.matches_document(&Document::new("file", "markdown", "a.md")));
    }
}
