//! Degraded-mode text returned when every provider failed.

use std::collections::HashMap;

use crate::types::DEFAULT_DOMAIN;

/// Supplies deterministic content for a domain tag.
pub trait FallbackText: Send + Sync {
    fn text_for(&self, domain: &str) -> String;
}

/// Fixed per-domain table with a generic default.
#[derive(Debug, Clone)]
pub struct StaticFallbackText {
    entries: HashMap<String, String>,
    default: String,
}

impl StaticFallbackText {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            default: default.into(),
        }
    }

    pub fn with_entry(mut self, domain: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.insert(domain.into(), text.into());
        self
    }
}

impl Default for StaticFallbackText {
    fn default() -> Self {
        Self::new(
            "The assistant is temporarily unavailable. Showing a placeholder summary; \
             please try again shortly.",
        )
        .with_entry(
            DEFAULT_DOMAIN,
            "AI-generated insights are temporarily unavailable. Please try again shortly.",
        )
        .with_entry(
            "retail",
            "Retail insights are temporarily unavailable. Review recent sales trends and \
             inventory levels directly while the assistant recovers.",
        )
        .with_entry(
            "finance",
            "Financial analysis is temporarily unavailable. Key metrics remain visible in \
             the reports while the assistant recovers.",
        )
        .with_entry(
            "healthcare",
            "Healthcare insights are temporarily unavailable. Operational dashboards remain \
             available while the assistant recovers.",
        )
    }
}

impl FallbackText for StaticFallbackText {
    fn text_for(&self, domain: &str) -> String {
        self.entries
            .get(domain)
            .unwrap_or(&self.default)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_domain() {
        let fb = StaticFallbackText::new("default").with_entry("retail", "shop text");
        assert_eq!(fb.text_for("retail"), "shop text");
    }

    #[test]
    fn test_unknown_domain_uses_default() {
        let fb = StaticFallbackText::new("default");
        assert_eq!(fb.text_for("astronomy"), "default");
    }

    #[test]
    fn test_builtin_table_covers_general() {
        let fb = StaticFallbackText::default();
        assert!(!fb.text_for(DEFAULT_DOMAIN).is_empty());
        assert_ne!(fb.text_for("retail"), fb.text_for(DEFAULT_DOMAIN));
    }
}
