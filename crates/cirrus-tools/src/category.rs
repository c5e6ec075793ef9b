//! Tool categories and keyword matching.

use cirrus_mcp::McpServerConfig;

/// Whether a category's provider can be started in this environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Missing prerequisite, e.g. an unset token.
    Unavailable { reason: String },
}

/// A named group of tools served by one MCP provider process.
#[derive(Debug, Clone)]
pub struct ToolCategory {
    /// Stable identifier (`azure`, `github`, ...).
    pub name: String,
    /// Human-readable name used in summaries.
    pub label: String,
    /// Lowercase trigger words and phrases.
    pub keywords: Vec<String>,
    pub server: McpServerConfig,
    pub availability: Availability,
}

impl ToolCategory {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        keywords: &[&str],
        server: McpServerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            keywords: keywords.iter().map(|k| normalize(k)).collect(),
            server,
            availability: Availability::Available,
        }
    }

    pub fn unavailable(mut self, reason: impl Into<String>) -> Self {
        self.availability = Availability::Unavailable {
            reason: reason.into(),
        };
        self
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// The first keyword found in `text`, if any.
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let normalized = normalize(text);
        self.keywords
            .iter()
            .find(|k| keyword_matches(&normalized, k))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matched_keyword(text).is_some()
    }
}

/// Lowercase and collapse runs of whitespace to one space.
pub(crate) fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whole-word (or whole-phrase) test of `keyword` in already-lowercased
/// `haystack`. A trailing plural `s` or `es` still counts as a match.
pub fn keyword_matches(haystack: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }

    haystack.match_indices(keyword).any(|(start, _)| {
        let starts_word = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        if !starts_word {
            return false;
        }

        let rest = &haystack[start + keyword.len()..];
        [rest, rest.strip_prefix("es").unwrap_or(rest), rest.strip_prefix('s').unwrap_or(rest)]
            .iter()
            .any(|tail| tail.chars().next().is_none_or(|c| !c.is_alphanumeric()))
    })
}
