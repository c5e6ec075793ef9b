//! Keyword classification of a prompt into tool categories.

use crate::catalog::Catalog;
use crate::category::ToolCategory;

/// A category whose keywords occur in the prompt.
#[derive(Debug, Clone, Copy)]
pub struct CategoryMatch<'a> {
    pub category: &'a ToolCategory,
    /// The keyword that triggered the match.
    pub keyword: &'a str,
}

/// Every category matching `text`, in catalog order. Unavailable categories
/// are included so callers can explain why nothing was loaded for them.
pub fn classify<'a>(catalog: &'a Catalog, text: &str) -> Vec<CategoryMatch<'a>> {
    catalog
        .iter()
        .filter_map(|category| {
            category
                .matched_keyword(text)
                .map(|keyword| CategoryMatch { category, keyword })
        })
        .collect()
}
