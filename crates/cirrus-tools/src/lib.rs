//! Tool categories and their on-demand MCP providers.
//!
//! A prompt is matched against each category's keywords. The first match
//! launches that category's provider, and its tools become routable for the
//! rest of the conversation.

mod catalog;
mod category;
mod classifier;
mod error;
mod manager;
mod router;

pub use catalog::{Catalog, CatalogOptions, CategoryOverride, DEFAULT_CATEGORY};
pub use category::{Availability, ToolCategory, keyword_matches};
pub use classifier::{CategoryMatch, classify};
pub use error::LaunchError;
pub use manager::{
    ActivationReport, LoadedCategory, McpLauncher, ProviderLauncher, ProviderSession, ToolManager,
};
pub use router::{ToolRouter, ToolScope};
