//! Name-based dispatch of tool calls to the category that owns the tool.

use std::collections::HashMap;
use std::sync::Arc;

use cirrus_types::{Tool, ToolDefinition, ToolError, ToolOutput};

/// Which categories' tools a model call may see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolScope {
    #[default]
    All,
    Categories(Vec<String>),
    None,
}

impl ToolScope {
    pub fn only(category: impl Into<String>) -> Self {
        Self::Categories(vec![category.into()])
    }

    pub fn includes(&self, category: &str) -> bool {
        match self {
            Self::All => true,
            Self::Categories(names) => names.iter().any(|n| n == category),
            Self::None => false,
        }
    }
}

struct Route {
    category: String,
    tool: Arc<dyn Tool>,
}

/// Maps tool names to their tool and owning category.
#[derive(Default)]
pub struct ToolRouter {
    routes: HashMap<String, Route>,
    /// Registration order, for stable definition lists.
    order: Vec<String>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool for `category`. The first registration of a name wins;
    /// returns `false` when the name was already taken.
    pub fn register(&mut self, category: &str, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if let Some(existing) = self.routes.get(&name) {
            tracing::warn!(
                "Tool '{name}' from '{category}' shadowed by the one already registered by '{}'",
                existing.category
            );
            return false;
        }
        self.order.push(name.clone());
        self.routes.insert(
            name,
            Route {
                category: category.to_string(),
                tool,
            },
        );
        true
    }

    /// Drop every tool owned by `category`.
    pub fn remove_category(&mut self, category: &str) {
        self.routes.retain(|_, route| route.category != category);
        let routes = &self.routes;
        self.order.retain(|name| routes.contains_key(name));
    }

    pub fn clear(&mut self) {
        self.routes.clear();
        self.order.clear();
    }

    /// Definitions in registration order, limited to `scope`.
    pub fn definitions(&self, scope: &ToolScope) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.routes.get(name))
            .filter(|route| scope.includes(&route.category))
            .map(|route| route.tool.definition())
            .collect()
    }

    pub fn category_of(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|r| r.category.as_str())
    }

    pub fn count_for(&self, category: &str) -> usize {
        self.routes
            .values()
            .filter(|r| r.category == category)
            .count()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run the named tool. Its output is returned as-is.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let route = self.routes.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        tracing::debug!("Routing tool call '{name}' to '{}'", route.category);
        route.tool.execute(input).await
    }
}
