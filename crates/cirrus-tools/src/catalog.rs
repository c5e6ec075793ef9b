//! The set of tool categories known to a Cirrus process.

use std::collections::{BTreeMap, HashMap};

use cirrus_mcp::McpServerConfig;
use serde::{Deserialize, Serialize};

use crate::category::{ToolCategory, normalize};

/// Category activated when a prompt matches nothing and nothing is loaded yet.
pub const DEFAULT_CATEGORY: &str = "azure";

const AZURE_KEYWORDS: &[&str] = &[
    "azure",
    "subscription",
    "resource",
    "aks",
    "kubernetes",
    "sql",
    "storage",
    "cosmos",
    "keyvault",
    "key vault",
    "monitor",
    "bicep",
    "terraform",
    "virtual desktop",
    "redis",
    "postgres",
    "service bus",
    "load testing",
    "grafana",
    "datadog",
    "marketplace",
];

const GITHUB_KEYWORDS: &[&str] = &[
    "github",
    "repository",
    "repo",
    "pull request",
    "pr",
    "issue",
    "commit",
    "workflow",
    "actions",
    "gist",
    "branch",
    "fork",
    "code",
    "search code",
    "organization",
    "user",
    "notification",
];

const ADO_KEYWORDS: &[&str] = &[
    "azure devops",
    "devops",
    "ado",
    "work item",
    "pipeline",
    "build",
    "release",
    "sprint",
    "backlog",
    "board",
];

const PLAYWRIGHT_KEYWORDS: &[&str] = &[
    "playwright",
    "browse",
    "website",
    "web page",
    "webpage",
    "url",
    "screenshot",
    "navigate",
    "scrape",
];

/// Inputs that decide which built-in categories can run.
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    pub github_token: Option<String>,
    pub ado_org: Option<String>,
    /// Per-category tweaks from the config file, keyed by category name.
    pub overrides: BTreeMap<String, CategoryOverride>,
}

/// Field-by-field replacement for a category. Unknown names define new ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoryOverride {
    pub label: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    /// Merged into the provider's environment.
    pub env: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
    /// `false` removes the category entirely.
    pub enabled: Option<bool>,
}

/// Ordered list of categories. Order decides classification and summaries.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: Vec<ToolCategory>,
}

impl Catalog {
    pub fn new(categories: Vec<ToolCategory>) -> Self {
        Self { categories }
    }

    /// The built-in Azure, GitHub, Azure DevOps and Playwright categories,
    /// with config-file overrides applied.
    pub fn builtin(options: &CatalogOptions) -> Self {
        let azure = ToolCategory::new(
            "azure",
            "Azure",
            AZURE_KEYWORDS,
            McpServerConfig::new("npx", ["-y", "@azure/mcp@latest", "server", "start"]),
        );

        let github_server = McpServerConfig::new(
            "docker",
            [
                "run",
                "-i",
                "--rm",
                "-e",
                "GITHUB_PERSONAL_ACCESS_TOKEN",
                "ghcr.io/github/github-mcp-server",
                "stdio",
            ],
        );
        let github = match non_empty(&options.github_token) {
            Some(token) => ToolCategory::new(
                "github",
                "GitHub",
                GITHUB_KEYWORDS,
                github_server.with_env("GITHUB_PERSONAL_ACCESS_TOKEN", token),
            ),
            None => ToolCategory::new("github", "GitHub", GITHUB_KEYWORDS, github_server)
                .unavailable("GITHUB_PERSONAL_ACCESS_TOKEN is not set"),
        };

        let ado = match non_empty(&options.ado_org) {
            Some(org) => ToolCategory::new(
                "ado",
                "Azure DevOps",
                ADO_KEYWORDS,
                McpServerConfig::new("npx", ["-y", "@azure-devops/mcp", org]),
            ),
            None => ToolCategory::new(
                "ado",
                "Azure DevOps",
                ADO_KEYWORDS,
                McpServerConfig::new("npx", ["-y", "@azure-devops/mcp"]),
            )
            .unavailable("ADO_ORG is not set"),
        };

        let playwright = ToolCategory::new(
            "playwright",
            "Playwright",
            PLAYWRIGHT_KEYWORDS,
            McpServerConfig::new("npx", ["@playwright/mcp@latest", "--headless"]),
        );

        let mut catalog = Self::new(vec![azure, github, ado, playwright]);
        for (name, patch) in &options.overrides {
            catalog.apply_override(name, patch);
        }
        catalog
    }

    fn apply_override(&mut self, name: &str, patch: &CategoryOverride) {
        if patch.enabled == Some(false) {
            self.categories.retain(|c| c.name != name);
            tracing::debug!("Tool category '{name}' disabled by config");
            return;
        }

        let position = self.categories.iter().position(|c| c.name == name);
        let category = match position {
            Some(i) => &mut self.categories[i],
            None => {
                let Some(command) = &patch.command else {
                    tracing::warn!("Ignoring new tool category '{name}': no command configured");
                    return;
                };
                self.categories.push(ToolCategory::new(
                    name,
                    name,
                    &[],
                    McpServerConfig::new(command.clone(), Vec::<String>::new()),
                ));
                let last = self.categories.len() - 1;
                &mut self.categories[last]
            }
        };

        if let Some(label) = &patch.label {
            category.label = label.clone();
        }
        if let Some(keywords) = &patch.keywords {
            category.keywords = keywords.iter().map(|k| normalize(k)).collect();
        }
        if let Some(command) = &patch.command {
            category.server.command = command.clone();
        }
        if let Some(args) = &patch.args {
            category.server.args = args.clone();
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            category.server.timeout_ms = timeout_ms;
        }
        category
            .server
            .env
            .extend(patch.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn get(&self, name: &str) -> Option<&ToolCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolCategory> {
        self.categories.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
