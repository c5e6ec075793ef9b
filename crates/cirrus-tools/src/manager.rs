//! Per-conversation tool state: which providers are running and which tools
//! they expose.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cirrus_mcp::{McpClient, McpTool};
use cirrus_types::{Tool, ToolDefinition, ToolError, ToolOutput};

use crate::catalog::{Catalog, DEFAULT_CATEGORY};
use crate::category::{Availability, ToolCategory};
use crate::classifier::classify;
use crate::error::LaunchError;
use crate::router::{ToolRouter, ToolScope};

/// A running provider.
pub trait ProviderSession: Send + Sync {
    /// Tools the provider exposes, in the provider's order.
    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Starts the provider behind a category.
pub trait ProviderLauncher: Send + Sync {
    fn launch<'a>(
        &'a self,
        category: &'a ToolCategory,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ProviderSession>, LaunchError>> + Send + 'a>>;
}

/// Launches categories as MCP stdio servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct McpLauncher;

struct McpSession {
    client: Arc<McpClient>,
}

impl ProviderLauncher for McpLauncher {
    fn launch<'a>(
        &'a self,
        category: &'a ToolCategory,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ProviderSession>, LaunchError>> + Send + 'a>>
    {
        Box::pin(async move {
            let client = McpClient::connect(category.name.clone(), &category.server)
                .await
                .map_err(|e| LaunchError::Failed {
                    category: category.name.clone(),
                    message: e.to_string(),
                })?;
            Ok(Box::new(McpSession {
                client: Arc::new(client),
            }) as Box<dyn ProviderSession>)
        })
    }
}

impl ProviderSession for McpSession {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        McpTool::all_from(&self.client)
            .into_iter()
            .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
            .collect()
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.client.shutdown())
    }
}

/// What one call to [`ToolManager::activate_for_prompt`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub loaded: Vec<LoadedCategory>,
    /// Matched categories that cannot run here, with the reason.
    pub unavailable: Vec<(String, String)>,
    /// Launches that failed, with the error. They are retried on a later turn.
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCategory {
    pub name: String,
    pub label: String,
    pub tool_count: usize,
}

impl ActivationReport {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty() && self.unavailable.is_empty() && self.failed.is_empty()
    }

    /// One human-readable status line per outcome.
    pub fn status_lines(&self) -> Vec<String> {
        let loaded = self
            .loaded
            .iter()
            .map(|l| format!("Loaded {} {} tools", l.tool_count, l.label));
        let unavailable = self
            .unavailable
            .iter()
            .map(|(name, reason)| format!("Skipping {name} tools: {reason}"));
        let failed = self
            .failed
            .iter()
            .map(|(name, error)| format!("Failed to load {name} tools: {error}"));
        loaded.chain(unavailable).chain(failed).collect()
    }
}

struct ActiveCategory {
    name: String,
    session: Box<dyn ProviderSession>,
}

/// Lazily starts category providers and routes calls to their tools.
///
/// One manager belongs to one conversation. A category is launched at most
/// once successfully; failed launches are forgotten so a later prompt can
/// try again.
pub struct ToolManager {
    catalog: Arc<Catalog>,
    launcher: Arc<dyn ProviderLauncher>,
    enabled: bool,
    default_category: Option<String>,
    active: Vec<ActiveCategory>,
    router: ToolRouter,
}

impl ToolManager {
    pub fn new(catalog: Arc<Catalog>, launcher: Arc<dyn ProviderLauncher>) -> Self {
        Self {
            catalog,
            launcher,
            enabled: true,
            default_category: Some(DEFAULT_CATEGORY.to_string()),
            active: Vec::new(),
            router: ToolRouter::new(),
        }
    }

    /// Category to start when a prompt matches nothing and nothing runs yet.
    /// `None` disables the fallback.
    pub fn with_default_category(mut self, category: Option<String>) -> Self {
        self.default_category = category;
        self
    }

    /// A disabled manager never launches anything.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn is_active(&self, category: &str) -> bool {
        self.active.iter().any(|a| a.name == category)
    }

    /// Running categories in activation order.
    pub fn active_categories(&self) -> Vec<&str> {
        self.active.iter().map(|a| a.name.as_str()).collect()
    }

    /// Start every not-yet-running category whose keywords occur in `text`.
    pub async fn activate_for_prompt(&mut self, text: &str) -> ActivationReport {
        if !self.enabled {
            return ActivationReport::default();
        }

        let catalog = Arc::clone(&self.catalog);
        let default_category = self.default_category.clone();
        let mut wanted: Vec<&str> = classify(&catalog, text)
            .into_iter()
            .map(|m| m.category.name.as_str())
            .collect();
        if wanted.is_empty() && self.active.is_empty() {
            if let Some(default) = default_category.as_deref() {
                tracing::debug!("No category matched, falling back to '{default}'");
                wanted.push(default);
            }
        }

        self.activate_all(&wanted).await
    }

    /// Start each named category that is not running yet, collecting the
    /// outcomes. Launch errors are reported, never returned.
    pub async fn activate_all(&mut self, names: &[&str]) -> ActivationReport {
        let mut report = ActivationReport::default();
        if !self.enabled {
            return report;
        }

        for &name in names {
            if self.is_active(name) {
                continue;
            }
            match self.activate(name).await {
                Ok(tool_count) => report.loaded.push(LoadedCategory {
                    name: name.to_string(),
                    label: self.label_of(name).to_string(),
                    tool_count,
                }),
                Err(LaunchError::Unavailable { category, reason }) => {
                    report.unavailable.push((category, reason));
                }
                Err(LaunchError::UnknownCategory(category))
                    if self.default_category.as_deref() == Some(category.as_str()) =>
                {
                    tracing::warn!("Default tool category '{category}' is not in the catalog");
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    report.failed.push((name.to_string(), e.to_string()));
                }
            }
        }

        report
    }

    /// Start one category by name. Already-running categories are not
    /// relaunched. Returns the number of tools it contributes.
    pub async fn activate(&mut self, name: &str) -> Result<usize, LaunchError> {
        if !self.enabled {
            return Err(LaunchError::Disabled);
        }
        if self.is_active(name) {
            return Ok(self.router.count_for(name));
        }

        let catalog = Arc::clone(&self.catalog);
        let category = catalog
            .get(name)
            .ok_or_else(|| LaunchError::UnknownCategory(name.to_string()))?;
        if let Availability::Unavailable { reason } = &category.availability {
            return Err(LaunchError::Unavailable {
                category: name.to_string(),
                reason: reason.clone(),
            });
        }

        tracing::info!("Activating '{}' tools", category.label);
        let session = self.launcher.launch(category).await?;

        let mut registered = 0;
        for tool in session.tools() {
            if self.router.register(name, tool) {
                registered += 1;
            }
        }
        tracing::info!("Loaded {registered} {} tools", category.label);

        self.active.push(ActiveCategory {
            name: name.to_string(),
            session,
        });
        Ok(registered)
    }

    fn label_of<'a>(&'a self, name: &'a str) -> &'a str {
        self.catalog
            .get(name)
            .map(|c| c.label.as_str())
            .unwrap_or(name)
    }

    pub fn definitions(&self, scope: &ToolScope) -> Vec<ToolDefinition> {
        self.router.definitions(scope)
    }

    pub fn category_of(&self, tool: &str) -> Option<&str> {
        self.router.category_of(tool)
    }

    pub fn tool_count(&self) -> usize {
        self.router.len()
    }

    /// Forward a tool call to the provider that declared the tool.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        self.router.execute(name, input).await
    }

    /// `"Azure (N tools), GitHub (M tools) - Total: K tools"`.
    pub fn summary(&self) -> String {
        if self.active.is_empty() {
            return "No tools loaded".to_string();
        }
        let parts: Vec<String> = self
            .active
            .iter()
            .map(|a| {
                format!(
                    "{} ({} tools)",
                    self.label_of(&a.name),
                    self.router.count_for(&a.name)
                )
            })
            .collect();
        format!("{} - Total: {} tools", parts.join(", "), self.router.len())
    }

    /// Stop every running provider and forget their tools.
    pub async fn shutdown(&mut self) {
        self.router.clear();
        for active in self.active.drain(..) {
            tracing::debug!("Stopping '{}' tools", active.name);
            active.session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CatalogOptions;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct EchoTool(String);

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            &self.0
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.clone(),
                description: String::new(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        fn execute(
            &self,
            _input: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
            Box::pin(async move { Ok(ToolOutput::text(format!("{} ok", self.0))) })
        }
    }

    struct FakeSession {
        tools: Vec<String>,
        stopped: Arc<Mutex<Vec<String>>>,
        category: String,
    }

    impl ProviderSession for FakeSession {
        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            self.tools
                .iter()
                .map(|t| Arc::new(EchoTool(t.clone())) as Arc<dyn Tool>)
                .collect()
        }

        fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.stopped.lock().unwrap().push(self.category.clone());
            })
        }
    }

    /// Counts launches per category; categories listed in `failing` fail
    /// that many times before succeeding.
    #[derive(Default)]
    struct FakeLauncher {
        tools: HashMap<&'static str, Vec<&'static str>>,
        failing: Mutex<HashMap<&'static str, usize>>,
        launches: Mutex<Vec<String>>,
        stopped: Arc<Mutex<Vec<String>>>,
    }

    impl FakeLauncher {
        fn launches_of(&self, category: &str) -> usize {
            self.launches
                .lock()
                .unwrap()
                .iter()
                .filter(|c| *c == category)
                .count()
        }
    }

    impl ProviderLauncher for FakeLauncher {
        fn launch<'a>(
            &'a self,
            category: &'a ToolCategory,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ProviderSession>, LaunchError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.launches.lock().unwrap().push(category.name.clone());
                if let Some(remaining) = self.failing.lock().unwrap().get_mut(category.name.as_str())
                {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(LaunchError::Failed {
                            category: category.name.clone(),
                            message: "npx not found".into(),
                        });
                    }
                }
                let tools = self
                    .tools
                    .get(category.name.as_str())
                    .map(|t| t.iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default();
                Ok(Box::new(FakeSession {
                    tools,
                    stopped: Arc::clone(&self.stopped),
                    category: category.name.clone(),
                }) as Box<dyn ProviderSession>)
            })
        }
    }

    fn launcher() -> Arc<FakeLauncher> {
        let mut tools = HashMap::new();
        tools.insert("azure", vec!["subscription_list", "group_list", "search"]);
        tools.insert("github", vec!["get_me", "list_issues", "search"]);
        tools.insert("playwright", vec!["browser_navigate"]);
        Arc::new(FakeLauncher {
            tools,
            ..FakeLauncher::default()
        })
    }

    fn catalog(with_github: bool) -> Arc<Catalog> {
        Arc::new(Catalog::builtin(&CatalogOptions {
            github_token: with_github.then(|| "ghp_test".to_string()),
            ..CatalogOptions::default()
        }))
    }

    fn manager(launcher: &Arc<FakeLauncher>) -> ToolManager {
        ToolManager::new(catalog(true), Arc::clone(launcher) as Arc<dyn ProviderLauncher>)
    }

    #[tokio::test]
    async fn keyword_activates_category_once() {
        let launcher = launcher();
        let mut tools = manager(&launcher);

        let report = tools.activate_for_prompt("list my azure subscriptions").await;
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].name, "azure");
        assert_eq!(report.loaded[0].tool_count, 3);

        let report = tools.activate_for_prompt("and the storage accounts?").await;
        assert!(report.is_empty());
        assert_eq!(launcher.launches_of("azure"), 1);
    }

    #[tokio::test]
    async fn both_keyword_sets_activate_both() {
        let launcher = launcher();
        let mut tools = manager(&launcher);

        let report = tools
            .activate_for_prompt("compare my Azure subscription with my GitHub repos")
            .await;
        let names: Vec<&str> = report.loaded.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["azure", "github"]);
        assert_eq!(tools.active_categories(), vec!["azure", "github"]);
    }

    #[tokio::test]
    async fn default_category_when_nothing_matches() {
        let launcher = launcher();
        let mut tools = manager(&launcher);

        let report = tools.activate_for_prompt("hello there").await;
        assert_eq!(report.loaded[0].name, "azure");

        // Once something is active, unmatched prompts start nothing new.
        let report = tools.activate_for_prompt("thanks!").await;
        assert!(report.is_empty());
        assert_eq!(launcher.launches_of("azure"), 1);
    }

    #[tokio::test]
    async fn default_fallback_can_be_disabled() {
        let launcher = launcher();
        let mut tools = manager(&launcher).with_default_category(None);
        assert!(tools.activate_for_prompt("hello there").await.is_empty());
        assert!(tools.active_categories().is_empty());
    }

    #[tokio::test]
    async fn disabled_manager_launches_nothing() {
        let launcher = launcher();
        let mut tools = manager(&launcher).with_enabled(false);
        assert!(tools.activate_for_prompt("azure github").await.is_empty());
        assert!(matches!(tools.activate("azure").await, Err(LaunchError::Disabled)));
        assert_eq!(launcher.launches.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unavailable_category_is_reported_not_launched() {
        let launcher = launcher();
        let mut tools = ToolManager::new(catalog(false), Arc::clone(&launcher) as Arc<dyn ProviderLauncher>);

        let report = tools.activate_for_prompt("show my github issues").await;
        assert!(report.loaded.is_empty());
        assert_eq!(report.unavailable.len(), 1);
        assert_eq!(report.unavailable[0].0, "github");
        assert_eq!(launcher.launches_of("github"), 0);
        assert!(
            report.status_lines()[0].contains("GITHUB_PERSONAL_ACCESS_TOKEN"),
            "{:?}",
            report.status_lines()
        );
    }

    #[tokio::test]
    async fn failed_launch_is_retried_next_turn() {
        let launcher = launcher();
        launcher.failing.lock().unwrap().insert("azure", 1);
        let mut tools = manager(&launcher);

        let report = tools.activate_for_prompt("list resource groups").await;
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("npx not found"));
        assert!(!tools.is_active("azure"));

        let report = tools.activate_for_prompt("list resource groups").await;
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(launcher.launches_of("azure"), 2);

        tools.activate_for_prompt("list resource groups").await;
        assert_eq!(launcher.launches_of("azure"), 2);
    }

    #[tokio::test]
    async fn calls_route_to_declaring_provider() {
        let launcher = launcher();
        let mut tools = manager(&launcher);
        tools.activate_for_prompt("azure and github").await;

        let out = tools
            .execute("list_issues", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out.to_text(), "list_issues ok");
        assert_eq!(tools.category_of("list_issues"), Some("github"));
        // Collision: azure registered `search` first.
        assert_eq!(tools.category_of("search"), Some("azure"));

        let err = tools
            .execute("delete_repo", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn scoped_definitions() {
        let launcher = launcher();
        let mut tools = manager(&launcher);
        tools.activate_for_prompt("azure and github").await;

        let github: Vec<String> = tools
            .definitions(&ToolScope::only("github"))
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(github, vec!["get_me", "list_issues"]);
        assert_eq!(tools.definitions(&ToolScope::All).len(), 5);
    }

    #[tokio::test]
    async fn summary_format() {
        let launcher = launcher();
        let mut tools = manager(&launcher);
        assert_eq!(tools.summary(), "No tools loaded");

        tools.activate_for_prompt("azure and github").await;
        assert_eq!(
            tools.summary(),
            "Azure (3 tools), GitHub (2 tools) - Total: 5 tools"
        );
    }

    #[tokio::test]
    async fn explicit_activation() {
        let launcher = launcher();
        let mut tools = manager(&launcher);
        assert_eq!(tools.activate("playwright").await.unwrap(), 1);
        assert_eq!(tools.activate("playwright").await.unwrap(), 1);
        assert_eq!(launcher.launches_of("playwright"), 1);
        assert!(matches!(
            tools.activate("jira").await,
            Err(LaunchError::UnknownCategory(_))
        ));
    }

    #[tokio::test]
    async fn activate_all_reports_each_outcome() {
        let launcher = launcher();
        let mut tools = ToolManager::new(catalog(false), Arc::clone(&launcher) as Arc<dyn ProviderLauncher>);
        tools.activate("azure").await.unwrap();

        let report = tools.activate_all(&["azure", "github", "playwright"]).await;
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].name, "playwright");
        assert_eq!(report.unavailable[0].0, "github");
        assert_eq!(launcher.launches_of("azure"), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_every_session() {
        let launcher = launcher();
        let mut tools = manager(&launcher);
        tools.activate_for_prompt("azure and github").await;
        tools.shutdown().await;

        assert_eq!(*launcher.stopped.lock().unwrap(), vec!["azure", "github"]);
        assert_eq!(tools.tool_count(), 0);
        assert!(tools.active_categories().is_empty());
    }
}
