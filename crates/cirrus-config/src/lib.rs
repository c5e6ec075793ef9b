//! Layered configuration for Cirrus.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cirrus_api::{ApiFlavor, DEFAULT_API_VERSION, RetryConfig};
use cirrus_core::{AgentSettings, Mode};
use cirrus_tools::{CatalogOptions, CategoryOverride, DEFAULT_CATEGORY};
use cirrus_types::ConfigError;
use serde::{Deserialize, Serialize};

/// The default model (and Azure deployment) name.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// The default relay listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// The default front-end origin allowed by CORS.
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";

/// Relay sessions unused for this long are closed.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Resolved configuration for a Cirrus process.
#[derive(Debug, Clone)]
pub struct CirrusConfig {
    pub endpoint: String,
    pub api_key: String,
    pub flavor: ApiFlavor,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_retries: Option<u32>,
    pub mode: Mode,
    pub tools_enabled: bool,
    /// Category started when a prompt matches nothing. `None` disables it.
    pub default_category: Option<String>,
    pub catalog: CatalogOptions,
    pub bind: SocketAddr,
    /// CORS origins. `*` allows any origin.
    pub frontend_origins: Vec<String>,
    pub session_idle_timeout: Duration,
    pub config_dir: PathBuf,
}

/// Settings that can be read from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub agent: AgentFileSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    /// Per-category overrides, keyed by category name.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// `azure` or `openai`.
    pub flavor: Option<String>,
    pub api_version: Option<String>,
    pub deployment: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: Option<String>,
    pub frontend_origins: Option<Vec<String>>,
    pub session_idle_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentFileSettings {
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSettings {
    pub enabled: Option<bool>,
    /// An empty string disables the fallback category.
    pub default_category: Option<String>,
    pub ado_org: Option<String>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub deployment: Option<String>,
    pub mode: Option<Mode>,
    pub bind: Option<String>,
    /// `--no-tools`.
    pub disable_tools: bool,
}

impl CirrusConfig {
    /// Load configuration from the process environment and the config dir.
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let dir = config_dir_from(&env);
        Self::load_from(overrides, &dir, env)
    }

    /// Load configuration with an explicit config dir and env lookup.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. `<config_dir>/config.toml`
    /// 4. Defaults
    pub fn load_from(
        overrides: CliOverrides,
        config_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let file = load_settings_file(&config_dir.join("config.toml"));

        let flavor_name = var("CIRRUS_API_FLAVOR")
            .or(file.api.flavor)
            .unwrap_or_else(|| "azure".to_string());

        // Resolve model: env > config file > default
        let model = var("AZURE_OPENAI_MODEL")
            .or_else(|| var("AZURE_MODEL_NAME"))
            .or(file.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let flavor = match flavor_name.trim().to_ascii_lowercase().as_str() {
            "azure" => ApiFlavor::Azure {
                deployment: overrides
                    .deployment
                    .or_else(|| var("AZURE_DEPLOYMENT_NAME"))
                    .or(file.api.deployment)
                    .unwrap_or_else(|| model.clone()),
                api_version: var("AZURE_API_VERSION")
                    .or(file.api.api_version)
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            },
            "openai" => ApiFlavor::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "api.flavor".into(),
                    message: format!("expected 'azure' or 'openai', got '{other}'"),
                });
            }
        };

        let endpoint = var("AZURE_OPENAI_ENDPOINT")
            .or(file.api.endpoint)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "endpoint (set AZURE_OPENAI_ENDPOINT or api.endpoint in config.toml)".into(),
            })?;

        let api_key = var("AZURE_OPENAI_API_KEY")
            .or_else(|| var("AZURE_OPENAI_KEY"))
            .or(file.api.api_key)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set AZURE_OPENAI_API_KEY or api.api_key in config.toml)".into(),
            })?;

        let mode = match overrides.mode {
            Some(mode) => mode,
            None => match var("CIRRUS_MODE").or(file.agent.mode) {
                Some(raw) => raw.parse().map_err(|e: cirrus_core::ModeParseError| {
                    ConfigError::InvalidValue {
                        key: "mode".into(),
                        message: e.to_string(),
                    }
                })?,
                None => Mode::default(),
            },
        };

        let tools_enabled = if overrides.disable_tools {
            false
        } else {
            match var("ENABLE_MCP_TOOLS") {
                Some(raw) => parse_bool("ENABLE_MCP_TOOLS", &raw)?,
                None => file.tools.enabled.unwrap_or(true),
            }
        };

        let default_category = match file.tools.default_category {
            Some(name) if name.trim().is_empty() => None,
            Some(name) => Some(name),
            None => Some(DEFAULT_CATEGORY.to_string()),
        };

        let catalog = CatalogOptions {
            github_token: var("GITHUB_PERSONAL_ACCESS_TOKEN"),
            ado_org: var("ADO_ORG").or(file.tools.ado_org),
            overrides: file.categories,
        };

        let bind_raw = overrides
            .bind
            .or_else(|| var("CIRRUS_BIND"))
            .or(file.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "bind".into(),
                message: format!("'{bind_raw}': {e}"),
            })?;

        let frontend_origins = match var("FRONTEND_ORIGIN") {
            Some(raw) => split_origins(&raw),
            None => file
                .server
                .frontend_origins
                .unwrap_or_else(|| vec![DEFAULT_FRONTEND_ORIGIN.to_string()]),
        };

        let session_idle_secs = match var("CIRRUS_SESSION_IDLE_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                key: "session_idle_secs".into(),
                message: format!("'{raw}': {e}"),
            })?,
            None => file
                .server
                .session_idle_secs
                .unwrap_or(DEFAULT_SESSION_IDLE_SECS),
        };
        if session_idle_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "session_idle_secs".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(CirrusConfig {
            endpoint,
            api_key,
            flavor,
            model,
            max_tokens: file.api.max_tokens,
            temperature: file.api.temperature,
            max_retries: file.api.max_retries,
            mode,
            tools_enabled,
            default_category,
            catalog,
            bind,
            frontend_origins,
            session_idle_timeout: Duration::from_secs(session_idle_secs),
            config_dir: config_dir.to_path_buf(),
        })
    }

    /// Model parameters for the agents a driver builds.
    pub fn agent_settings(&self) -> AgentSettings {
        let mut settings = AgentSettings::new(self.model.clone());
        settings.max_tokens = self.max_tokens;
        settings.temperature = self.temperature;
        settings
    }

    /// Retry policy for the chat client.
    pub fn retry_config(&self) -> RetryConfig {
        match self.max_retries {
            Some(max_retries) => RetryConfig {
                max_retries,
                ..RetryConfig::default()
            },
            None => RetryConfig::default(),
        }
    }
}

/// Get the Cirrus config directory path (`~/.cirrus/`).
pub fn config_dir() -> PathBuf {
    config_dir_from(&|key: &str| std::env::var(key).ok())
}

fn config_dir_from(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = env("CIRRUS_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cirrus")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got '{other}'"),
        }),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
