//! Configuration management
//!
//! Registry discovery, agent fallback addresses, classifier backend and
//! server settings. Loaded from a TOML file, then overridden from the
//! environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent registry discovery
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Agent invocation and static fallback addresses
    #[serde(default)]
    pub agents: AgentsConfig,
    /// Intent classifier selection
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// HTTP entry point
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry service
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Timeout for a single registry search
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// How long a discovered address stays valid
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_registry_url() -> String {
    "http://localhost:6900".to_string()
}

fn default_lookup_timeout() -> u64 {
    5
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            lookup_timeout_secs: default_lookup_timeout(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl RegistryConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Timeout for one agent call
    #[serde(default = "default_invoke_timeout")]
    pub invoke_timeout_secs: u64,
    /// Value sent as `metadata.source` in every request envelope
    #[serde(default = "default_source")]
    pub source: String,
    /// Addresses used when the registry cannot resolve an agent
    #[serde(default)]
    pub fallback: FallbackConfig,
}

fn default_invoke_timeout() -> u64 {
    10
}

fn default_source() -> String {
    "stategraph-orchestrator".to_string()
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            invoke_timeout_secs: default_invoke_timeout(),
            source: default_source(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl AgentsConfig {
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }
}

/// One base URL per agent, so the fallback table is always complete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_alerts_url")]
    pub alerts: String,
    #[serde(default = "default_stops_url")]
    pub stops: String,
    #[serde(default = "default_planner_url")]
    pub planner: String,
}

fn default_alerts_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_stops_url() -> String {
    "http://localhost:8003".to_string()
}

fn default_planner_url() -> String {
    "http://localhost:8002".to_string()
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            alerts: default_alerts_url(),
            stops: default_stops_url(),
            planner: default_planner_url(),
        }
    }
}

/// Which router strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierBackend {
    #[default]
    Llm,
    Keyword,
}

impl std::str::FromStr for ClassifierBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Ok(ClassifierBackend::Llm),
            "keyword" | "keywords" => Ok(ClassifierBackend::Keyword),
            other => anyhow::bail!("Unknown classifier backend '{}' (expected llm or keyword)", other),
        }
    }
}

/// What the LLM router does when classification fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Re-classify with the keyword rules
    #[default]
    Keyword,
    /// Answer with the fixed `general` decision
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub backend: ClassifierBackend,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// OpenAI-compatible API base URL
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    /// Read from the environment only, never written to disk
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_classifier_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    300
}

fn default_classifier_timeout() -> u64 {
    15
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            on_failure: FailurePolicy::default(),
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_classifier_timeout(),
            api_key: None,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Apply overrides from an environment-like lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("REGISTRY_URL") {
            self.registry.url = url;
        }
        if let Some(ttl) = get("DISCOVERY_CACHE_TTL_SECS") {
            self.registry.cache_ttl_secs = ttl.trim().parse()
                .context("DISCOVERY_CACHE_TTL_SECS must be a number of seconds")?;
        }
        if let Some(url) = get("FALLBACK_ALERTS_URL") {
            self.agents.fallback.alerts = url;
        }
        if let Some(url) = get("FALLBACK_STOPS_URL") {
            self.agents.fallback.stops = url;
        }
        if let Some(url) = get("FALLBACK_PLANNER_URL") {
            self.agents.fallback.planner = url;
        }
        if let Some(backend) = get("CLASSIFIER_BACKEND") {
            self.classifier.backend = backend.parse()?;
        }
        if let Some(model) = get("CLASSIFIER_MODEL") {
            self.classifier.model = model;
        }
        if let Some(url) = get("CLASSIFIER_BASE_URL") {
            self.classifier.base_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "transit-orchestrator", "transit-orchestrator")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.registry.cache_ttl_secs, 300);
        assert_eq!(config.registry.lookup_timeout_secs, 5);
        assert_eq!(config.agents.invoke_timeout_secs, 10);
        assert_eq!(config.classifier.backend, ClassifierBackend::Llm);
        assert_eq!(config.classifier.on_failure, FailurePolicy::Keyword);
        assert_eq!(config.agents.fallback.stops, "http://localhost:8003");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
[registry]
url = "http://registry.internal:6900"

[classifier]
backend = "keyword"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.registry.url, "http://registry.internal:6900");
        assert_eq!(config.registry.cache_ttl_secs, 300);
        assert_eq!(config.classifier.backend, ClassifierBackend::Keyword);
        assert_eq!(config.classifier.model, "gpt-4o-mini");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REGISTRY_URL", "http://10.0.0.5:6900"),
            ("DISCOVERY_CACHE_TTL_SECS", "60"),
            ("FALLBACK_PLANNER_URL", "http://10.0.0.9:8002"),
            ("CLASSIFIER_BACKEND", "keyword"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CLASSIFIER_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.registry.url, "http://10.0.0.5:6900");
        assert_eq!(config.registry.cache_ttl_secs, 60);
        assert_eq!(config.agents.fallback.planner, "http://10.0.0.9:8002");
        assert_eq!(config.classifier.backend, ClassifierBackend::Keyword);
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-test"));
        // blank values are ignored
        assert_eq!(config.classifier.model, "gpt-4o-mini");
    }

    #[test]
    fn test_bad_ttl_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| {
            (k == "DISCOVERY_CACHE_TTL_SECS").then(|| "five minutes".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.server.port = 9191;
        config.classifier.api_key = Some("never-written".to_string());
        config.save_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("never-written"));

        let loaded: Config = toml::from_str(&written).unwrap();
        assert_eq!(loaded.server.port, 9191);
        assert!(loaded.classifier.api_key.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.agents.source, "stategraph-orchestrator");
    }

    #[test]
    fn test_default_config_toml_parses() {
        let text = default_config_toml();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.registry.url, default_registry_url());
    }
}
