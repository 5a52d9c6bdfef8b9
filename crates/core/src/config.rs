//! Configuration management for Pulse.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`.pulse/config.yaml` in the workspace, or `PULSE_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! Per-tenant overrides live under `tenants:` in the config file and are
//! resolved at request time through [`crate::tenant::TenantDirectory`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .pulse/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON objects
    pub json_logs: bool,

    /// Default provider names used when a tenant has no override
    pub defaults: ProviderDefaults,

    pub openai: OpenAiSettings,

    pub ollama: OllamaSettings,

    pub vector_store: VectorStoreSettings,

    pub serpapi: SerpApiSettings,

    /// Per-organization overrides keyed by organization id
    pub tenants: HashMap<String, TenantOverrides>,
}

/// Default provider selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderDefaults {
    pub llm_provider: String,
    pub vector_db: String,
    pub shared_vector_db: bool,
    pub web_search_provider: String,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            llm_provider: "openai".to_string(),
            vector_db: "memory".to_string(),
            shared_vector_db: true,
            web_search_provider: "serpapi".to_string(),
        }
    }
}

/// OpenAI provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiSettings {
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Explicit API key (takes precedence over `api_key_env`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub embedding_model: String,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout: 60,
        }
    }
}

impl OpenAiSettings {
    /// Resolve the API key from the explicit value or the configured env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Ollama provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OllamaSettings {
    pub endpoint: String,
    pub model: String,
    /// Model used for embeddings; falls back to `model`
    pub embedding_model: Option<String>,
    pub timeout: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            embedding_model: None,
            timeout: 120,
        }
    }
}

/// Vector store settings shared by the built-in backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorStoreSettings {
    /// Base collection name; per-tenant collections append `_{organization_id}`
    pub collection_name: String,
    /// Directory for the file-backed `local` backend (relative to the workspace)
    pub data_dir: PathBuf,
    /// Dimension of the placeholder embedding stored with agent records
    pub metadata_dimension: usize,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            collection_name: "hello_pulse".to_string(),
            data_dir: PathBuf::from(".pulse/vectors"),
            metadata_dimension: 1536,
        }
    }
}

/// SerpAPI web search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerpApiSettings {
    pub api_key_env: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub engine: String,
    pub timeout: u64,
}

impl Default for SerpApiSettings {
    fn default() -> Self {
        Self {
            api_key_env: "SERPAPI_API_KEY".to_string(),
            api_key: None,
            endpoint: "https://serpapi.com/search".to_string(),
            engine: "google".to_string(),
            timeout: 30,
        }
    }
}

impl SerpApiSettings {
    /// Resolve the API key from the explicit value or the configured env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Tenant-specific overrides. Unset fields inherit the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_vector_db: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_embedding_model: Option<String>,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ollama_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

impl TenantOverrides {
    /// Merge `other` into `self`; fields set in `other` win.
    pub fn merge(&mut self, other: TenantOverrides) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.llm_provider, other.llm_provider);
        take(&mut self.vector_db, other.vector_db);
        take(&mut self.shared_vector_db, other.shared_vector_db);
        take(&mut self.openai_model, other.openai_model);
        take(&mut self.openai_embedding_model, other.openai_embedding_model);
        take(&mut self.openai_api_key, other.openai_api_key);
        take(&mut self.openai_endpoint, other.openai_endpoint);
        take(&mut self.ollama_model, other.ollama_model);
        take(&mut self.ollama_embedding_model, other.ollama_embedding_model);
        take(&mut self.ollama_endpoint, other.ollama_endpoint);
        take(&mut self.collection_name, other.collection_name);
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    defaults: Option<ProviderDefaults>,
    openai: Option<OpenAiSettings>,
    ollama: Option<OllamaSettings>,
    vector_store: Option<VectorStoreSettings>,
    serpapi: Option<SerpApiSettings>,
    #[serde(default)]
    tenants: HashMap<String, TenantOverrides>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            json_logs: false,
            defaults: ProviderDefaults::default(),
            openai: OpenAiSettings::default(),
            ollama: OllamaSettings::default(),
            vector_store: VectorStoreSettings::default(),
            serpapi: SerpApiSettings::default(),
            tenants: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `PULSE_WORKSPACE`: Override workspace path
    /// - `PULSE_CONFIG`: Path to config file
    /// - `PULSE_LLM_PROVIDER`: Default LLM provider
    /// - `PULSE_VECTOR_DB`: Default vector database
    /// - `PULSE_SHARED_VECTOR_DB`: `true`/`false`
    /// - `OLLAMA_URL`: Ollama endpoint
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Load configuration with an explicit workspace and/or config file.
    ///
    /// Explicit arguments take precedence over `PULSE_WORKSPACE` / `PULSE_CONFIG`.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| std::env::var("PULSE_WORKSPACE").ok().map(PathBuf::from)) {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("PULSE_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.pulse_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("PULSE_LLM_PROVIDER") {
            config.defaults.llm_provider = provider;
        }

        if let Ok(vector_db) = std::env::var("PULSE_VECTOR_DB") {
            config.defaults.vector_db = vector_db;
        }

        if let Ok(shared) = std::env::var("PULSE_SHARED_VECTOR_DB") {
            config.defaults.shared_vector_db = parse_bool(&shared).ok_or_else(|| {
                AppError::Config(format!("Invalid PULSE_SHARED_VECTOR_DB value: {}", shared))
            })?;
        }

        if let Ok(endpoint) = std::env::var("OLLAMA_URL") {
            config.ollama.endpoint = endpoint;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(defaults) = config_file.defaults {
            result.defaults = defaults;
        }
        if let Some(openai) = config_file.openai {
            result.openai = openai;
        }
        if let Some(ollama) = config_file.ollama {
            result.ollama = ollama;
        }
        if let Some(vector_store) = config_file.vector_store {
            result.vector_store = vector_store;
        }
        if let Some(serpapi) = config_file.serpapi {
            result.serpapi = serpapi;
        }

        for (org, overrides) in config_file.tenants {
            result.tenants.entry(org).or_default().merge(overrides);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.json_logs = json;
            }
        }

        tracing::debug!("Merged config file {:?}", path);

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and YAML.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        llm_provider: Option<String>,
        vector_db: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        json_logs: bool,
    ) -> Self {
        if let Some(provider) = llm_provider {
            self.defaults.llm_provider = provider;
        }

        if let Some(vector_db) = vector_db {
            self.defaults.vector_db = vector_db;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if json_logs {
            self.json_logs = true;
        }

        self
    }

    /// Get the path to the .pulse directory.
    pub fn pulse_dir(&self) -> PathBuf {
        self.workspace.join(".pulse")
    }

    /// Ensure the .pulse directory exists.
    pub fn ensure_pulse_dir(&self) -> AppResult<()> {
        let pulse_dir = self.pulse_dir();
        if !pulse_dir.exists() {
            std::fs::create_dir_all(&pulse_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .pulse directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Absolute directory used by the file-backed vector store.
    pub fn vector_data_dir(&self) -> PathBuf {
        if self.vector_store.data_dir.is_absolute() {
            self.vector_store.data_dir.clone()
        } else {
            self.workspace.join(&self.vector_store.data_dir)
        }
    }

    /// Validate settings that have no safe default.
    pub fn validate(&self) -> AppResult<()> {
        if self.vector_store.collection_name.trim().is_empty() {
            return Err(AppError::Config(
                "vectorStore.collectionName must not be empty".to_string(),
            ));
        }

        if self.vector_store.metadata_dimension == 0 {
            return Err(AppError::Config(
                "vectorStore.metadataDimension must be greater than zero".to_string(),
            ));
        }

        for org in self.tenants.keys() {
            if org.is_empty() || org.contains(':') {
                return Err(AppError::Config(format!(
                    "Invalid organization id in tenants section: {:?}",
                    org
                )));
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.defaults.llm_provider, "openai");
        assert_eq!(config.defaults.vector_db, "memory");
        assert!(config.defaults.shared_vector_db);
        assert_eq!(config.defaults.web_search_provider, "serpapi");
        assert_eq!(config.openai.model, "gpt-3.5-turbo");
        assert_eq!(config.openai.embedding_model, "text-embedding-3-small");
        assert_eq!(config.ollama.model, "llama3");
        assert_eq!(config.vector_store.collection_name, "hello_pulse");
        assert_eq!(config.vector_store.metadata_dimension, 1536);
    }

    #[test]
    fn test_pulse_dir() {
        let config = AppConfig::default();
        assert!(config.pulse_dir().ends_with(".pulse"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            Some("ollama".to_string()),
            Some("local".to_string()),
            None,
            true,
            false,
            true,
        );

        assert_eq!(overridden.defaults.llm_provider, "ollama");
        assert_eq!(overridden.defaults.vector_db, "local");
        assert!(overridden.verbose);
        assert!(overridden.json_logs);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_with_tenants() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
defaults:
  llmProvider: ollama
  sharedVectorDb: false
ollama:
  endpoint: http://gpu-box:11434
  model: mistral
tenants:
  acme:
    llmProvider: openai
    openaiModel: gpt-4o
logging:
  level: warn
  json: true
"#,
        )
        .unwrap();

        let base = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        let merged = base.merge_yaml(&path).unwrap();

        assert_eq!(merged.defaults.llm_provider, "ollama");
        assert!(!merged.defaults.shared_vector_db);
        // Unspecified fields inside a section keep their defaults
        assert_eq!(merged.defaults.vector_db, "memory");
        assert_eq!(merged.ollama.endpoint, "http://gpu-box:11434");
        assert_eq!(merged.ollama.model, "mistral");
        assert_eq!(merged.tenants["acme"].openai_model.as_deref(), Some("gpt-4o"));
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.json_logs);
    }

    #[test]
    fn test_merge_yaml_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "defaults: [not, a, map]").unwrap();

        let result = AppConfig::default().merge_yaml(&path);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_tenant_overrides_merge() {
        let mut overrides = TenantOverrides {
            llm_provider: Some("ollama".to_string()),
            ollama_model: Some("llama3".to_string()),
            ..Default::default()
        };

        overrides.merge(TenantOverrides {
            ollama_model: Some("mistral".to_string()),
            shared_vector_db: Some(false),
            ..Default::default()
        });

        assert_eq!(overrides.llm_provider.as_deref(), Some("ollama"));
        assert_eq!(overrides.ollama_model.as_deref(), Some("mistral"));
        assert_eq!(overrides.shared_vector_db, Some(false));
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let settings = OpenAiSettings {
            api_key_env: "PULSE_TEST_UNSET_OPENAI_KEY".to_string(),
            api_key: Some("sk-explicit".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.resolve_api_key().as_deref(), Some("sk-explicit"));

        let missing = OpenAiSettings {
            api_key_env: "PULSE_TEST_UNSET_OPENAI_KEY".to_string(),
            ..Default::default()
        };
        assert_eq!(missing.resolve_api_key(), None);
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.vector_store.metadata_dimension = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config
            .tenants
            .insert("bad:org".to_string(), TenantOverrides::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
