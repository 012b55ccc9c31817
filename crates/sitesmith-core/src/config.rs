use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SitesmithError};

/// Top-level Sitesmith configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Extra HTTP headers sent with every request (e.g. OpenRouter attribution).
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider() -> String { "openrouter".to_string() }
fn default_max_tokens() -> u32 { 64_000 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// HTTP/SSE gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL used when building links to generated sites.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Idle interval after which a stream emits a keepalive.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_public_url() -> String { "http://localhost:8000".to_string() }
fn default_keepalive_secs() -> u64 { 30 }

impl GatewayConfig {
    /// URL at which a generated site is served.
    pub fn site_url(&self, site_id: &str) -> String {
        format!("{}/sites/{}", self.public_url.trim_end_matches('/'), site_id)
    }
}

/// Site-generation workflow limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Ceiling on content-generation attempts per run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Ceiling on step executions per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Maximum LLM turns for one generation attempt.
    #[serde(default = "default_generator_max_turns")]
    pub generator_max_turns: usize,
    /// Wall-clock limit for one generation attempt.
    #[serde(default = "default_generator_timeout_secs")]
    pub generator_timeout_secs: u64,
    /// Custom skeleton template. The built-in skeleton is used when unset.
    #[serde(default)]
    pub template_path: Option<String>,
    #[serde(default = "default_site_title")]
    pub site_title: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_iterations: default_max_iterations(),
            generator_max_turns: default_generator_max_turns(),
            generator_timeout_secs: default_generator_timeout_secs(),
            template_path: None,
            site_title: default_site_title(),
        }
    }
}

fn default_max_attempts() -> u32 { 3 }
fn default_max_iterations() -> usize { 20 }
fn default_generator_max_turns() -> usize { 15 }
fn default_generator_timeout_secs() -> u64 { 600 }
fn default_site_title() -> String { "Generated Site".to_string() }

/// Artifact store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_sites_dir")]
    pub sites_dir: String,
    /// Longest `old_string` accepted by `edit_file`.
    #[serde(default = "default_max_old_string_len")]
    pub max_old_string_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sites_dir: default_sites_dir(),
            max_old_string_len: default_max_old_string_len(),
        }
    }
}

fn default_sites_dir() -> String { "generated_sites".to_string() }
fn default_max_old_string_len() -> usize { 200 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SitesmithError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded)
            .map_err(|e| SitesmithError::Config(e.to_string()))
    }

    /// Build a minimal config from well-known environment variables.
    pub fn from_env() -> Self {
        let (provider, model_id, api_key) =
            if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
                ("openrouter", "anthropic/claude-sonnet-4.5", Some(key))
            } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                ("openai", "gpt-4o", Some(key))
            } else {
                ("ollama", "llama3.2", None)
            };

        Self {
            model: ModelConfig {
                provider: provider.to_string(),
                model_id: model_id.to_string(),
                api_key,
                base_url: None,
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                retry: None,
                extra_headers: HashMap::new(),
            },
            fallback_models: vec![],
            gateway: GatewayConfig::default(),
            workflow: WorkflowConfig::default(),
            store: StoreConfig::default(),
        }
    }

    /// Resolve the sites directory (expand ~).
    pub fn sites_dir(&self) -> PathBuf {
        let dir = &self.store.sites_dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

pub fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
