//! Configuration loading for psybrief.
//! Reads psybrief.toml from the current directory or the path in PSYBRIEF_CONFIG.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use psybrief_ingestion::normalise::RuleTables;
use psybrief_ingestion::sources::pubmed::{SearchParams, DEFAULT_SEARCH_TERM};
use psybrief_llm::{AnthropicBackend, LlmBackend, OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub pubmed: PubmedConfig,
    /// Replaces the built-in normalisation tables field by field.
    #[serde(default)]
    pub normalisation: RuleTables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "127.0.0.1:3001".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Without one the in-memory store is used.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize { 5 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: default_max_connections() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "anthropic")]
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Required for `openai_compatible`; `ollama` defaults to localhost.
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

fn default_backend()     -> BackendKind { BackendKind::OpenAi }
fn default_model()       -> String { "gpt-4o-mini".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_ollama_url()  -> String { "http://localhost:11434".to_string() }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Articles processed at once; 1 is sequential.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize { 1 }

impl Default for IngestionConfig {
    fn default() -> Self {
        Self { max_concurrency: default_max_concurrency() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubmedConfig {
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_retmax")]
    pub retmax: u32,
    #[serde(default = "default_reldate")]
    pub reldate: u32,
    #[serde(default = "default_ncbi_key_env")]
    pub api_key_env: String,
}

fn default_term()         -> String { DEFAULT_SEARCH_TERM.to_string() }
fn default_retmax()       -> u32 { 45 }
fn default_reldate()      -> u32 { 60 }
fn default_ncbi_key_env() -> String { "NCBI_API_KEY".to_string() }

impl Default for PubmedConfig {
    fn default() -> Self {
        Self {
            term: default_term(),
            retmax: default_retmax(),
            reldate: default_reldate(),
            api_key_env: default_ncbi_key_env(),
        }
    }
}

impl PubmedConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            term: self.term.clone(),
            retmax: self.retmax,
            reldate: self.reldate,
            ..SearchParams::default()
        }
    }
}

/// Non-empty value of an environment variable, as a secret.
pub fn secret_from_env(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

impl LlmConfig {
    /// Build the configured backend. Hosted backends need their API key.
    pub fn build_backend(&self) -> anyhow::Result<Arc<dyn LlmBackend>> {
        let key = secret_from_env(&self.api_key_env);
        let backend: Arc<dyn LlmBackend> = match self.backend {
            BackendKind::OpenAi => {
                let key = key.with_context(|| format!("{} is not set", self.api_key_env))?;
                Arc::new(OpenAiBackend::new(key, &self.model))
            }
            BackendKind::Anthropic => {
                let key = key.with_context(|| format!("{} is not set", self.api_key_env))?;
                Arc::new(AnthropicBackend::new(key, &self.model))
            }
            BackendKind::OpenAiCompatible => {
                let url = self
                    .base_url
                    .clone()
                    .context("llm.base_url is required for the openai_compatible backend")?;
                Arc::new(OpenAiCompatibleBackend::new(url, &self.model, key))
            }
            BackendKind::Ollama => {
                let url = self.base_url.clone().unwrap_or_else(default_ollama_url);
                Arc::new(OllamaBackend::new(url, &self.model))
            }
        };
        Ok(backend)
    }
}

mod tests;

impl Config {
    /// Load configuration from psybrief.toml.
    /// Loads `.env` first. An explicit PSYBRIEF_CONFIG must exist; a missing
    /// default file means built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let (path, explicit) = match std::env::var("PSYBRIEF_CONFIG") {
            Ok(p) => (p, true),
            Err(_) => ("psybrief.toml".to_string(), false),
        };

        if !Path::new(&path).exists() {
            if explicit {
                anyhow::bail!(
                    "Config file not found: {}\n\
                     Copy psybrief.example.toml to psybrief.toml and edit it.",
                    path
                );
            }
            tracing::info!("No psybrief.toml found, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {path}"))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {path}"))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.ingestion.max_concurrency == 0 {
            anyhow::bail!("ingestion.max_concurrency must be at least 1");
        }
        Ok(config)
    }
}
