//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.sitescout.toml` files. Every field has a default, so a partial file
//! only overrides what it names.

use crate::pipeline::OrchestratorOptions;
use crate::services::html::ExtractLimits;
use crate::services::{CompletionOptions, FetcherConfig, OllamaConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = ".sitescout.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "sitescout_report.md".to_string()
}

/// Scheduling settings for the analysis graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeout applied to every unit without an override.
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_seconds: u64,

    /// Keep at most this many action items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_actions: Option<usize>,

    /// Progress weight per unit id; units not listed weigh 1.
    #[serde(default)]
    pub weights: BTreeMap<String, u32>,

    /// Per-unit timeout overrides, in seconds.
    #[serde(default)]
    pub timeouts: BTreeMap<String, u64>,

    /// Units left out of the graph, together with everything depending on them.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            unit_timeout_seconds: default_unit_timeout(),
            max_actions: None,
            weights: BTreeMap::new(),
            timeouts: BTreeMap::new(),
            disabled: Vec::new(),
        }
    }
}

fn default_unit_timeout() -> u64 {
    60
}

/// Page fetching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// How long a fetched snapshot is reused; 0 disables the cache.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    #[serde(default = "default_max_links")]
    pub max_links: usize,

    #[serde(default = "default_max_images")]
    pub max_images: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_fetch_timeout(),
            user_agent: default_user_agent(),
            cache_ttl_seconds: default_cache_ttl(),
            max_links: default_max_links(),
            max_images: default_max_images(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    FetcherConfig::default().user_agent
}

fn default_cache_ttl() -> u64 {
    1800
}

fn default_max_links() -> usize {
    ExtractLimits::default().max_links
}

fn default_max_images() -> usize {
    ExtractLimits::default().max_images
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Use the language model to enrich content analysis.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Estimated USD cost per 1000 tokens, reported in unit metrics.
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
            max_tokens: default_max_tokens(),
            cost_per_1k_tokens: 0.0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    512
}

/// Remote lookup services. A service without an API key is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub places_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_places_url")]
    pub places_url: String,

    #[serde(default = "default_search_url")]
    pub search_url: String,

    #[serde(default = "default_service_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            places_api_key: None,
            search_api_key: None,
            places_url: default_places_url(),
            search_url: default_search_url(),
            timeout_seconds: default_service_timeout(),
        }
    }
}

fn default_places_url() -> String {
    "https://maps.googleapis.com/maps/api/place".to_string()
}

fn default_search_url() -> String {
    "https://serpapi.com".to_string()
}

fn default_service_timeout() -> u64 {
    20
}

/// Checkpoint storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite URL such as `sqlite://sitescout.db`; runs stay in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Fill API keys missing from the file from `SITESCOUT_*` environment variables.
    pub fn apply_env(&mut self) {
        if self.services.places_api_key.is_none() {
            self.services.places_api_key = std::env::var("SITESCOUT_PLACES_API_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }
        if self.services.search_api_key.is_none() {
            self.services.search_api_key = std::env::var("SITESCOUT_SEARCH_API_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(timeout) = args.unit_timeout {
            self.pipeline.unit_timeout_seconds = timeout;
        }
        if let Some(max) = args.max_actions {
            self.pipeline.max_actions = Some(max);
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if args.no_llm {
            self.model.enabled = false;
        }

        if let Some(ref database) = args.database {
            self.storage.database_url = Some(database.clone());
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout_seconds: self.fetch.timeout_seconds,
            user_agent: self.fetch.user_agent.clone(),
            limits: ExtractLimits {
                max_links: self.fetch.max_links,
                max_images: self.fetch.max_images,
            },
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            system: None,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            default_unit_timeout: Duration::from_secs(self.pipeline.unit_timeout_seconds),
            max_actions: self.pipeline.max_actions,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
