//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Priority;
use clap::Parser;
use std::path::PathBuf;

/// SiteScout - SEO and local-search audit pipeline for a single web page
///
/// Fetches a page, runs technical, content, keyword, entity and SERP
/// analysis over it and writes a ranked action plan.
///
/// Examples:
///   sitescout --url https://bakery.example/
///   sitescout --url https://bakery.example/ --locale pl-PL --format json
///   sitescout --url https://bakery.example/ --no-llm --fail-on high
///   sitescout --url https://bakery.example/ --dry-run
///   sitescout --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Page URL to analyze
    #[arg(short, long, value_name = "URL", required_unless_present = "init_config")]
    pub url: Option<String>,

    /// Locale of the audience, as language-REGION (e.g. en-US)
    #[arg(short, long, default_value = "en-US", env = "SITESCOUT_LOCALE")]
    pub locale: String,

    /// Path to configuration file
    ///
    /// If not specified, looks for .sitescout.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report (default from config)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Timeout applied to each analysis unit, in seconds
    #[arg(long, value_name = "SECS")]
    pub unit_timeout: Option<u64>,

    /// Keep at most this many items in the action plan
    #[arg(long, value_name = "COUNT")]
    pub max_actions: Option<usize>,

    /// SQLite URL for run checkpoints (in-memory when unset)
    ///
    /// Example: sqlite://sitescout.db
    #[arg(long, value_name = "URL", env = "SITESCOUT_DATABASE_URL")]
    pub database: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Ollama model used for content analysis
    #[arg(short, long, env = "SITESCOUT_MODEL")]
    pub model: Option<String>,

    /// Skip the language model; content analysis uses heuristics only
    #[arg(long)]
    pub no_llm: bool,

    /// Fail if actions at or above this priority are planned
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Dry run: print the analysis graph without fetching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .sitescout.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Priority level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Priority {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => Priority::Low,
            FailOnLevel::Medium => Priority::Medium,
            FailOnLevel::High => Priority::High,
            FailOnLevel::Critical => Priority::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The target URL; empty only with --init-config.
    pub fn target_url(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        let url = self.target_url();
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err("URL must start with 'http://' or 'https://'".to_string());
        }

        let mut parts = self.locale.split(['-', '_']);
        let language = parts.next().unwrap_or("");
        if language.len() < 2 || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("Invalid locale '{}', expected e.g. en-US", self.locale));
        }

        if let Some(ref ollama_url) = self.ollama_url {
            if !ollama_url.starts_with("http://") && !ollama_url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.unit_timeout == Some(0) {
            return Err("Unit timeout must be at least 1 second".to_string());
        }

        if self.max_actions == Some(0) {
            return Err("Max actions must be at least 1".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
