//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.insightroom.toml` files.

use crate::models::Platform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".insightroom.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Language model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Ingestion settings.
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root directory holding the per-platform export directories.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

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
            data_dir: default_data_dir(),
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output() -> String {
    "insight_report.md".to_string()
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent to the completion endpoint.
    #[serde(default = "default_model")]
    pub name: String,

    /// Base URL of an OpenAI-compatible endpoint, e.g. a LiteLLM proxy.
    #[serde(default)]
    pub api_base: Option<String>,

    /// API key. Normally supplied through `LLM_API_KEY` rather than the file.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Output budget for schema discovery calls.
    #[serde(default = "default_discovery_max_tokens")]
    pub discovery_max_tokens: u32,

    /// Output budget for platform insight narration.
    #[serde(default = "default_insight_max_tokens")]
    pub insight_max_tokens: u32,

    /// Output budget for executive insight narration.
    #[serde(default = "default_strategy_max_tokens")]
    pub strategy_max_tokens: u32,

    /// Output budget for long-form platform reports.
    #[serde(default = "default_report_max_tokens")]
    pub report_max_tokens: u32,

    /// Output budget for Q&A answers.
    #[serde(default = "default_question_max_tokens")]
    pub question_max_tokens: u32,

    /// USD per million prompt tokens.
    #[serde(default = "default_input_cost")]
    pub input_cost_per_million: f64,

    /// USD per million completion tokens.
    #[serde(default = "default_output_cost")]
    pub output_cost_per_million: f64,

    /// Call the model at all. When false every narration uses templates.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_base: None,
            api_key: None,
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            discovery_max_tokens: default_discovery_max_tokens(),
            insight_max_tokens: default_insight_max_tokens(),
            strategy_max_tokens: default_strategy_max_tokens(),
            report_max_tokens: default_report_max_tokens(),
            question_max_tokens: default_question_max_tokens(),
            input_cost_per_million: default_input_cost(),
            output_cost_per_million: default_output_cost(),
            enabled: true,
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    45
}

fn default_discovery_max_tokens() -> u32 {
    800
}

fn default_insight_max_tokens() -> u32 {
    400
}

fn default_strategy_max_tokens() -> u32 {
    600
}

fn default_report_max_tokens() -> u32 {
    3000
}

fn default_question_max_tokens() -> u32 {
    800
}

fn default_input_cost() -> f64 {
    0.50
}

fn default_output_cost() -> f64 {
    1.50
}

fn default_true() -> bool {
    true
}

/// Source file discovery and parsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// LinkedIn exports, relative to the data directory.
    #[serde(default = "default_linkedin_dir")]
    pub linkedin_dir: String,

    /// Instagram exports, relative to the data directory.
    #[serde(default = "default_instagram_dir")]
    pub instagram_dir: String,

    /// Website exports, relative to the data directory.
    #[serde(default = "default_website_dir")]
    pub website_dir: String,

    /// Competitor name list, relative to the data directory.
    #[serde(default = "default_competitors_file")]
    pub competitors_file: String,

    /// Rows shown to schema discovery.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Columns shown to schema discovery.
    #[serde(default = "default_max_sample_columns")]
    pub max_sample_columns: usize,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Ask the model to classify files before falling back to heuristics.
    #[serde(default = "default_true")]
    pub use_llm_discovery: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            linkedin_dir: default_linkedin_dir(),
            instagram_dir: default_instagram_dir(),
            website_dir: default_website_dir(),
            competitors_file: default_competitors_file(),
            sample_rows: default_sample_rows(),
            max_sample_columns: default_max_sample_columns(),
            max_file_size: default_max_file_size(),
            use_llm_discovery: true,
        }
    }
}

fn default_linkedin_dir() -> String {
    "linkedin".to_string()
}

fn default_instagram_dir() -> String {
    "instagram".to_string()
}

fn default_website_dir() -> String {
    "website".to_string()
}

fn default_competitors_file() -> String {
    "competitors.json".to_string()
}

fn default_sample_rows() -> usize {
    5
}

fn default_max_sample_columns() -> usize {
    25
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

impl IngestionConfig {
    /// Sub-directory name configured for a platform.
    pub fn platform_dir(&self, platform: Platform) -> &str {
        match platform {
            Platform::LinkedIn => &self.linkedin_dir,
            Platform::Instagram => &self.instagram_dir,
            Platform::Website => &self.website_dir,
        }
    }
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
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Optional flags only override when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Model settings - always override since they have defaults in CLI
        self.model.name = args.model.clone();
        self.model.temperature = args.temperature;

        if let Some(ref api_base) = args.api_base {
            self.model.api_base = Some(api_base.clone());
        }
        if let Some(ref api_key) = args.api_key {
            self.model.api_key = Some(api_key.clone());
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if args.no_llm {
            self.model.enabled = false;
            self.ingestion.use_llm_discovery = false;
        }

        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Directory holding one platform's exports.
    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.general
            .data_dir
            .join(self.ingestion.platform_dir(platform))
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
