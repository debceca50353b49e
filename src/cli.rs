//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Platform;
use crate::report::ReportType;
use clap::Parser;
use std::path::PathBuf;

/// insightroom - multi-agent marketing analytics over platform exports
///
/// Loads LinkedIn, Instagram and website exports, analyzes each platform
/// concurrently, and synthesizes an executive report. Works without a
/// language model; narration then falls back to templates.
///
/// Examples:
///   insightroom --data-dir ./data
///   insightroom --data-dir ./data --no-llm --format json
///   insightroom --dry-run
///   insightroom --platform-report linkedin --report-type trends
///   insightroom --ask "Where is the leakage?"
///   insightroom --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory holding the linkedin/, instagram/ and website/ exports
    ///
    /// Defaults to the config file setting, or ./data.
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Model name sent to the completion endpoint
    #[arg(short, long, default_value = "gemini-2.5-flash", env = "LLM_MODEL")]
    pub model: String,

    /// Base URL of an OpenAI-compatible completion endpoint
    #[arg(long, value_name = "URL", env = "LLM_API_BASE")]
    pub api_base: Option<String>,

    /// API key for the completion endpoint
    #[arg(long, value_name = "KEY", env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output file path for the report
    ///
    /// Defaults to the config file setting, or insight_report.md.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .insightroom.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long, default_value = "0.2")]
    pub temperature: f32,

    /// Request timeout in seconds for each model call
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Never call the model; use heuristics and templates only
    #[arg(long)]
    pub no_llm: bool,

    /// Dry run: scan and classify export files without ingesting them
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a long-form report for one platform instead of a full run
    #[arg(long, value_name = "PLATFORM", value_parser = parse_platform)]
    pub platform_report: Option<Platform>,

    /// Focus of the platform report
    #[arg(long, default_value = "comprehensive", value_name = "TYPE")]
    pub report_type: ReportType,

    /// File kinds to include in the platform report (comma-separated)
    ///
    /// Example: --report-files content,followers
    #[arg(long, value_name = "KINDS", value_delimiter = ',')]
    pub report_files: Vec<String>,

    /// Ask a question about the run's results
    #[arg(long, value_name = "QUESTION")]
    pub ask: Option<String>,

    /// Generate a default .insightroom.toml configuration file
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

fn parse_platform(value: &str) -> Result<Platform, String> {
    Platform::ALL
        .into_iter()
        .find(|p| p.key() == value.trim().to_lowercase())
        .ok_or_else(|| format!("unknown platform '{}' (linkedin, instagram, website)", value))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate endpoint format when one is given
        if let Some(ref api_base) = self.api_base {
            if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
                return Err("API base must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate temperature range
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("Temperature must be between 0.0 and 1.0".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }
        if self.dry_run && (self.platform_report.is_some() || self.ask.is_some()) {
            return Err("--dry-run cannot be combined with --platform-report or --ask".to_string());
        }
        if self.platform_report.is_some() && self.ask.is_some() {
            return Err("Cannot use both --platform-report and --ask".to_string());
        }
        if !self.report_files.is_empty() && self.platform_report.is_none() {
            return Err("--report-files requires --platform-report".to_string());
        }

        if let Some(ref question) = self.ask {
            if question.trim().is_empty() {
                return Err("Question must not be empty".to_string());
            }
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate data directory if provided
        if let Some(ref data_dir) = self.data_dir {
            if !data_dir.is_dir() {
                return Err(format!(
                    "Data directory does not exist: {}",
                    data_dir.display()
                ));
            }
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
