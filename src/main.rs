//! insightroom - multi-agent marketing analytics
//!
//! A CLI tool that loads LinkedIn, Instagram and website exports, runs one
//! analysis agent per platform concurrently, and synthesizes an executive
//! report with optional language-model narration.
//!
//! Exit codes:
//!   0 - Success (including runs where some platforms failed)
//!   1 - Runtime error (config, I/O, no files for a platform report, etc.)
//!   2 - Pipeline FAILED: no data was loaded for any platform

mod agent;
mod analysis;
mod cli;
mod config;
mod discovery;
mod ingest;
mod llm;
mod models;
mod orchestrator;
mod qa;
mod report;
mod scanner;
mod status;

use anyhow::{Context, Result};
use chrono::Local;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use ingest::PlatformIngestor;
use llm::LlmHandle;
use models::Platform;
use orchestrator::{Orchestrator, RunContext, RunOutcome};
use report::platform::report_kinds;
use report::{PlatformReportGenerator, ReportMetadata};
use status::{SpinnerSink, Status};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("insightroom v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .insightroom.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to set the data directory, model, endpoint, and token budgets.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the requested mode. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Handle --dry-run: classify files and exit
    if args.dry_run {
        return handle_dry_run(&config);
    }

    let llm = LlmHandle::from_config(&config.model);
    println!("🤖 Insight room");
    println!("   Data: {}", config.general.data_dir.display());
    if llm.is_enabled() {
        println!("   Model: {}", config.model.name);
        println!("   Timeout: {}s", config.model.timeout_seconds);
    } else {
        println!("   Model: none (heuristics and templates only)");
    }

    if let Some(platform) = args.platform_report {
        return handle_platform_report(&args, &config, platform, &llm).await;
    }

    // Run the pipeline
    println!("\n🔬 Running analysis pipeline...\n");
    let spinner = (!args.quiet).then(|| Arc::new(SpinnerSink::new()));
    let status = match &spinner {
        Some(sink) => Status::with_sink(sink.clone()),
        None => Status::silent(),
    };
    let ctx = RunContext {
        llm: llm.clone(),
        status,
    };
    let outcome = Orchestrator::from_config(&config, ctx).run().await;
    if let Some(sink) = spinner {
        sink.finish(&format!("Stage: {}", outcome.execution_summary.state));
    }

    if let Some(ref question) = args.ask {
        let answer = qa::ask(question, &outcome, &llm).await;
        println!("\n💬 {}\n", question.trim());
        println!("{}", answer.text);
        if !answer.from_model {
            println!("\n   (answered from the produced insights)");
        }
        return Ok(exit_code(&outcome));
    }

    // Generate and save the report
    println!("\n📝 Generating report...");
    let output_path = PathBuf::from(&config.general.output);
    let metadata = ReportMetadata {
        generated_at: Local::now(),
        model: config.model.name.clone(),
        data_dir: config.general.data_dir.clone(),
        llm_enabled: llm.is_enabled(),
    };
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&outcome)?,
        OutputFormat::Markdown => report::generate_markdown_report(&outcome, &metadata),
    };
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&outcome, start_time.elapsed().as_secs_f64());

    if outcome.is_failed() {
        eprintln!(
            "\n⛔ No data was loaded for any platform. Report saved to: {} (exit code 2).",
            output_path.display()
        );
        return Ok(2);
    }

    println!("\n✅ Analysis complete! Report saved to: {}", output_path.display());
    Ok(0)
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    if outcome.is_failed() {
        2
    } else {
        0
    }
}

/// Print the per-platform counts and usage of a run.
fn print_summary(outcome: &RunOutcome, duration: f64) {
    let summary = &outcome.execution_summary;

    println!("\n📊 Run Summary:");
    println!("   State: {}", summary.state);
    for platform in Platform::ALL {
        let records = outcome.store.record_count(platform);
        if records == 0 {
            println!("   - {}: no data", platform);
        } else {
            println!(
                "   - {}: {} records, {} insights",
                platform,
                records,
                outcome.insights(platform).len()
            );
        }
    }
    println!("   Executive insights: {}", outcome.executive.len());
    if summary.token_usage.total_calls > 0 {
        println!(
            "   Model calls: {} ({} tokens, ~${:.4})",
            summary.token_usage.total_calls,
            summary.token_usage.total_tokens,
            summary.token_usage.total_cost
        );
    }
    println!("   Duration: {:.1}s", duration);
}

/// Handle --dry-run: scan and classify files, print what would be ingested.
fn handle_dry_run(config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: scanning export files (no LLM call)...\n");

    let mut total = 0;
    for platform in Platform::ALL {
        let ingestor = PlatformIngestor::from_config(platform, config);
        let files = ingestor.preview();

        println!("   {} ({})", platform, ingestor.directory().display());
        if files.is_empty() {
            println!("     No matching export files found.");
            continue;
        }
        for (file, kind) in &files {
            let kind = kind.map(|k| k.tag()).unwrap_or("unclassified");
            println!("     📄 {} [{}] ({} bytes)", file.name, kind, file.size);
        }
        total += files.len();
    }

    println!("\n   Total: {} files", total);
    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

/// Handle --platform-report: long-form report for one platform.
async fn handle_platform_report(
    args: &Args,
    config: &Config,
    platform: Platform,
    llm: &LlmHandle,
) -> Result<i32> {
    let known = report_kinds(platform);
    for kind in &args.report_files {
        if !known.contains(&kind.trim().to_lowercase().as_str()) {
            warn!(
                "Unknown {} file kind '{}' (expected one of: {})",
                platform,
                kind,
                known.join(", ")
            );
        }
    }

    println!("\n📑 Generating {} {} report...", platform, args.report_type);
    let generator =
        PlatformReportGenerator::new(PlatformIngestor::from_config(platform, config), platform);
    let report = generator
        .generate(&args.report_files, args.report_type, llm)
        .await;

    let (content, extension) = match args.format {
        OutputFormat::Json => (serde_json::to_string_pretty(&report)?, "json"),
        OutputFormat::Markdown => (report.to_markdown(), "md"),
    };
    let path = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "{}_{}_report.{}",
            platform.key(),
            args.report_type,
            extension
        ))
    });
    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    if let Some(ref error) = report.error {
        eprintln!("\n⛔ {} (requested: {})", error, report.files_requested.join(", "));
        return Ok(1);
    }

    println!("   Files analyzed: {}", report.files_analyzed.join(", "));
    if !report.from_model {
        println!("   Model analysis unavailable; the report holds the computed data summary.");
    }
    if !report.recommendations.is_empty() {
        println!("\n🎯 Top recommendations:");
        for (i, rec) in report.recommendations.iter().enumerate() {
            println!("   {}. {}", i + 1, rec);
        }
    }
    println!("\n✅ Report saved to: {}", path.display());
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
