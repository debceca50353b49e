//! Markdown report generation.
//!
//! This module renders the result of a pipeline run as a Markdown
//! executive report, or as JSON for downstream tooling.

use crate::analysis::{platform_kpis, Kpi};
use crate::llm::UsageSummary;
use crate::models::{Insight, Platform};
use crate::orchestrator::{ExecutionSummary, RunOutcome, StageReport};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Context of the run that produced a report.
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Local>,
    pub model: String,
    pub data_dir: PathBuf,
    pub llm_enabled: bool,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(outcome: &RunOutcome, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Marketing Insight Room Report\n\n");

    output.push_str(&generate_metadata_section(metadata, &outcome.execution_summary));
    output.push_str(&generate_table_of_contents(outcome));
    output.push_str(&generate_execution_section(&outcome.execution_summary));
    output.push_str(&generate_executive_section(&outcome.executive));

    for platform in Platform::ALL {
        output.push_str(&generate_platform_section(outcome, platform));
    }

    output.push_str(&generate_usage_section(&outcome.execution_summary.token_usage));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata, summary: &ExecutionSummary) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    section.push_str(&format!("- **Data Directory:** `{}`\n", metadata.data_dir.display()));
    if metadata.llm_enabled {
        section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model));
    } else {
        section.push_str("- **Model Used:** none (template narration)\n");
    }
    section.push_str(&format!("- **Run State:** {}\n", summary.state));
    if let Some(error) = &summary.error {
        section.push_str(&format!("- **Error:** {}\n", error));
    }
    if !summary.missing_platforms.is_empty() {
        let missing: Vec<String> = summary.missing_platforms.iter().map(|p| p.to_string()).collect();
        section.push_str(&format!("- **Missing Platforms:** {}\n", missing.join(", ")));
    }
    section.push_str(&format!("- **Duration:** {:.1}s\n", summary.duration_secs));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(outcome: &RunOutcome) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Execution Summary](#execution-summary)\n");
    if !outcome.executive.is_empty() {
        toc.push_str("- [Executive Insights](#executive-insights)\n");
    }
    for platform in Platform::ALL {
        toc.push_str(&format!("- [{}](#{})\n", platform, platform.key()));
    }
    toc.push_str("- [Token Usage](#token-usage)\n");
    toc.push('\n');

    toc
}

/// Generate the per-stage status table.
fn generate_execution_section(summary: &ExecutionSummary) -> String {
    let mut section = String::new();

    section.push_str("## Execution Summary\n\n");
    section.push_str("| Stage | Status | Count | Duration | Note |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---|\n");

    for (platform, report) in &summary.ingestion {
        section.push_str(&stage_row(&format!("Ingest {}", platform), report));
    }
    for (platform, report) in &summary.platform_agents {
        section.push_str(&stage_row(&format!("{} agent", platform), report));
    }
    section.push_str(&stage_row("Strategy agent", &summary.strategy));
    section.push('\n');

    section
}

fn stage_row(stage: &str, report: &StageReport) -> String {
    format!(
        "| {} | {} | {} | {:.1}s | {} |\n",
        stage,
        report.status,
        report.count.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
        report.duration_secs,
        report.error.as_deref().unwrap_or("")
    )
}

/// Generate the executive insights section.
fn generate_executive_section(insights: &[Insight]) -> String {
    if insights.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Executive Insights\n\n");
    for insight in insights {
        section.push_str(&generate_insight_block(insight));
    }
    section
}

/// Generate KPI cards and insights for one platform.
fn generate_platform_section(outcome: &RunOutcome, platform: Platform) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", platform));

    let records = outcome.store.record_count(platform);
    if records == 0 {
        section.push_str("No data available for this platform.\n\n");
        return section;
    }
    section.push_str(&format!("*Records: {}*\n\n", records));

    let kpis = platform_kpis(&outcome.store, platform);
    if !kpis.is_empty() {
        section.push_str(&generate_kpi_table(&kpis));
    }

    let insights = outcome.insights(platform);
    if insights.is_empty() {
        section.push_str("No insights were produced for this platform.\n\n");
    }
    for insight in insights {
        section.push_str(&generate_insight_block(insight));
    }

    section
}

fn generate_kpi_table(kpis: &[Kpi]) -> String {
    let mut table = String::new();

    table.push_str("| KPI | Value | Change | Note |\n");
    table.push_str("|:---|:---:|:---:|:---|\n");
    for kpi in kpis {
        table.push_str(&format!(
            "| {} | {} | {} {} | {} |\n",
            kpi.label,
            kpi.value,
            kpi.trend.arrow(),
            kpi.change,
            kpi.helper
        ));
    }
    table.push('\n');

    table
}

/// Generate a single insight block.
fn generate_insight_block(insight: &Insight) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {}\n\n", insight.title));
    block.push_str(&format!(
        "*{} | Confidence: {}*\n\n",
        insight.time_range, insight.confidence
    ));
    block.push_str(&format!("{}\n\n", insight.summary));
    if !insight.metric_basis.is_empty() {
        block.push_str(&format!("**Basis:** {}\n\n", insight.metric_basis));
    }
    if !insight.recommendation.is_empty() {
        block.push_str(&format!("> **Recommendation:** {}\n\n", insight.recommendation));
    }
    if !insight.evidence.is_empty() {
        block.push_str("<details>\n<summary>Evidence</summary>\n\n");
        for item in &insight.evidence {
            block.push_str(&format!("- {}\n", item));
        }
        block.push_str("\n</details>\n\n");
    }

    block
}

/// Generate the token usage section.
fn generate_usage_section(usage: &UsageSummary) -> String {
    let mut section = String::new();

    section.push_str("## Token Usage\n\n");
    if usage.total_calls == 0 {
        section.push_str("No model calls were made.\n\n");
        return section;
    }

    section.push_str(&format!(
        "- **Calls:** {}\n- **Tokens:** {} ({} prompt, {} completion)\n- **Estimated Cost:** ${:.4}\n\n",
        usage.total_calls,
        usage.total_tokens,
        usage.total_prompt_tokens,
        usage.total_completion_tokens,
        usage.total_cost
    ));

    section.push_str("| Agent | Calls | Tokens | Cost |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");
    for (agent, totals) in &usage.by_agent {
        section.push_str(&format!(
            "| {} | {} | {} | ${:.4} |\n",
            agent, totals.calls, totals.tokens, totals.cost
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by insightroom*\n");

    footer
}

/// Write the Markdown report to a file.
pub fn write_report(outcome: &RunOutcome, metadata: &ReportMetadata, path: &Path) -> Result<()> {
    let content = generate_markdown_report(outcome, metadata);
    write_text(&content, path)
}

/// Generate a JSON report.
pub fn generate_json_report(outcome: &RunOutcome) -> Result<String> {
    serde_json::to_string_pretty(outcome).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(outcome: &RunOutcome, path: &Path) -> Result<()> {
    let content = generate_json_report(outcome)?;
    write_text(&content, path)
}

pub(crate) fn write_text(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
