//! Pipeline orchestration.
//!
//! A run moves through fixed stages: ingestion fans out per platform, the
//! partial stores are merged, the platform agents fan out over the merged
//! store, and the strategy agent synthesizes their output. Each stage is a
//! barrier. Failures stay inside the task that hit them; only a run with
//! no data anywhere ends in [`RunState::Failed`].

use crate::agent::{default_agents, PlatformAgent, StrategyAgent};
use crate::config::Config;
use crate::ingest::{Ingestor, PlatformIngestor};
use crate::llm::usage::UsageSummary;
use crate::llm::LlmHandle;
use crate::models::{AgentResult, DataStore, Insight, Platform, StageStatus};
use crate::status::Status;
use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Concurrent tasks per fan-out stage, one per platform.
pub const WORKERS: usize = 3;

/// Shared per-run services handed to every stage.
#[derive(Clone)]
pub struct RunContext {
    pub llm: LlmHandle,
    pub status: Status,
}

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Ingesting,
    Merging,
    Analyzing,
    Synthesizing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Pending => "PENDING",
            RunState::Ingesting => "INGESTING",
            RunState::Merging => "MERGING",
            RunState::Analyzing => "ANALYZING",
            RunState::Synthesizing => "SYNTHESIZING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Diagnostic record of one stage task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub status: StageStatus,
    /// Records loaded (ingestion) or insights produced (agents).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    fn from_result<T>(result: &AgentResult<T>, count: Option<usize>) -> Self {
        Self {
            status: result.status,
            count,
            duration_secs: result.duration.as_secs_f64(),
            error: result.error.clone(),
        }
    }

    fn skipped(reason: &str) -> Self {
        Self::from_result(&AgentResult::<()>::skipped("", reason), None)
    }
}

/// Per-stage status, timing and errors of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ingestion: BTreeMap<Platform, StageReport>,
    /// Platforms that contributed no records.
    pub missing_platforms: Vec<Platform>,
    pub platform_agents: BTreeMap<Platform, StageReport>,
    pub strategy: StageReport,
    pub token_usage: UsageSummary,
    pub duration_secs: f64,
}

/// Everything a run hands to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub store: DataStore,
    pub linkedin: Vec<Insight>,
    pub instagram: Vec<Insight>,
    pub website: Vec<Insight>,
    pub executive: Vec<Insight>,
    pub execution_summary: ExecutionSummary,
}

impl RunOutcome {
    pub fn insights(&self, platform: Platform) -> &[Insight] {
        match platform {
            Platform::LinkedIn => &self.linkedin,
            Platform::Instagram => &self.instagram,
            Platform::Website => &self.website,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.execution_summary.state == RunState::Failed
    }
}

/// Runs the ingestion → analysis → synthesis pipeline.
pub struct Orchestrator {
    ingestors: Vec<Arc<dyn Ingestor>>,
    agents: Vec<Arc<dyn PlatformAgent>>,
    strategy: StrategyAgent,
    ctx: RunContext,
}

impl Orchestrator {
    /// An orchestrator with no ingestors or agents.
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ingestors: Vec::new(),
            agents: Vec::new(),
            strategy: StrategyAgent,
            ctx,
        }
    }

    /// Production ingestors and agents for every platform.
    pub fn from_config(config: &Config, ctx: RunContext) -> Self {
        let ingestors: Vec<Arc<dyn Ingestor>> = Platform::ALL
            .iter()
            .map(|p| Arc::new(PlatformIngestor::from_config(*p, config)) as Arc<dyn Ingestor>)
            .collect();
        Self {
            ingestors,
            agents: default_agents(),
            strategy: StrategyAgent,
            ctx,
        }
    }

    pub fn with_ingestor(mut self, ingestor: Arc<dyn Ingestor>) -> Self {
        self.ingestors.push(ingestor);
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn PlatformAgent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Execute one run. Never fails; problems are reported in the summary.
    pub async fn run(&self) -> RunOutcome {
        let started = Instant::now();
        let mut state = RunState::Pending;

        self.transition(&mut state, RunState::Ingesting);
        let ingestion = self.ingest_all().await;

        self.transition(&mut state, RunState::Merging);
        let mut store = DataStore::default();
        let mut ingestion_reports = BTreeMap::new();
        for (platform, result) in ingestion.iter() {
            let records = result.result.as_ref().map(|s| s.record_count(*platform));
            ingestion_reports.insert(*platform, StageReport::from_result(result, records));
        }
        let all_failed = !ingestion.is_empty() && ingestion.values().all(|r| !r.is_success());
        for (platform, result) in ingestion {
            if let Some(partial) = result.result {
                store.merge_platform(platform, partial);
            }
        }

        let missing_platforms: Vec<Platform> = Platform::ALL
            .iter()
            .copied()
            .filter(|p| store.record_count(*p) == 0)
            .collect();
        for platform in &missing_platforms {
            warn!(platform = %platform, "No data available");
        }
        if !missing_platforms.is_empty() {
            self.ctx.status.report(format!(
                "⚠ Missing data for: {}",
                join_platforms(&missing_platforms)
            ));
        }

        if all_failed || store.is_empty() {
            let message = if all_failed {
                "All platform ingestions failed"
            } else {
                "No data ingested from any platform"
            };
            error!("{}", message);
            self.transition(&mut state, RunState::Failed);
            let agent_reports = self
                .agents
                .iter()
                .map(|a| (a.platform(), StageReport::skipped("no data")))
                .collect();
            return self.outcome(
                store,
                BTreeMap::new(),
                Vec::new(),
                ExecutionSummary {
                    state,
                    error: Some(message.to_string()),
                    ingestion: ingestion_reports,
                    missing_platforms,
                    platform_agents: agent_reports,
                    strategy: StageReport::skipped("no data"),
                    token_usage: UsageSummary::default(),
                    duration_secs: started.elapsed().as_secs_f64(),
                },
            );
        }

        self.transition(&mut state, RunState::Analyzing);
        let store = Arc::new(store);
        let analysis = self.analyze_all(&store).await;

        let mut agent_reports = BTreeMap::new();
        let mut platform_insights: BTreeMap<Platform, Vec<Insight>> = BTreeMap::new();
        for (platform, result) in analysis {
            let count = result.result.as_ref().map(Vec::len);
            agent_reports.insert(platform, StageReport::from_result(&result, count));
            platform_insights.insert(platform, result.result.unwrap_or_default());
        }

        self.transition(&mut state, RunState::Synthesizing);
        let productive = agent_reports
            .values()
            .any(|r| r.status == StageStatus::Success && r.count.unwrap_or(0) > 0);
        let (executive, strategy_report) = if productive {
            self.synthesize(&store, &platform_insights).await
        } else {
            info!("No platform insights; skipping strategy synthesis");
            (Vec::new(), StageReport::skipped("no platform insights"))
        };

        self.transition(&mut state, RunState::Done);
        let store = Arc::try_unwrap(store).unwrap_or_else(|shared| (*shared).clone());
        self.outcome(
            store,
            platform_insights,
            executive,
            ExecutionSummary {
                state,
                error: None,
                ingestion: ingestion_reports,
                missing_platforms,
                platform_agents: agent_reports,
                strategy: strategy_report,
                token_usage: UsageSummary::default(),
                duration_secs: started.elapsed().as_secs_f64(),
            },
        )
    }

    async fn ingest_all(&self) -> BTreeMap<Platform, AgentResult<DataStore>> {
        for ingestor in &self.ingestors {
            queued(&format!("{} ingestion", ingestor.platform()));
        }
        stream::iter(self.ingestors.iter().cloned())
            .map(|ingestor| {
                let ctx = self.ctx.clone();
                let platform = ingestor.platform();
                async move {
                    let name = format!("{} ingestion", platform);
                    started_stage(&ctx, &name);
                    let started = Instant::now();
                    let task = tokio::spawn(async move { ingestor.load(&ctx).await });
                    let result = match task.await {
                        Ok(Ok(store)) => AgentResult::success(name, store, started.elapsed()),
                        Ok(Err(e)) => {
                            warn!(platform = %platform, "Ingestion failed: {:#}", e);
                            AgentResult::failed(name, &format!("{:#}", e), started.elapsed())
                        }
                        Err(e) => {
                            let message = join_error_message(e);
                            error!(platform = %platform, "Ingestion task aborted: {}", message);
                            AgentResult::failed(name, &message, started.elapsed())
                        }
                    };
                    (platform, result)
                }
            })
            .buffer_unordered(WORKERS)
            .collect()
            .await
    }

    async fn analyze_all(
        &self,
        store: &Arc<DataStore>,
    ) -> BTreeMap<Platform, AgentResult<Vec<Insight>>> {
        for agent in &self.agents {
            queued(agent.name());
        }
        stream::iter(self.agents.iter().cloned())
            .map(|agent| {
                let ctx = self.ctx.clone();
                let store = Arc::clone(store);
                let platform = agent.platform();
                let name = agent.name().to_string();
                async move {
                    started_stage(&ctx, &name);
                    let started = Instant::now();
                    let task = tokio::spawn(async move { agent.analyze(&store, &ctx).await });
                    let result = match task.await {
                        Ok(Ok(insights)) => {
                            info!(agent = %name, insights = insights.len(), "Agent finished");
                            AgentResult::success(name, insights, started.elapsed())
                        }
                        Ok(Err(e)) => {
                            warn!(agent = %name, "Agent failed: {:#}", e);
                            AgentResult::failed(name, &format!("{:#}", e), started.elapsed())
                        }
                        Err(e) => {
                            let message = join_error_message(e);
                            error!(agent = %name, "Agent task aborted: {}", message);
                            AgentResult::failed(name, &message, started.elapsed())
                        }
                    };
                    (platform, result)
                }
            })
            .buffer_unordered(WORKERS)
            .collect()
            .await
    }

    async fn synthesize(
        &self,
        store: &DataStore,
        platform_insights: &BTreeMap<Platform, Vec<Insight>>,
    ) -> (Vec<Insight>, StageReport) {
        self.ctx.status.report("Synthesizing executive insights...");
        let started = Instant::now();
        let result = AssertUnwindSafe(self.strategy.generate_executive_summary(
            store,
            platform_insights,
            &self.ctx,
        ))
        .catch_unwind()
        .await;

        match result {
            Ok(executive) => {
                let report = StageReport::from_result(
                    &AgentResult::success("Strategy", (), started.elapsed()),
                    Some(executive.len()),
                );
                (executive, report)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Strategy synthesis panicked: {}", message);
                let result = AgentResult::<()>::failed("Strategy", &message, started.elapsed());
                (Vec::new(), StageReport::from_result(&result, None))
            }
        }
    }

    fn transition(&self, state: &mut RunState, next: RunState) {
        info!(from = %state, to = %next, "Run state change");
        *state = next;
        self.ctx.status.report(format!("Stage: {}", next));
    }

    fn outcome(
        &self,
        store: DataStore,
        mut platform_insights: BTreeMap<Platform, Vec<Insight>>,
        executive: Vec<Insight>,
        mut summary: ExecutionSummary,
    ) -> RunOutcome {
        summary.token_usage = self.ctx.llm.usage().summary();
        RunOutcome {
            store,
            linkedin: platform_insights.remove(&Platform::LinkedIn).unwrap_or_default(),
            instagram: platform_insights.remove(&Platform::Instagram).unwrap_or_default(),
            website: platform_insights.remove(&Platform::Website).unwrap_or_default(),
            executive,
            execution_summary: summary,
        }
    }
}

fn queued(name: &str) {
    debug!(stage = %name, status = %StageStatus::Pending, "Stage queued");
}

fn started_stage(ctx: &RunContext, name: &str) {
    debug!(stage = %name, status = %StageStatus::Running, "Stage started");
    ctx.status.report(format!("{}: {}", name, StageStatus::Running));
}

fn join_platforms(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_error_message(e: tokio::task::JoinError) -> String {
    if e.is_panic() {
        let payload = e.into_panic();
        format!("panicked: {}", panic_message(payload.as_ref()))
    } else {
        "task cancelled".to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::{instagram_series, website_series};
    use crate::config::IngestionConfig;
    use crate::llm::testing::{handle, FailingClient};
    use crate::status::StatusLog;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn ctx() -> RunContext {
        RunContext {
            llm: handle(Arc::new(FailingClient)),
            status: Status::silent(),
        }
    }

    struct StaticIngestor {
        platform: Platform,
        store: DataStore,
    }

    #[async_trait]
    impl Ingestor for StaticIngestor {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn load(&self, _ctx: &RunContext) -> Result<DataStore> {
            Ok(self.store.clone())
        }
    }

    struct FailingIngestor(Platform);

    #[async_trait]
    impl Ingestor for FailingIngestor {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn load(&self, _ctx: &RunContext) -> Result<DataStore> {
            bail!("export directory unreadable")
        }
    }

    struct PanickingIngestor(Platform);

    #[async_trait]
    impl Ingestor for PanickingIngestor {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn load(&self, _ctx: &RunContext) -> Result<DataStore> {
            panic!("corrupt state")
        }
    }

    struct PanickingAgent;

    #[async_trait]
    impl PlatformAgent for PanickingAgent {
        fn name(&self) -> &str {
            "Instagram"
        }

        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn analyze(&self, _store: &DataStore, _ctx: &RunContext) -> Result<Vec<Insight>> {
            panic!("index out of bounds")
        }
    }

    fn instagram_store(days: usize) -> DataStore {
        DataStore {
            instagram_metrics: instagram_series(days, |i| (1000 + i as u64, 0.05)),
            ..DataStore::default()
        }
    }

    fn website_store(days: usize) -> DataStore {
        DataStore {
            website_metrics: website_series(days, |_| (500, 200, 0.45)),
            ..DataStore::default()
        }
    }

    fn degraded_orchestrator() -> Orchestrator {
        Orchestrator::new(ctx())
            .with_ingestor(Arc::new(FailingIngestor(Platform::LinkedIn)))
            .with_ingestor(Arc::new(StaticIngestor {
                platform: Platform::Instagram,
                store: instagram_store(40),
            }))
            .with_ingestor(Arc::new(StaticIngestor {
                platform: Platform::Website,
                store: website_store(40),
            }))
    }

    #[tokio::test]
    async fn test_linkedin_failure_degrades_run() {
        let mut orchestrator = degraded_orchestrator();
        for agent in default_agents() {
            orchestrator = orchestrator.with_agent(agent);
        }

        let outcome = orchestrator.run().await;
        let summary = &outcome.execution_summary;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.ingestion[&Platform::LinkedIn].status, StageStatus::Failed);
        assert!(summary.ingestion[&Platform::LinkedIn]
            .error
            .as_deref()
            .unwrap()
            .contains("unreadable"));
        assert_eq!(summary.ingestion[&Platform::Instagram].status, StageStatus::Success);
        assert_eq!(summary.ingestion[&Platform::Website].status, StageStatus::Success);
        assert_eq!(summary.ingestion[&Platform::Website].count, Some(40));

        assert!(outcome.store.linkedin_metrics.is_empty());
        assert_eq!(outcome.store.instagram_metrics.len(), 40);
        assert_eq!(outcome.store.website_metrics.len(), 40);
        assert_eq!(summary.missing_platforms, vec![Platform::LinkedIn]);

        assert!(outcome.linkedin.is_empty());
        assert!(!outcome.instagram.is_empty());
        assert!(!outcome.website.is_empty());
        assert_ne!(summary.strategy.status, StageStatus::Skipped);
        assert_eq!(summary.strategy.status, StageStatus::Success);
        assert!(!outcome.executive.is_empty());
    }

    #[tokio::test]
    async fn test_all_ingestions_failing_fails_run() {
        let outcome = Orchestrator::new(ctx())
            .with_ingestor(Arc::new(FailingIngestor(Platform::LinkedIn)))
            .with_ingestor(Arc::new(FailingIngestor(Platform::Instagram)))
            .with_ingestor(Arc::new(PanickingIngestor(Platform::Website)))
            .with_agent(Arc::new(crate::agent::LinkedInAgent))
            .run()
            .await;

        assert!(outcome.is_failed());
        let summary = &outcome.execution_summary;
        assert!(summary.error.is_some());
        assert_eq!(summary.strategy.status, StageStatus::Skipped);
        assert_eq!(summary.platform_agents[&Platform::LinkedIn].status, StageStatus::Skipped);
        assert!(summary.ingestion[&Platform::Website]
            .error
            .as_deref()
            .unwrap()
            .contains("corrupt state"));
        assert!(outcome.executive.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_fails_run() {
        let outcome = Orchestrator::new(ctx())
            .with_ingestor(Arc::new(StaticIngestor {
                platform: Platform::Website,
                store: DataStore::default(),
            }))
            .run()
            .await;

        assert!(outcome.is_failed());
        assert_eq!(
            outcome.execution_summary.ingestion[&Platform::Website].status,
            StageStatus::Success
        );
    }

    #[tokio::test]
    async fn test_agent_panic_is_isolated() {
        let outcome = degraded_orchestrator()
            .with_agent(Arc::new(PanickingAgent))
            .with_agent(Arc::new(crate::agent::WebsiteAgent))
            .run()
            .await;
        let summary = &outcome.execution_summary;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.platform_agents[&Platform::Instagram].status, StageStatus::Failed);
        assert!(summary.platform_agents[&Platform::Instagram]
            .error
            .as_deref()
            .unwrap()
            .contains("index out of bounds"));
        assert!(outcome.instagram.is_empty());
        assert_eq!(summary.platform_agents[&Platform::Website].status, StageStatus::Success);
        assert_eq!(outcome.website.len(), 2);
        assert_eq!(summary.strategy.status, StageStatus::Success);
    }

    #[tokio::test]
    async fn test_strategy_skipped_without_insights() {
        let outcome = Orchestrator::new(ctx())
            .with_ingestor(Arc::new(StaticIngestor {
                platform: Platform::Website,
                store: website_store(5),
            }))
            .with_agent(Arc::new(crate::agent::WebsiteAgent))
            .run()
            .await;
        let summary = &outcome.execution_summary;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.platform_agents[&Platform::Website].status, StageStatus::Success);
        assert_eq!(summary.platform_agents[&Platform::Website].count, Some(0));
        assert_eq!(summary.strategy.status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_status_reports_stages_and_outcome_serializes() {
        let log = Arc::new(StatusLog::new());
        let ctx = RunContext {
            llm: handle(Arc::new(FailingClient)),
            status: Status::with_sink(log.clone()),
        };
        let outcome = Orchestrator::new(ctx)
            .with_ingestor(Arc::new(StaticIngestor {
                platform: Platform::Website,
                store: website_store(30),
            }))
            .with_agent(Arc::new(crate::agent::WebsiteAgent))
            .run()
            .await;

        let messages = log.snapshot();
        let stages: Vec<&str> = messages
            .iter()
            .map(String::as_str)
            .filter(|m| m.starts_with("Stage: "))
            .collect();
        assert_eq!(
            stages,
            vec![
                "Stage: INGESTING",
                "Stage: MERGING",
                "Stage: ANALYZING",
                "Stage: SYNTHESIZING",
                "Stage: DONE"
            ]
        );

        assert!(messages.iter().any(|m| m == "Website ingestion: running"));
        assert!(messages.iter().any(|m| m == "Website: running"));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["execution_summary"]["state"], "done");
        assert_eq!(json["execution_summary"]["ingestion"]["website"]["status"], "success");
        assert_eq!(json["website"].as_array().unwrap().len(), 2);
        assert!(json["store"]["website_metrics"].is_array());
    }

    #[tokio::test]
    async fn test_from_config_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("linkedin")).unwrap();
        let mut csv = String::from(
            "Date,Impressions (total),Clicks (total),Reactions (total),Engagement rate (total)\n",
        );
        let start = chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        for i in 0..45 {
            let date = start + chrono::Duration::days(i);
            csv.push_str(&format!("{},1200,12,40,4.50%\n", date.format("%m/%d/%Y")));
        }
        fs::write(dir.path().join("linkedin").join("content.csv"), csv).unwrap();

        let mut config = Config::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.ingestion = IngestionConfig {
            use_llm_discovery: false,
            ..IngestionConfig::default()
        };

        let outcome = Orchestrator::from_config(&config, ctx()).run().await;
        let summary = &outcome.execution_summary;

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(outcome.store.linkedin_metrics.len(), 45);
        assert_eq!(
            summary.missing_platforms,
            vec![Platform::Instagram, Platform::Website]
        );
        assert_eq!(outcome.linkedin.len(), 2);
        assert!(outcome.linkedin[0].metric_basis.contains("4.5%"));
        assert!(!outcome.executive.is_empty());
    }
}
