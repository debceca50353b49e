//! Ingestion of platform export files into a partial [`DataStore`].
//!
//! One ingestor runs per platform. It scans the platform directory,
//! classifies each file through schema discovery, and parses the whole
//! file with lenient coercion. Bad rows and bad files are skipped; a
//! missing directory simply yields an empty store.

pub mod coerce;
pub mod instagram;
pub mod linkedin;
pub mod table;
pub mod website;

use crate::config::{Config, IngestionConfig};
use crate::discovery::{DiscoveredSchema, FileKind, HeuristicRegistry, SchemaDiscovery};
use crate::models::{DataStore, Platform};
use crate::orchestrator::RunContext;
use crate::scanner::{FileScanner, ScanConfig, ScannedFile};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use table::Table;
use tracing::{debug, info, warn};

/// Loads one platform's data.
#[async_trait]
pub trait Ingestor: Send + Sync {
    fn platform(&self) -> Platform;

    /// Build a partial store holding only this platform's records.
    async fn load(&self, ctx: &RunContext) -> Result<DataStore>;
}

/// Outcome of loading one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLoad {
    pub kind: FileKind,
    pub rows: usize,
    pub loaded: usize,
    pub skipped: usize,
}

impl FileLoad {
    pub fn new(kind: FileKind, rows: usize) -> Self {
        Self {
            kind,
            rows,
            loaded: 0,
            skipped: 0,
        }
    }
}

/// Parsed content of a source file.
enum Source {
    Table(Table),
    Records(Vec<instagram::JsonRecord>),
}

/// The production ingestor for one platform.
pub struct PlatformIngestor {
    platform: Platform,
    data_dir: PathBuf,
    config: IngestionConfig,
    discovery: SchemaDiscovery,
}

impl PlatformIngestor {
    pub fn new(platform: Platform, data_dir: &Path, config: &IngestionConfig) -> Self {
        let discovery = SchemaDiscovery::new(
            HeuristicRegistry::with_defaults(),
            config.use_llm_discovery,
            config.max_sample_columns,
            config.sample_rows,
        );
        Self {
            platform,
            data_dir: data_dir.to_path_buf(),
            config: config.clone(),
            discovery,
        }
    }

    pub fn from_config(platform: Platform, config: &Config) -> Self {
        Self::new(platform, &config.general.data_dir, &config.ingestion)
    }

    pub fn directory(&self) -> PathBuf {
        self.data_dir.join(self.config.platform_dir(self.platform))
    }

    /// Candidate files in the platform directory.
    pub fn scan(&self) -> Vec<ScannedFile> {
        let config = ScanConfig::from_config(self.platform, &self.config);
        FileScanner::new(self.directory(), config).scan()
    }

    /// Classify every candidate file with heuristics only.
    pub fn preview(&self) -> Vec<(ScannedFile, Option<FileKind>)> {
        self.scan()
            .into_iter()
            .map(|file| {
                let kind = self
                    .read_source(&file.path)
                    .ok()
                    .and_then(|source| {
                        let sample = self.sample(&file, &source);
                        self.discovery.heuristic(&sample, self.platform)
                    })
                    .map(|schema| schema.kind);
                (file, kind)
            })
            .collect()
    }

    fn read_source(&self, path: &Path) -> Result<Source> {
        match self.platform {
            Platform::Instagram => Ok(Source::Records(instagram::read_records(path)?)),
            Platform::LinkedIn | Platform::Website => Ok(Source::Table(Table::read(path)?)),
        }
    }

    fn sample(&self, file: &ScannedFile, source: &Source) -> crate::discovery::SchemaSample {
        match source {
            Source::Table(table) => table.sample(&file.name, self.config.sample_rows),
            Source::Records(records) => {
                instagram::sample(&file.name, records, self.config.sample_rows)
            }
        }
    }

    /// Load one file. `Ok(None)` means the file was classified as irrelevant.
    async fn load_file(
        &self,
        file: &ScannedFile,
        ctx: &RunContext,
        store: &mut DataStore,
    ) -> Result<Option<FileLoad>> {
        let source = self.read_source(&file.path)?;
        let sample = self.sample(file, &source);

        let Some(schema) = self
            .discovery
            .classify(&sample, self.platform, &ctx.llm)
            .await
        else {
            return Ok(None);
        };
        debug!(file = %file.name, kind = %schema.kind, source = ?schema.source, "Classified file");

        Ok(Some(self.apply(&schema, &source, store)))
    }

    fn apply(&self, schema: &DiscoveredSchema, source: &Source, store: &mut DataStore) -> FileLoad {
        match (self.platform, source) {
            (Platform::LinkedIn, Source::Table(table)) => {
                linkedin::load_table(schema.kind, table, &schema.mapping, store)
            }
            (Platform::Website, Source::Table(table)) => {
                website::load_table(schema.kind, table, &schema.mapping, store)
            }
            (Platform::Instagram, Source::Records(records)) => {
                instagram::load_records(schema.kind, records, &schema.mapping, store)
            }
            _ => FileLoad::new(FileKind::Other, 0),
        }
    }

    fn load_competitors(&self, ctx: &RunContext, store: &mut DataStore) {
        let path = self.data_dir.join(&self.config.competitors_file);
        if !path.is_file() {
            debug!("No competitor list at {}", path.display());
            return;
        }
        match linkedin::load_competitors(&path) {
            Ok(names) => {
                ctx.status
                    .report(format!("✓ Loaded {} competitors", names.len()));
                store.competitors = names;
            }
            Err(e) => {
                warn!("Failed to load competitors: {:#}", e);
                ctx.status.report(format!("✗ Could not read competitor list: {}", e));
            }
        }
    }
}

#[async_trait]
impl Ingestor for PlatformIngestor {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn load(&self, ctx: &RunContext) -> Result<DataStore> {
        let mut store = DataStore::default();
        let files = self.scan();

        if files.is_empty() {
            ctx.status.report(format!(
                "No {} files found in {}",
                self.platform,
                self.directory().display()
            ));
        }

        for file in &files {
            ctx.status
                .report(format!("Reading {} file {}", self.platform, file.name));
            match self.load_file(file, ctx, &mut store).await {
                Ok(Some(load)) => {
                    info!(
                        platform = %self.platform,
                        file = %file.name,
                        kind = %load.kind,
                        loaded = load.loaded,
                        skipped = load.skipped,
                        "Loaded file"
                    );
                    if load.skipped > 0 {
                        ctx.status.report(format!(
                            "  {}: {} rows loaded, {} skipped",
                            file.name, load.loaded, load.skipped
                        ));
                    }
                }
                Ok(None) => {
                    ctx.status
                        .report(format!("  Skipping {} (unrecognized export)", file.name));
                }
                Err(e) => {
                    warn!(platform = %self.platform, file = %file.name, "Failed to load file: {:#}", e);
                    ctx.status
                        .report(format!("  ✗ Skipping {}: {}", file.name, e));
                }
            }
        }

        if self.platform == Platform::LinkedIn {
            self.load_competitors(ctx, &mut store);
        }

        ctx.status.report(format!(
            "✓ Loaded {} {} records",
            store.record_count(self.platform),
            self.platform
        ));
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{handle, FailingClient};
    use crate::status::{Status, StatusLog};
    use std::fmt::Write as _;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx() -> RunContext {
        RunContext {
            llm: handle(Arc::new(FailingClient)),
            status: Status::silent(),
        }
    }

    fn ingestor(dir: &Path, platform: Platform) -> PlatformIngestor {
        PlatformIngestor::new(platform, dir, &IngestionConfig::default())
    }

    fn linkedin_csv(days: u32, bad_every: Option<u32>) -> String {
        let mut csv = String::from("Aggregate engagement metrics\n");
        csv.push_str("Date,Impressions (total),Clicks (total),Reactions (total),Engagement rate (total)\n");
        let start = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for i in 0..days {
            let date = start + chrono::Duration::days(i as i64);
            let bad = bad_every.map(|n| i % n == 0).unwrap_or(false);
            let impressions = if bad { "n/a".to_string() } else { format!("\"1,{:03}\"", i) };
            let _ = writeln!(
                csv,
                "{},{},{},{},4.50%",
                date.format("%m/%d/%Y"),
                impressions,
                i % 7,
                10 + i
            );
        }
        csv
    }

    #[tokio::test]
    async fn test_linkedin_csv_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("linkedin")).unwrap();
        fs::write(dir.path().join("linkedin").join("page_content.csv"), linkedin_csv(3, None)).unwrap();

        let store = ingestor(dir.path(), Platform::LinkedIn).load(&ctx()).await.unwrap();

        assert_eq!(store.linkedin_metrics.len(), 3);
        let first = &store.linkedin_metrics[0];
        assert_eq!(first.date, chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(first.impressions, 1000);
        assert_eq!(first.engagement_rate, 0.045);
        assert!(store.instagram_metrics.is_empty());
        assert!(store.website_metrics.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("linkedin")).unwrap();
        let mut csv = linkedin_csv(100, None);
        // Five rows with a broken date and non-numeric impressions
        for i in 0..5 {
            csv.push_str(&format!("garbage-{i},lots,,,\n"));
        }
        fs::write(dir.path().join("linkedin").join("content.csv"), csv).unwrap();

        let store = ingestor(dir.path(), Platform::LinkedIn).load(&ctx()).await.unwrap();

        assert!(store.linkedin_metrics.len() >= 95);
        assert!(store.linkedin_metrics.len() <= 105);
    }

    #[tokio::test]
    async fn test_non_numeric_impressions_with_valid_dates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("linkedin")).unwrap();
        // Rows 0, 20, 40, 60 and 80 carry "n/a" impressions
        fs::write(dir.path().join("linkedin").join("content.csv"), linkedin_csv(100, Some(20))).unwrap();

        let store = ingestor(dir.path(), Platform::LinkedIn).load(&ctx()).await.unwrap();

        let count = store.linkedin_metrics.len();
        assert!((95..=100).contains(&count), "loaded {} records", count);
        let valid = store
            .linkedin_metrics
            .iter()
            .filter(|m| m.impressions >= 1000)
            .count();
        assert_eq!(valid, 95);
        assert!(store.linkedin_metrics.iter().all(|m| m.engagement_rate == 0.045));
    }

    #[tokio::test]
    async fn test_missing_directory_yields_empty_store() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(StatusLog::new());
        let ctx = RunContext {
            llm: handle(Arc::new(FailingClient)),
            status: Status::with_sink(log.clone()),
        };

        let store = ingestor(dir.path(), Platform::Website).load(&ctx).await.unwrap();

        assert!(store.is_empty());
        assert!(log.snapshot().iter().any(|m| m.contains("No Website files")));
    }

    #[tokio::test]
    async fn test_ingestion_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("linkedin")).unwrap();
        fs::write(dir.path().join("linkedin").join("content.csv"), linkedin_csv(40, Some(9))).unwrap();
        let ingestor = ingestor(dir.path(), Platform::LinkedIn);

        let first = ingestor.load(&ctx()).await.unwrap();
        let second = ingestor.load(&ctx()).await.unwrap();

        assert_eq!(first, second);
        let total = |s: &DataStore| s.linkedin_metrics.iter().map(|m| m.impressions).sum::<u64>();
        assert_eq!(total(&first), total(&second));
    }

    #[tokio::test]
    async fn test_unreadable_file_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let ig = dir.path().join("instagram");
        fs::create_dir(&ig).unwrap();
        fs::write(ig.join("audience_insights.json"), "{ not json").unwrap();
        fs::write(
            ig.join("posts.json"),
            r#"[{"Date": "2025-01-02", "Impressions": "100", "Likes": "5", "Comments": "1", "Shares": "0"}]"#,
        )
        .unwrap();

        let store = ingestor(dir.path(), Platform::Instagram).load(&ctx()).await.unwrap();

        assert_eq!(store.instagram_metrics.len(), 1);
        assert!((store.instagram_metrics[0].engagement_rate - 0.06).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_competitors_loaded_with_linkedin() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("competitors.json"), r#"["Acme", "Globex"]"#).unwrap();

        let store = ingestor(dir.path(), Platform::LinkedIn).load(&ctx()).await.unwrap();
        assert_eq!(store.competitors, vec!["Acme", "Globex"]);

        let store = ingestor(dir.path(), Platform::Website).load(&ctx()).await.unwrap();
        assert!(store.competitors.is_empty());
    }

    #[test]
    fn test_preview_classifies_without_llm() {
        let dir = TempDir::new().unwrap();
        let web = dir.path().join("website");
        fs::create_dir(&web).unwrap();
        fs::write(web.join("blog_table.csv"), "Action date,Post views,Unique visitors\n23/12/2024,10,5\n").unwrap();
        fs::write(web.join("random.csv"), "a,b\n1,2\n").unwrap();

        let preview = ingestor(dir.path(), Platform::Website).preview();

        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].1, Some(FileKind::WebsiteBlog));
        assert_eq!(preview[1].1, None);
    }
}
