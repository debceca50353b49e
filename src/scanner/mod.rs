//! Source file scanner for platform export directories.
//!
//! Enumerates the candidate export files of one platform, respecting the
//! platform's file extensions, hidden-file exclusion, and a size limit.
//! Results are sorted so repeated runs see files in the same order.

use crate::config::IngestionConfig;
use crate::models::Platform;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include, lowercase and without the dot.
    pub extensions: Vec<String>,
    /// Maximum file size in bytes.
    pub max_file_size: u64,
    /// How deep below the platform directory to look.
    pub max_depth: usize,
}

impl ScanConfig {
    /// Defaults for a platform: CSV for LinkedIn and Website, JSON for Instagram.
    pub fn for_platform(platform: Platform) -> Self {
        let extensions = match platform {
            Platform::LinkedIn | Platform::Website => vec!["csv".to_string()],
            Platform::Instagram => vec!["json".to_string()],
        };
        Self {
            extensions,
            max_file_size: 20 * 1024 * 1024,
            max_depth: 2,
        }
    }

    pub fn from_config(platform: Platform, config: &IngestionConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            ..Self::for_platform(platform)
        }
    }
}

/// Scanned file information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// File name without directories.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
}

/// Scanner over one platform directory.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Scan for all matching files.
    ///
    /// A missing directory is not an error; it yields no files.
    pub fn scan(&self) -> Vec<ScannedFile> {
        if !self.root.is_dir() {
            debug!("Directory does not exist: {}", self.root.display());
            return Vec::new();
        }

        let mut files: Vec<ScannedFile> = WalkDir::new(&self.root)
            .max_depth(self.config.max_depth)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Cannot read entry under {}: {}", self.root.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.to_scanned(entry.path()))
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Check if a file matches scan criteria.
    pub fn matches(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config.extensions.contains(&ext)
    }

    fn to_scanned(&self, path: &Path) -> Option<ScannedFile> {
        if !self.matches(path) {
            return None;
        }

        let size = match path.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                return None;
            }
        };

        if size > self.config.max_file_size {
            warn!(
                "Skipping {} ({} bytes exceeds limit of {})",
                path.display(),
                size,
                self.config.max_file_size
            );
            return None;
        }

        Some(ScannedFile {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size,
        })
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
