//! Report rendering: the executive run report and per-platform reports.

pub mod generator;
pub mod platform;

pub use generator::{generate_json_report, generate_markdown_report, ReportMetadata};
pub use platform::{PlatformReport, PlatformReportGenerator, ReportType};
