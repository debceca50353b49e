//! Numeric analysis shared by the agents, reports, and KPI cards.

pub mod kpi;
pub mod stats;

pub use kpi::{platform_kpis, Kpi};
