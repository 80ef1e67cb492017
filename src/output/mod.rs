pub mod json;
pub mod table;

use anyhow::Result;

use crate::db::models::CuratedPattern;
use crate::probe::ProbeReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn format_report(format: OutputFormat, report: &ProbeReport) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_report(report)),
        OutputFormat::Json => json::format_report(report),
    }
}

pub fn format_patterns(format: OutputFormat, patterns: &[CuratedPattern]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_patterns(patterns)),
        OutputFormat::Json => json::format_patterns(patterns),
    }
}
