use anyhow::Result;

use crate::db::models::CuratedPattern;
use crate::probe::ProbeReport;

pub fn format_report(report: &ProbeReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn format_patterns(patterns: &[CuratedPattern]) -> Result<String> {
    Ok(serde_json::to_string_pretty(patterns)?)
}
