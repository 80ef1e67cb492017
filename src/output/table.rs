use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::db::models::CuratedPattern;
use crate::probe::ProbeReport;

const FROM_WIDTH: usize = 32;
const SUBJECT_WIDTH: usize = 48;
const DATE_WIDTH: usize = 10;
const PLATFORM_WIDTH: usize = 12;
const PATTERN_WIDTH: usize = 36;

pub fn format_report(report: &ProbeReport) -> String {
    let stats = &report.stats;
    let mut out = format!(
        "Query: {}\nFound {} · processed {} · newsletters {} · failed {} · {} patterns\n",
        report.query,
        stats.total_found,
        stats.processed,
        stats.newsletters_found,
        stats.failed,
        stats.patterns_checked
    );

    if report.messages.is_empty() && report.failures.is_empty() {
        out.push_str("No messages in window.\n");
        return out;
    }

    out.push('\n');
    out.push_str(&format!(
        "{:<from$}  {:<subject$}  {:<date$}  {:<platform$}\n",
        "From",
        "Subject",
        "Date",
        "Newsletter",
        from = FROM_WIDTH,
        subject = SUBJECT_WIDTH,
        date = DATE_WIDTH,
        platform = PLATFORM_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}  {}\n",
        "-".repeat(FROM_WIDTH),
        "-".repeat(SUBJECT_WIDTH),
        "-".repeat(DATE_WIDTH),
        "-".repeat(PLATFORM_WIDTH)
    ));

    for message in &report.messages {
        let subject = if message.subject.is_empty() {
            "(no subject)"
        } else {
            message.subject.as_str()
        };
        let newsletter = if message.is_newsletter {
            message.platform.as_deref().unwrap_or("yes")
        } else {
            "-"
        };

        out.push_str(&format!(
            "{}  {}  {}  {}\n",
            pad(&message.email, FROM_WIDTH),
            pad(subject, SUBJECT_WIDTH),
            pad(&relative_date(&message.date, report.ran_at), DATE_WIDTH),
            truncate_for_width(newsletter, PLATFORM_WIDTH)
        ));
    }

    if !report.failures.is_empty() {
        out.push_str("\nSkipped:\n");
        for failure in &report.failures {
            out.push_str(&format!("  {}: {}\n", failure.message_id, failure.reason));
        }
    }

    out
}

pub fn format_patterns(patterns: &[CuratedPattern]) -> String {
    if patterns.is_empty() {
        return "No curated patterns.".to_string();
    }

    let mut out = format!(
        "{:>4}  {:<pattern$}  {:<6}  {}\n",
        "ID",
        "Pattern",
        "Active",
        "Name",
        pattern = PATTERN_WIDTH
    );
    for row in patterns {
        out.push_str(&format!(
            "{:>4}  {}  {:<6}  {}\n",
            row.id,
            pad(&row.pattern, PATTERN_WIDTH),
            if row.is_active { "yes" } else { "no" },
            row.display_name.as_deref().unwrap_or("-")
        ));
    }
    out
}

/// Gmail `Date` headers are RFC 2822; anything unparseable is shown verbatim.
fn relative_date(input: &str, now: DateTime<Utc>) -> String {
    let parsed = match DateTime::parse_from_rfc2822(input.trim()) {
        Ok(value) => value.with_timezone(&Utc),
        Err(_) => return input.to_string(),
    };

    let delta = now.signed_duration_since(parsed);
    if delta.num_seconds() < 0 {
        return "in future".to_string();
    }
    if delta.num_minutes() < 1 {
        return "just now".to_string();
    }
    if delta.num_hours() < 1 {
        return format!("{}m ago", delta.num_minutes());
    }
    if delta.num_hours() < 24 {
        return format!("{}h ago", delta.num_hours());
    }
    parsed.format("%Y-%m-%d").to_string()
}

fn pad(value: &str, width: usize) -> String {
    let truncated = truncate_for_width(value, width);
    let used = UnicodeWidthStr::width(truncated.as_str());
    format!("{truncated}{}", " ".repeat(width.saturating_sub(used)))
}

fn truncate_for_width(value: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(value) <= max_width {
        return value.to_string();
    }

    if max_width <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for c in value.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        out.push(c);
        width += cw;
    }
    out.push('…');
    out
}
