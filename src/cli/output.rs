//! Summary and configuration output for CLI commands

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::bootstrap::BootstrapSummary;
use crate::config::BootstrapConfig;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a horizontal separator line
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = *width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    print_separator(total_width.saturating_sub(1));
}

const SUMMARY_COLUMNS: [(&str, usize); 4] =
    [("PIPELINE", 10), ("KIND", 16), ("RESOURCE", 36), ("OUTCOME", 40)];

/// Rows of the per-resource summary table
pub fn summary_rows(summary: &BootstrapSummary) -> Vec<[String; 4]> {
    summary
        .reports
        .iter()
        .flat_map(|report| {
            report.records().iter().map(move |record| {
                let resource = match record.descriptor.scope() {
                    Some(scope) => format!("{}/{}", scope, record.descriptor.key()),
                    None => record.descriptor.key().to_string(),
                };
                [
                    report.pipeline().to_string(),
                    record.descriptor.kind().to_string(),
                    resource,
                    record.outcome.to_string(),
                ]
            })
        })
        .collect()
}

/// Print the per-resource outcome of a run
pub fn print_summary(summary: &BootstrapSummary, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&summary.reports);
    }

    print_table_header(&SUMMARY_COLUMNS);
    for row in summary_rows(summary) {
        let mut line = String::new();
        for (value, (_, width)) in row.iter().zip(SUMMARY_COLUMNS.iter()) {
            line.push_str(&format!("{:<width$} ", truncate(value, *width), width = *width));
        }
        println!("{}", line.trim_end());
    }
    println!();

    if let Some((stage, error)) = &summary.fatal {
        println!("{} pipeline aborted ({}): {}", stage, error.category(), error);
    } else {
        let created: usize = summary.reports.iter().map(|r| r.created_count()).sum();
        println!(
            "{} resource(s) created, {} failed",
            created,
            summary.failed_resources()
        );
    }
    Ok(())
}

/// Print the loaded configuration with secrets redacted
pub fn print_config(config: &BootstrapConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Table => {
            print_table_header(&[("STAGE", 10), ("STATUS", 12)]);
            let sections = [
                ("database", config.database.is_some()),
                ("identity", config.identity.is_some()),
                ("secrets", config.secrets.is_some()),
            ];
            for (stage, loaded) in sections {
                let status = if loaded { "valid" } else { "not loaded" };
                println!("{:<10} {}", stage, status);
            }
            Ok(())
        }
    }
}
