//! Report serialization.
//!
//! Markdown, JSON and CSV are produced here; PDF lives in `pdf`.

use super::{flatten_data, pdf, ExportFormat, Report, Section};
use anyhow::{Context, Result};
use std::path::Path;

/// Serialize `report` in `format`.
pub fn export(report: &Report, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Pdf => Ok(pdf::render(report)),
        ExportFormat::Csv => generate_csv_report(report).map(String::into_bytes),
        ExportFormat::Json => generate_json_report(report).map(String::into_bytes),
        ExportFormat::Markdown => Ok(generate_markdown_report(report).into_bytes()),
    }
}

/// Write the exported report to `path`.
pub async fn write_report(report: &Report, format: ExportFormat, path: &Path) -> Result<()> {
    let bytes = export(report, format)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", report.title));
    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_table_of_contents(report));

    for section in &report.sections {
        output.push_str(&generate_section_block(section));
    }

    output.push_str(&generate_footer());
    output
}

fn generate_metadata_section(report: &Report) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Template:** `{}`\n", report.template));
    section.push_str(&format!(
        "- **Framework:** {}\n",
        report
            .framework
            .map(|f| f.to_string())
            .unwrap_or_else(|| "All".to_string())
    ));
    section.push_str(&format!(
        "- **Period:** {} to {}\n",
        report.period.start.format("%Y-%m-%d"),
        report.period.end.format("%Y-%m-%d")
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push('\n');

    section
}

fn anchor(title: &str) -> String {
    title.replace([' ', '/', '.', '(', ')'], "-").to_lowercase()
}

fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    for section in &report.sections {
        toc.push_str(&format!("- [{}](#{})\n", section.title, anchor(&section.title)));
    }
    toc.push('\n');

    toc
}

fn generate_section_block(section: &Section) -> String {
    let mut block = String::new();

    block.push_str(&format!("## {}\n\n", section.title));
    if !section.content.is_empty() {
        block.push_str(&section.content);
        block.push_str("\n\n");
    }

    let rows = flatten_data(&section.data);
    if !rows.is_empty() {
        block.push_str("| Key | Value |\n");
        block.push_str("|:---|:---|\n");
        for (key, value) in rows {
            block.push_str(&format!("| {} | {} |\n", key, value.replace('|', "\\|")));
        }
        block.push('\n');
    }

    block
}

fn generate_footer() -> String {
    "---\n\n*Report generated by complianceiq*\n".to_string()
}

/// Generate a pretty-printed JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a CSV report.
///
/// A metadata block of `Field,Value` rows comes first, then a blank line,
/// then `Section,Key,Value` rows. Every field is quoted.
pub fn generate_csv_report(report: &Report) -> Result<String> {
    let mut meta = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(vec![]);

    meta.write_record(["Field", "Value"])?;
    meta.write_record(["Title", report.title.as_str()])?;
    meta.write_record(["Template", report.template.key()])?;
    meta.write_record([
        "Framework".to_string(),
        report
            .framework
            .map(|f| f.to_string())
            .unwrap_or_else(|| "All".to_string()),
    ])?;
    meta.write_record(["Generated At".to_string(), report.generated_at.to_rfc3339()])?;
    meta.write_record(["Period Start".to_string(), report.period.start.to_rfc3339()])?;
    meta.write_record(["Period End".to_string(), report.period.end.to_rfc3339()])?;

    let mut rows = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(vec![]);

    rows.write_record(["Section", "Key", "Value"])?;
    for section in &report.sections {
        rows.write_record([section.title.as_str(), "content", section.content.as_str()])?;
        for (key, value) in flatten_data(&section.data) {
            rows.write_record([section.title.as_str(), key.as_str(), value.as_str()])?;
        }
    }

    let mut out = meta
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush CSV metadata")?;
    out.push(b'\n');
    out.extend(
        rows.into_inner()
            .map_err(|e| e.into_error())
            .context("Failed to flush CSV rows")?,
    );

    String::from_utf8(out).context("CSV output is not valid UTF-8")
}
