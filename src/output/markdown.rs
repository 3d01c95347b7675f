//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of the harvest state,
//! including per-status counts, outstanding failures and unfinished codes.

use crate::output::{HarvestSummary, OutputResult};
use crate::state::ProgressStatus;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const MAX_LISTED_CODES: usize = 100;

/// Writes a markdown summary to `output_path`, creating parent directories
///
/// # Arguments
///
/// * `summary` - The harvest summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &HarvestSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a harvest summary as markdown
pub fn format_markdown_summary(summary: &HarvestSummary) -> String {
    let stats = &summary.statistics;
    let mut md = String::new();

    md.push_str("# Catalog Harvest Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!(
        "- **Generated**: {}\n",
        summary.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    md.push_str(&format!("- **State Backend**: {}\n", summary.backend));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Overall Statistics\n\n");
    if let Some(listed) = stats.listed_codes {
        md.push_str(&format!("- **Codes in Work List**: {}\n", listed));
    }
    md.push_str(&format!("- **Codes with Progress**: {}\n", stats.total_codes));
    md.push_str(&format!(
        "- **Codes with Failures**: {}\n",
        stats.codes_with_failures
    ));
    md.push_str(&format!(
        "- **Completion**: {:.2}%\n\n",
        stats.completion_rate()
    ));

    md.push_str("## Progress Status Breakdown\n\n");
    md.push_str("| Status | Codes |\n");
    md.push_str("|--------|-------|\n");
    for status in ProgressStatus::all_statuses() {
        md.push_str(&format!("| {} | {} |\n", status, stats.count(status)));
    }
    md.push('\n');

    if !summary.failures.is_empty() {
        md.push_str("## Outstanding Failures\n\n");
        md.push_str("| Code | Variant | Error | Last Seen |\n");
        md.push_str("|------|---------|-------|-----------|\n");
        for failure in &summary.failures {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                failure.code,
                failure.variant,
                escape_cell(&failure.error_message),
                failure.updated_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        md.push('\n');
    }

    if !stats.unfinished.is_empty() {
        md.push_str("## Unfinished Codes\n\n");
        md.push_str(&format!("Total: {}\n\n", stats.unfinished.len()));
        for code in stats.unfinished.iter().take(MAX_LISTED_CODES) {
            md.push_str(&format!("- {}\n", code));
        }
        if stats.unfinished.len() > MAX_LISTED_CODES {
            md.push_str(&format!(
                "\n... and {} more\n",
                stats.unfinished.len() - MAX_LISTED_CODES
            ));
        }
        md.push('\n');
    }

    md
}

/// Keeps an error message on one table row
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}
