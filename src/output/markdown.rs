//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of the latest
//! harvest run, including progress, outcome counts and failure reasons.

use crate::output::{OutputResult, RunSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary to `output_path`
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Ripple-Harvest Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} hours)\n",
            duration,
            duration as f64 / 3600.0
        ));
    }
    md.push_str(&format!("- **Status**: {}\n", summary.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Progress
    md.push_str("## Progress\n\n");
    md.push_str(&format!("- **Total Items**: {}\n", summary.total_items));
    md.push_str(&format!("- **Started At Index**: {}\n", summary.start_index));
    match summary.cursor_index {
        Some(cursor) => md.push_str(&format!(
            "- **Resume Cursor**: {} ({:.1}% of the list)\n\n",
            cursor,
            summary.coverage()
        )),
        None => md.push_str("- **Resume Cursor**: none\n\n"),
    }

    // This run
    md.push_str("## This Run\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Records | {} |\n", summary.run_records));
    md.push_str(&format!("| Succeeded | {} |\n", summary.run_succeeded));
    md.push_str(&format!("| Failed | {} |\n", summary.run_failed));
    md.push_str(&format!(
        "\n**Success Rate**: {:.2}%\n\n",
        summary.success_rate()
    ));

    // Whole ledger
    md.push_str("## Ledger Totals\n\n");
    md.push_str(&format!(
        "- **Items With Results**: {}\n",
        summary.ledger.unique_items
    ));
    md.push_str(&format!("- **Succeeded**: {}\n", summary.ledger.succeeded));
    md.push_str(&format!("- **Failed**: {}\n", summary.ledger.failed));
    md.push_str(&format!(
        "- **Records Written**: {}\n",
        summary.ledger.total_records
    ));
    md.push_str(&format!(
        "- **Pending Replay**: {}\n\n",
        summary.pending_failures
    ));

    if !summary.top_failure_reasons.is_empty() {
        md.push_str("## Failure Reasons\n\n");
        md.push_str("| Reason | Items |\n");
        md.push_str("|--------|-------|\n");
        for (reason, count) in &summary.top_failure_reasons {
            md.push_str(&format!("| {} | {} |\n", reason.replace('|', "\\|"), count));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str("*Generated by Ripple-Harvest*\n");

    md
}
