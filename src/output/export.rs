//! CSV exports of the ledger contents
//!
//! The failures export uses the configured id and label column names so the
//! file can be used directly as the input of a replay run.

use crate::output::OutputResult;
use crate::state::{ExtractionOutcome, FailureRecord, ResultRecord};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes one row per record, one column per extracted field
///
/// Returns the number of rows written.
pub fn export_results<W: Write>(
    records: &[ResultRecord],
    writer: W,
    id_column: &str,
    label_column: &str,
) -> OutputResult<usize> {
    let field_names: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| match &r.outcome {
            ExtractionOutcome::Success { fields, .. } => Some(fields),
            ExtractionOutcome::Failure { .. } => None,
        })
        .flat_map(|fields| fields.keys().map(String::as_str))
        .collect();

    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);

    let mut headers = vec![
        "position",
        id_column,
        label_column,
        "status",
        "attempts",
        "elapsed_ms",
        "finalized_at",
        "reason",
    ];
    headers.extend(field_names.iter().copied());
    csv_writer.write_record(&headers)?;

    for record in records {
        let mut row = vec![
            record.position.to_string(),
            record.item.id.clone(),
            record.item.label.clone(),
            record.outcome.to_db_string().to_string(),
            record.attempt_count.to_string(),
            record.outcome.elapsed_millis().to_string(),
            record.finalized_at.to_rfc3339(),
        ];

        match &record.outcome {
            ExtractionOutcome::Success { fields, .. } => {
                row.push(String::new());
                for name in &field_names {
                    row.push(fields.get(*name).cloned().unwrap_or_default());
                }
            }
            ExtractionOutcome::Failure { reason, .. } => {
                row.push(reason.clone());
                row.extend(field_names.iter().map(|_| String::new()));
            }
        }

        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(records.len())
}

/// Writes the replay file for pending failures
pub fn export_failures<W: Write>(
    failures: &[FailureRecord],
    writer: W,
    id_column: &str,
    label_column: &str,
) -> OutputResult<usize> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record([id_column, label_column, "reason", "attempts", "finalized_at"])?;

    for failure in failures {
        let attempts = failure.attempt_count.to_string();
        let finalized_at = failure.finalized_at.to_rfc3339();
        csv_writer.write_record([
            failure.item.id.as_str(),
            failure.item.label.as_str(),
            failure.reason.as_str(),
            attempts.as_str(),
            finalized_at.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(failures.len())
}

pub fn write_results_csv(
    records: &[ResultRecord],
    path: &Path,
    id_column: &str,
    label_column: &str,
) -> OutputResult<usize> {
    let file = File::create(path)?;
    export_results(records, file, id_column, label_column)
}

pub fn write_failures_csv(
    failures: &[FailureRecord],
    path: &Path,
    id_column: &str,
    label_column: &str,
) -> OutputResult<usize> {
    let file = File::create(path)?;
    export_failures(failures, file, id_column, label_column)
}
