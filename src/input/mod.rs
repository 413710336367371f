//! Work item loading
//!
//! Items come from a CSV file with a header row. The id and label columns are
//! looked up by name, so failure exports written by this crate can be fed
//! straight back in as the input of a replay run.

use crate::state::WorkItem;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Input loading errors
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to open input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input is missing the '{0}' column")]
    MissingColumn(String),
}

/// Loads work items from a CSV file
pub fn load_work_items(
    path: &Path,
    id_column: &str,
    label_column: &str,
) -> Result<Vec<WorkItem>, InputError> {
    let file = File::open(path)?;
    let items = read_work_items(file, id_column, label_column)?;
    tracing::info!("Loaded {} work items from {}", items.len(), path.display());
    Ok(items)
}

/// Reads work items from any CSV source
///
/// Rows with an empty id are skipped. A missing label becomes an empty
/// string. Duplicate ids are kept (each occurrence is its own position) but
/// logged.
pub fn read_work_items<R: Read>(
    reader: R,
    id_column: &str,
    label_column: &str,
) -> Result<Vec<WorkItem>, InputError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let id_idx = headers
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| InputError::MissingColumn(id_column.to_string()))?;
    let label_idx = headers.iter().position(|h| h == label_column);
    if label_idx.is_none() {
        tracing::warn!("Input has no '{}' column; labels will be empty", label_column);
    }

    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for row in rdr.records() {
        let row = row?;
        let id = row.get(id_idx).unwrap_or_default();
        if id.is_empty() {
            skipped += 1;
            continue;
        }

        let label = label_idx.and_then(|i| row.get(i)).unwrap_or_default();
        if !seen.insert(id.to_string()) {
            tracing::warn!("Duplicate work item id '{}'", id);
        }
        items.push(WorkItem::new(id, label));
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} rows without an id", skipped);
    }

    Ok(items)
}
