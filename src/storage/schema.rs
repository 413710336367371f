//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the ledger database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    start_index INTEGER NOT NULL,
    total_items INTEGER NOT NULL
);

-- Append-only terminal results; the highest id per item_id wins
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    position INTEGER NOT NULL,
    item_id TEXT NOT NULL,
    label TEXT NOT NULL,
    status TEXT NOT NULL,
    fields_json TEXT,
    reason TEXT,
    elapsed_ms INTEGER NOT NULL,
    attempt_count INTEGER NOT NULL,
    finalized_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_item ON results(item_id);
CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id);

-- Exhausted items kept for replay
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    position INTEGER NOT NULL,
    item_id TEXT NOT NULL,
    label TEXT NOT NULL,
    reason TEXT NOT NULL,
    attempt_count INTEGER NOT NULL,
    finalized_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_item ON failures(item_id);

-- Resume cursors
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    cursor_index INTEGER NOT NULL,
    result_count INTEGER NOT NULL,
    written_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_run ON checkpoints(run_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
