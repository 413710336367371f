//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the Ledger trait.

use crate::state::{
    Checkpoint, ExtractionOutcome, FailureRecord, FieldMap, ResultRecord, WorkItem,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Ledger, LedgerError, LedgerResult};
use crate::storage::{LedgerCounts, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RESULT_COLUMNS: &str = "r.position, r.item_id, r.label, r.status, r.fields_json, r.reason,
     r.elapsed_ms, r.attempt_count, r.finalized_at";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, start_index, total_items";

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens or creates a ledger database at `path`
    pub fn new(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory ledger (for tests and dry runs)
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_results(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> LedgerResult<Vec<ResultRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, row_to_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn query_checkpoints(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> LedgerResult<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(sql)?;
        let checkpoints = stmt
            .query_map(params, row_to_checkpoint)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(checkpoints)
    }
}

impl Ledger for SqliteLedger {
    // ===== Run Management =====

    fn begin_run(
        &mut self,
        config_hash: &str,
        start_index: usize,
        total_items: usize,
    ) -> LedgerResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status, start_index, total_items)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now,
                config_hash,
                RunStatus::Running.to_db_string(),
                start_index as i64,
                total_items as i64
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> LedgerResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                row_to_run,
            )
            .optional()?
            .ok_or(LedgerError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> LedgerResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> LedgerResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Results =====

    fn append(&mut self, run_id: i64, records: &[ResultRecord]) -> LedgerResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut insert_result = tx.prepare(
                "INSERT INTO results (run_id, position, item_id, label, status, fields_json,
                 reason, elapsed_ms, attempt_count, finalized_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            let mut insert_failure = tx.prepare(
                "INSERT INTO failures (run_id, position, item_id, label, reason, attempt_count,
                 finalized_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                let finalized_at = record.finalized_at.to_rfc3339();
                let (fields_json, reason) = match &record.outcome {
                    ExtractionOutcome::Success { fields, .. } => {
                        let json = serde_json::to_string(fields)
                            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
                        (Some(json), None)
                    }
                    ExtractionOutcome::Failure { reason, .. } => (None, Some(reason.as_str())),
                };

                insert_result.execute(params![
                    run_id,
                    record.position as i64,
                    record.item.id,
                    record.item.label,
                    record.outcome.to_db_string(),
                    fields_json,
                    reason,
                    record.outcome.elapsed_millis() as i64,
                    record.attempt_count,
                    finalized_at
                ])?;

                if let Some(reason) = reason {
                    insert_failure.execute(params![
                        run_id,
                        record.position as i64,
                        record.item.id,
                        record.item.label,
                        reason,
                        record.attempt_count,
                        finalized_at
                    ])?;
                }
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn latest_results(&self) -> LedgerResult<Vec<ResultRecord>> {
        self.query_results(
            &format!(
                "SELECT {}
                 FROM results r
                 JOIN (SELECT item_id, MAX(id) AS max_id FROM results GROUP BY item_id) latest
                   ON latest.max_id = r.id
                 ORDER BY r.position, r.id",
                RESULT_COLUMNS
            ),
            [],
        )
    }

    fn results_for_run(&self, run_id: i64) -> LedgerResult<Vec<ResultRecord>> {
        self.query_results(
            &format!(
                "SELECT {} FROM results r WHERE r.run_id = ?1 ORDER BY r.id",
                RESULT_COLUMNS
            ),
            params![run_id],
        )
    }

    fn pending_failures(&self) -> LedgerResult<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.position, f.item_id, f.label, f.reason, f.attempt_count, f.finalized_at
             FROM failures f
             JOIN (SELECT item_id, MAX(id) AS max_id FROM failures GROUP BY item_id) lf
               ON lf.max_id = f.id
             JOIN (SELECT item_id, MAX(id) AS max_id FROM results GROUP BY item_id) lr
               ON lr.item_id = f.item_id
             JOIN results r ON r.id = lr.max_id
             WHERE r.status = 'failure'
             ORDER BY f.position, f.id",
        )?;

        let failures = stmt
            .query_map([], |row| {
                Ok(FailureRecord {
                    position: get_position(row, 0)?,
                    item: WorkItem::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                    reason: row.get(3)?,
                    attempt_count: row.get(4)?,
                    finalized_at: get_timestamp(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failures)
    }

    // ===== Checkpoints =====

    fn checkpoint(
        &mut self,
        run_id: i64,
        cursor_index: usize,
        result_count: u64,
    ) -> LedgerResult<Checkpoint> {
        let checkpoint = Checkpoint::new(cursor_index, result_count);
        self.conn.execute(
            "INSERT INTO checkpoints (run_id, cursor_index, result_count, written_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                cursor_index as i64,
                result_count as i64,
                checkpoint.written_at.to_rfc3339()
            ],
        )?;
        Ok(checkpoint)
    }

    fn load_latest(&self) -> LedgerResult<Option<Checkpoint>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT cursor_index, result_count, written_at
                 FROM checkpoints ORDER BY id DESC LIMIT 1",
                [],
                row_to_checkpoint,
            )
            .optional()?;
        Ok(checkpoint)
    }

    fn checkpoints_for_run(&self, run_id: i64) -> LedgerResult<Vec<Checkpoint>> {
        self.query_checkpoints(
            "SELECT cursor_index, result_count, written_at
             FROM checkpoints WHERE run_id = ?1 ORDER BY id",
            params![run_id],
        )
    }

    // ===== Statistics =====

    fn counts(&self) -> LedgerResult<LedgerCounts> {
        let total_records: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;

        let (unique_items, succeeded): (i64, Option<i64>) = self.conn.query_row(
            "SELECT COUNT(*), SUM(CASE WHEN r.status = 'success' THEN 1 ELSE 0 END)
             FROM results r
             JOIN (SELECT item_id, MAX(id) AS max_id FROM results GROUP BY item_id) latest
               ON latest.max_id = r.id",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let succeeded = succeeded.unwrap_or(0);

        Ok(LedgerCounts {
            total_records: total_records as u64,
            unique_items: unique_items as u64,
            succeeded: succeeded as u64,
            failed: (unique_items - succeeded) as u64,
        })
    }
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: get_run_status(row, 4)?,
        start_index: get_position(row, 5)?,
        total_items: get_position(row, 6)?,
    })
}

fn row_to_result(row: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    let status: String = row.get(3)?;
    let elapsed_millis = row.get::<_, i64>(6)?.max(0) as u64;

    let outcome = if status == "success" {
        let json: Option<String> = row.get(4)?;
        let fields: FieldMap = match json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            None => FieldMap::new(),
        };
        ExtractionOutcome::Success {
            fields,
            elapsed_millis,
        }
    } else {
        ExtractionOutcome::Failure {
            reason: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            elapsed_millis,
        }
    };

    Ok(ResultRecord {
        position: get_position(row, 0)?,
        item: WorkItem::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        outcome,
        attempt_count: row.get(7)?,
        finalized_at: get_timestamp(row, 8)?,
    })
}

fn row_to_checkpoint(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        cursor_index: get_position(row, 0)?,
        result_count: row.get::<_, i64>(1)?.max(0) as u64,
        written_at: get_timestamp(row, 2)?,
    })
}

fn get_run_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<RunStatus> {
    let text: String = row.get(idx)?;
    RunStatus::from_db_string(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown run status '{}'", text).into(),
        )
    })
}

fn get_position(row: &Row<'_>, idx: usize) -> rusqlite::Result<usize> {
    let value: i64 = row.get(idx)?;
    usize::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
