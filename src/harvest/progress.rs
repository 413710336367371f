//! Run progress: result buffer, resume cursor and progress reporting
//!
//! Workers may finish items out of order. The cursor only advances over the
//! contiguous prefix of finalized positions, so a checkpoint never skips an
//! item that is still in flight.

use crate::state::{format_eta, ResultRecord, RunStats};
use std::collections::BTreeSet;

/// Records due for persistence plus the cursor they justify
#[derive(Debug)]
pub struct FlushBatch<'a> {
    pub records: &'a [ResultRecord],
    pub cursor_index: usize,
    pub result_count: u64,
}

#[derive(Debug)]
pub struct ProgressTracker {
    total_items: usize,
    cursor: usize,
    finalized_ahead: BTreeSet<usize>,
    buffer: Vec<ResultRecord>,
    persisted: u64,
    checkpoint_every: u64,
    progress_every: u64,
    target_hours: Option<f64>,
    stats: RunStats,
}

impl ProgressTracker {
    pub fn new(
        start_index: usize,
        total_items: usize,
        checkpoint_every: u64,
        progress_every: u64,
        target_hours: Option<f64>,
    ) -> Self {
        Self {
            total_items,
            cursor: start_index,
            finalized_ahead: BTreeSet::new(),
            buffer: Vec::new(),
            persisted: 0,
            checkpoint_every: checkpoint_every.max(1),
            progress_every: progress_every.max(1),
            target_hours,
            stats: RunStats::new(),
        }
    }

    /// Buffers a finalized record
    ///
    /// Returns true when the checkpoint cadence is due.
    pub fn finalize(&mut self, record: ResultRecord) -> bool {
        self.stats.record(record.is_success());

        self.finalized_ahead.insert(record.position);
        while self.finalized_ahead.remove(&self.cursor) {
            self.cursor += 1;
        }
        self.buffer.push(record);

        if self.stats.completed % self.progress_every == 0 {
            self.log_progress();
        }

        self.stats.completed % self.checkpoint_every == 0
    }

    /// Buffered records, kept until [`commit`](Self::commit) confirms them
    pub fn pending(&self) -> FlushBatch<'_> {
        FlushBatch {
            records: &self.buffer,
            cursor_index: self.cursor,
            result_count: self.persisted + self.buffer.len() as u64,
        }
    }

    /// Drops the first `stored` buffered records once the ledger holds them
    pub fn commit(&mut self, stored: usize) {
        let stored = stored.min(self.buffer.len());
        self.buffer.drain(..stored);
        self.persisted += stored as u64;
    }

    /// Records finalized but not yet stored
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn completed(&self) -> u64 {
        self.stats.completed
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Items from the cursor to the end of the list
    pub fn remaining(&self) -> u64 {
        self.total_items.saturating_sub(self.cursor) as u64
    }

    fn log_progress(&self) {
        let done = self.cursor;
        let percent = if self.total_items == 0 {
            100.0
        } else {
            done as f64 * 100.0 / self.total_items as f64
        };

        tracing::info!(
            "Progress: {}/{} ({:.1}%), success rate {:.1}%, {:.2} items/sec, ETA {}",
            done,
            self.total_items,
            percent,
            self.stats.success_rate() * 100.0,
            self.stats.throughput(),
            format_eta(self.stats.eta(self.remaining()))
        );

        if let Some(hours) = self.target_hours {
            let run_total = self.stats.completed + self.remaining();
            if let Some((current, target)) = self.stats.pace_shortfall(run_total, hours) {
                tracing::warn!(
                    "Behind the {}h target: {:.3} items/sec vs {:.3} needed",
                    hours,
                    current,
                    target
                );
            }
        }
    }
}
