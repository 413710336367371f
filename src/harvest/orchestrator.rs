//! Run orchestrator - drives a harvest from the resume point to the end
//!
//! # Lifecycle
//!
//! 1. **Starting** - resolve the resume cursor, record the run, write the
//!    initial checkpoint, apply the `max-items` cap, acquire one session per
//!    worker
//! 2. **Running** - workers pull item indices from a shared counter; each item
//!    goes through the retry controller, its record is buffered, pacing is
//!    updated and the checkpoint, recycle and cooldown cadences fire
//! 3. **Completed / Interrupted / FatalError** - final flush and checkpoint,
//!    sessions released, run status written
//!
//! Cancellation is cooperative. An extraction that is already running is
//! allowed to finish; the token is checked between items, while sleeping and
//! between retry attempts.

use crate::config::{Config, ResumeFrom};
use crate::extractor::Extractor;
use crate::harvest::pacing::{random_between, RateController};
use crate::harvest::progress::ProgressTracker;
use crate::harvest::retry::{AttemptReport, RetryClassifier, RetryController};
use crate::session::{SessionError, SessionFactory, SessionManager};
use crate::state::{Checkpoint, ResultRecord, RunState, WorkItem};
use crate::storage::{Ledger, LedgerError, LedgerResult, RunStatus};
use crate::HarvestError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_state: RunState,

    /// Ledger id of the run, `None` if it never got recorded
    pub run_id: Option<i64>,

    pub start_index: usize,

    /// Resume cursor after the final checkpoint
    pub cursor_index: usize,

    pub total_items: usize,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,

    /// Sessions acquired across all workers, recycles included
    pub session_acquisitions: u64,

    pub elapsed: Duration,

    /// What made the run fatal
    pub error: Option<String>,
}

impl RunReport {
    fn new(total_items: usize) -> Self {
        Self {
            final_state: RunState::Starting,
            run_id: None,
            start_index: 0,
            cursor_index: 0,
            total_items,
            completed: 0,
            succeeded: 0,
            failed: 0,
            session_acquisitions: 0,
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.final_state.exit_code()
    }

    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.completed as f64
        }
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.completed as f64 / secs
        }
    }
}

/// Drives a harvest run
pub struct Orchestrator<F, E, L> {
    config: Arc<Config>,
    config_hash: String,
    factory: Arc<F>,
    extractor: Arc<E>,
    ledger: Arc<Mutex<L>>,
    retry: Arc<RetryController>,
    cancel: CancellationToken,
}

impl<F, E, L> Orchestrator<F, E, L>
where
    F: SessionFactory + 'static,
    E: Extractor<F::Session> + 'static,
    L: Ledger + Send + 'static,
{
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        factory: Arc<F>,
        extractor: Arc<E>,
        ledger: Arc<Mutex<L>>,
    ) -> Self {
        let retry = RetryController::new(config.run.max_retries, config.retry.clone());
        Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            factory,
            extractor,
            ledger,
            retry: Arc::new(retry),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses a custom retry classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        let retry = RetryController::new(self.config.run.max_retries, self.config.retry.clone())
            .with_classifier(classifier);
        self.retry = Arc::new(retry);
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ledger(&self) -> Arc<Mutex<L>> {
        self.ledger.clone()
    }

    /// Runs the harvest over `items` and reports how it ended
    ///
    /// Fatal conditions do not surface as `Err`; they end the run in
    /// [`RunState::FatalError`] with the cause in [`RunReport::error`].
    pub async fn run(&self, mut items: Vec<WorkItem>) -> RunReport {
        let started = Instant::now();
        let total = items.len();
        let mut report = RunReport::new(total);
        let mut state = RunState::Starting;

        // ===== Starting =====

        let (run_id, start_index) = match self.start(total) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!("Could not start run: {}", e);
                advance(&mut state, RunState::FatalError);
                report.final_state = state;
                report.error = Some(e.to_string());
                report.elapsed = started.elapsed();
                return report;
            }
        };
        report.run_id = Some(run_id);
        report.start_index = start_index;
        report.cursor_index = start_index;

        let end = self.config.run.end_index(start_index, total);
        if end < total {
            tracing::info!("Run capped at {} items, stopping at index {}", end - start_index, end);
            items.truncate(end);
        }

        let remaining = end - start_index;
        let workers = self.config.run.workers.min(remaining);
        tracing::info!(
            "Run {} starting at index {} of {} with {} worker(s)",
            run_id,
            start_index,
            total,
            workers
        );

        let mut managers = Vec::with_capacity(workers);
        for worker in 0..workers {
            let mut manager =
                SessionManager::new(self.factory.clone(), &self.config.session, worker);
            let acquired = manager.acquire(&self.cancel).await;
            managers.push(manager);

            if let Err(e) = acquired {
                for manager in &mut managers {
                    manager.release().await;
                }
                report.session_acquisitions = managers.iter().map(|m| m.acquisitions()).sum();
                let next = if matches!(e, SessionError::Cancelled) {
                    RunState::Interrupted
                } else {
                    tracing::error!("Session acquisition failed: {}", e);
                    report.error = Some(e.to_string());
                    RunState::FatalError
                };
                advance(&mut state, next);
                self.finish(run_id, state);
                report.final_state = state;
                report.elapsed = started.elapsed();
                return report;
            }
        }

        // ===== Running =====

        advance(&mut state, RunState::Running);

        let run = &self.config.run;
        let ctx = Arc::new(WorkerContext {
            config: self.config.clone(),
            run_id,
            items: Arc::new(items),
            next: AtomicUsize::new(start_index),
            tracker: Mutex::new(ProgressTracker::new(
                start_index,
                end,
                run.checkpoint_every,
                run.progress_every,
                run.target_hours,
            )),
            pacing: Mutex::new(RateController::new(self.config.pacing.clone())),
            ledger: self.ledger.clone(),
            retry: self.retry.clone(),
            extractor: self.extractor.clone(),
            stop: self.cancel.child_token(),
        });

        let mut tasks = JoinSet::new();
        for (worker, manager) in managers.into_iter().enumerate() {
            tasks.spawn(run_worker(ctx.clone(), manager, worker));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(summary) => {
                    report.session_acquisitions += summary.acquisitions;
                    if let Err(e) = summary.result {
                        report.error.get_or_insert_with(|| e.to_string());
                    }
                }
                Err(e) => {
                    ctx.stop.cancel();
                    let e = HarvestError::Worker(e.to_string());
                    tracing::error!("{}", e);
                    report.error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        // ===== Terminal =====

        let mut tracker = lock(&ctx.tracker);
        let next = if report.error.is_some() {
            RunState::FatalError
        } else if tracker.cursor() >= end {
            RunState::Completed
        } else {
            RunState::Interrupted
        };

        match ctx.flush(&mut tracker) {
            Ok(checkpoint) => report.cursor_index = checkpoint.cursor_index,
            Err(e) => {
                tracing::error!("Final flush failed: {}", e);
                report.error.get_or_insert_with(|| e.to_string());
            }
        }

        let next = if report.error.is_some() {
            RunState::FatalError
        } else {
            next
        };
        advance(&mut state, next);
        self.finish(run_id, state);

        let stats = tracker.stats();
        report.final_state = state;
        report.completed = stats.completed;
        report.succeeded = stats.succeeded;
        report.failed = stats.failed;
        report.elapsed = started.elapsed();

        tracing::info!(
            "Run {} {}: {} items ({} succeeded, {} failed), success rate {:.1}%, {:.2} items/sec, elapsed {:.1}s",
            run_id,
            state,
            report.completed,
            report.succeeded,
            report.failed,
            report.success_rate() * 100.0,
            report.throughput(),
            report.elapsed.as_secs_f64()
        );

        report
    }

    /// Resolves the resume cursor, records the run and writes the initial checkpoint
    fn start(&self, total: usize) -> LedgerResult<(i64, usize)> {
        let mut ledger = lock_ledger(&self.ledger)?;

        if let Some(previous) = ledger.get_latest_run()? {
            if previous.config_hash != self.config_hash {
                tracing::warn!(
                    "Configuration changed since run {}; resuming with the new settings",
                    previous.id
                );
            }
        }

        let requested = match self.config.run.resume_from_index {
            ResumeFrom::Auto => match ledger.load_latest()? {
                Some(checkpoint) => {
                    tracing::info!("Resuming from checkpoint at index {}", checkpoint.cursor_index);
                    checkpoint.cursor_index
                }
                None => 0,
            },
            ResumeFrom::Index(index) => {
                tracing::info!("Starting at configured index {}", index);
                index
            }
        };

        let start_index = if requested > total {
            tracing::warn!(
                "Resume index {} is past the end of the list ({} items)",
                requested,
                total
            );
            total
        } else {
            requested
        };

        let run_id = ledger.begin_run(&self.config_hash, start_index, total)?;
        ledger.checkpoint(run_id, start_index, 0)?;
        Ok((run_id, start_index))
    }

    fn finish(&self, run_id: i64, state: RunState) {
        let status = match state {
            RunState::Completed => RunStatus::Completed,
            RunState::Interrupted => RunStatus::Interrupted,
            _ => RunStatus::Failed,
        };

        let result = lock_ledger(&self.ledger).and_then(|mut l| l.finish_run(run_id, status));
        if let Err(e) = result {
            tracing::error!("Failed to mark run {} as {}: {}", run_id, state, e);
        }
    }
}

/// State shared by all workers of a run
struct WorkerContext<E, L> {
    config: Arc<Config>,
    run_id: i64,
    items: Arc<Vec<WorkItem>>,
    next: AtomicUsize,
    tracker: Mutex<ProgressTracker>,
    pacing: Mutex<RateController>,
    ledger: Arc<Mutex<L>>,
    retry: Arc<RetryController>,
    extractor: Arc<E>,
    stop: CancellationToken,
}

impl<E, L: Ledger> WorkerContext<E, L> {
    /// Buffers a record, flushing when the checkpoint cadence is due
    ///
    /// Returns the number of items completed so far in this run.
    fn record(&self, record: ResultRecord) -> LedgerResult<u64> {
        let mut tracker = lock(&self.tracker);
        let due = tracker.finalize(record);
        let completed = tracker.completed();
        if due {
            self.flush(&mut tracker)?;
        }
        Ok(completed)
    }

    /// Appends the buffered records and writes a checkpoint
    ///
    /// Runs under the tracker lock so checkpoints land in cursor order. A
    /// failed append leaves the records buffered and the checkpoint untouched.
    fn flush(&self, tracker: &mut ProgressTracker) -> LedgerResult<Checkpoint> {
        let mut ledger = lock_ledger(&self.ledger)?;

        let batch = tracker.pending();
        let (cursor_index, result_count) = (batch.cursor_index, batch.result_count);
        let records = batch.records;
        retry_once("append", || ledger.append(self.run_id, records))?;
        let stored = records.len();
        tracker.commit(stored);

        let checkpoint = retry_once("checkpoint", || {
            ledger.checkpoint(self.run_id, cursor_index, result_count)
        })?;

        tracing::debug!(
            "Checkpoint at index {} ({} records this run)",
            checkpoint.cursor_index,
            checkpoint.result_count
        );
        Ok(checkpoint)
    }

    /// Sleeps unless stopped; returns false when the run should stop
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.stop.is_cancelled();
        }
        tokio::select! {
            _ = self.stop.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

struct WorkerSummary {
    acquisitions: u64,
    result: Result<(), HarvestError>,
}

async fn run_worker<F, E, L>(
    ctx: Arc<WorkerContext<E, L>>,
    mut sessions: SessionManager<F>,
    worker: usize,
) -> WorkerSummary
where
    F: SessionFactory + 'static,
    E: Extractor<F::Session> + 'static,
    L: Ledger + Send + 'static,
{
    let result = work(&ctx, &mut sessions, worker).await;
    if let Err(e) = &result {
        tracing::error!("Worker {} stopped: {}", worker, e);
        ctx.stop.cancel();
    }

    sessions.release().await;

    WorkerSummary {
        acquisitions: sessions.acquisitions(),
        result,
    }
}

async fn work<F, E, L>(
    ctx: &WorkerContext<E, L>,
    sessions: &mut SessionManager<F>,
    worker: usize,
) -> Result<(), HarvestError>
where
    F: SessionFactory + 'static,
    E: Extractor<F::Session> + 'static,
    L: Ledger + Send + 'static,
{
    let run = &ctx.config.run;
    let mut processed: u64 = 0;

    loop {
        if ctx.stop.is_cancelled() {
            tracing::info!("Worker {} stopping", worker);
            break;
        }

        let index = ctx.next.fetch_add(1, Ordering::SeqCst);
        let Some(item) = ctx.items.get(index) else {
            break;
        };

        let session = sessions.session_mut()?;
        let report = ctx
            .retry
            .attempt(ctx.extractor.as_ref(), session, item, &ctx.stop)
            .await;

        let (outcome, attempt_count) = match report {
            AttemptReport::Finished {
                outcome,
                attempt_count,
            } => (outcome, attempt_count),
            AttemptReport::Cancelled { attempt_count } => {
                tracing::info!(
                    "Worker {} stopped while retrying {} after {} attempt(s)",
                    worker,
                    item,
                    attempt_count
                );
                break;
            }
        };

        let record = ResultRecord::new(item.clone(), index, outcome, attempt_count);
        let success = record.is_success();
        if !success {
            tracing::debug!("Item {} failed after {} attempt(s)", item, attempt_count);
        }

        let delay = {
            let mut pacing = lock(&ctx.pacing);
            pacing.record(success);
            pacing.current_delay()
        };

        let completed = ctx.record(record)?;
        processed += 1;

        if run.session_recycle_every > 0 && processed % run.session_recycle_every == 0 {
            match sessions.recycle(&ctx.stop).await {
                Ok(()) => {}
                Err(SessionError::Cancelled) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if ctx.next.load(Ordering::SeqCst) >= ctx.items.len() {
            continue;
        }

        if !ctx.pause(delay).await {
            continue;
        }

        if run.cooldown_every > 0 && completed % run.cooldown_every == 0 {
            let (min, max) = run.cooldown_range();
            let cooldown = random_between(min, max);
            tracing::info!(
                "Cooling down for {:.0}s after {} items",
                cooldown.as_secs_f64(),
                completed
            );
            ctx.pause(cooldown).await;
        }
    }

    Ok(())
}

fn advance(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {} -> {}",
        state,
        next
    );
    tracing::debug!("Run state {} -> {}", state, next);
    *state = next;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_ledger<L>(ledger: &Mutex<L>) -> LedgerResult<MutexGuard<'_, L>> {
    ledger
        .lock()
        .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))
}

fn retry_once<T>(what: &str, mut op: impl FnMut() -> LedgerResult<T>) -> LedgerResult<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!("Ledger {} failed, retrying once: {}", what, e);
            op()
        }
    }
}
