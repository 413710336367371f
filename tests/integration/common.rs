//! Shared fixtures: in-process sessions, scripted extractors and fast configs

use async_trait::async_trait;
use ripple_harvest::config::{
    Config, FieldRule, InputConfig, OutputConfig, PacingConfig, RetryConfig, RunConfig,
    SessionConfig, SourceConfig,
};
use ripple_harvest::extractor::{ExtractionError, Extractor};
use ripple_harvest::session::{Session, SessionError, SessionFactory};
use ripple_harvest::state::{
    Checkpoint, ExtractionOutcome, FailureRecord, FieldMap, ResultRecord, WorkItem,
};
use ripple_harvest::storage::{
    Ledger, LedgerCounts, LedgerError, LedgerResult, RunRecord, RunStatus, SqliteLedger,
};
use ripple_harvest::Orchestrator;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct MockSession {
    id: u64,
    released: Arc<AtomicU64>,
    done: bool,
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> u64 {
        self.id
    }

    async fn release(&mut self) {
        if !self.done {
            self.done = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_released(&self) -> bool {
        self.done
    }
}

/// Session factory that counts acquisitions and can stop handing out sessions
pub struct MockFactory {
    pub acquired: AtomicU64,
    pub released: Arc<AtomicU64>,
    limit: Option<u64>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            acquired: AtomicU64::new(0),
            released: Arc::new(AtomicU64::new(0)),
            limit: None,
        }
    }

    /// Fails every acquisition after the first `limit` successful ones
    pub fn with_limit(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    type Session = MockSession;

    async fn acquire(&self) -> Result<MockSession, SessionError> {
        let id = self.acquired.load(Ordering::SeqCst);
        if self.limit.is_some_and(|limit| id >= limit) {
            return Err(SessionError::Init("remote refused the session".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            id,
            released: self.released.clone(),
            done: false,
        })
    }
}

type Behavior = dyn Fn(&WorkItem) -> Result<ExtractionOutcome, ExtractionError> + Send + Sync;

/// Extractor driven by a closure
pub struct MockExtractor {
    behavior: Box<Behavior>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new(
        behavior: impl Fn(&WorkItem) -> Result<ExtractionOutcome, ExtractionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            behavior: Box::new(behavior),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always succeeds with fields derived from the item
    pub fn succeeding() -> Self {
        Self::new(|item| Ok(success_for(item)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor<MockSession> for MockExtractor {
    async fn extract(
        &self,
        session: &mut MockSession,
        item: &WorkItem,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        if session.is_released() {
            return Err(ExtractionError::SessionClosed);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        (self.behavior)(item)
    }
}

/// Deterministic successful outcome for an item
pub fn success_for(item: &WorkItem) -> ExtractionOutcome {
    let mut fields = FieldMap::new();
    fields.insert("title".to_string(), item.label.clone());
    fields.insert(
        "cover_image_url".to_string(),
        format!("https://img.example.com/{}.jpg", item.id),
    );
    ExtractionOutcome::success(fields, 5)
}

pub fn items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| WorkItem::new(i.to_string(), format!("Track {}", i)))
        .collect()
}

/// Config with every pause set to zero
pub fn fast_config() -> Config {
    Config {
        run: RunConfig {
            max_retries: 3,
            session_recycle_every: 0,
            checkpoint_every: 25,
            progress_every: 25,
            cooldown_every: 0,
            ..RunConfig::default()
        },
        pacing: PacingConfig {
            base_delay_min_secs: 0.0,
            base_delay_max_secs: 0.0,
            ..PacingConfig::default()
        },
        retry: RetryConfig {
            backoff_min_secs: 0.0,
            backoff_max_secs: 0.0,
            backoff_step_secs: 0.0,
            ..RetryConfig::default()
        },
        session: SessionConfig {
            acquire_attempts: 1,
            acquire_backoff_secs: 0.0,
            recycle_pause_secs: 0.0,
            ..SessionConfig::default()
        },
        source: SourceConfig {
            url_template: "http://127.0.0.1/track/{id}".to_string(),
            fields: vec![FieldRule {
                name: "title".to_string(),
                selector: "h1".to_string(),
                attribute: None,
                multiple: false,
            }],
            ..SourceConfig::default()
        },
        input: InputConfig {
            path: "tracks.csv".to_string(),
            ..InputConfig::default()
        },
        output: OutputConfig {
            database_path: ":memory:".to_string(),
        },
    }
}

pub type MockOrchestrator = Orchestrator<MockFactory, MockExtractor, SqliteLedger>;

pub fn shared_ledger() -> Arc<Mutex<SqliteLedger>> {
    Arc::new(Mutex::new(SqliteLedger::in_memory().unwrap()))
}

pub fn orchestrator(
    config: Config,
    factory: &Arc<MockFactory>,
    extractor: &Arc<MockExtractor>,
    ledger: &Arc<Mutex<SqliteLedger>>,
) -> MockOrchestrator {
    Orchestrator::new(
        config,
        "test-config",
        factory.clone(),
        extractor.clone(),
        ledger.clone(),
    )
}

/// Ledger whose first `failures` appends fail
pub struct FlakyLedger {
    inner: SqliteLedger,
    failures: usize,
    appends: usize,
}

impl FlakyLedger {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: SqliteLedger::in_memory().unwrap(),
            failures,
            appends: 0,
        }
    }

    /// Append calls seen so far, failed ones included
    pub fn appends(&self) -> usize {
        self.appends
    }
}

impl Ledger for FlakyLedger {
    fn begin_run(
        &mut self,
        config_hash: &str,
        start_index: usize,
        total_items: usize,
    ) -> LedgerResult<i64> {
        self.inner.begin_run(config_hash, start_index, total_items)
    }

    fn get_run(&self, run_id: i64) -> LedgerResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn get_latest_run(&self) -> LedgerResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> LedgerResult<()> {
        self.inner.finish_run(run_id, status)
    }

    fn append(&mut self, run_id: i64, records: &[ResultRecord]) -> LedgerResult<()> {
        self.appends += 1;
        if self.appends <= self.failures {
            return Err(LedgerError::Unavailable("disk full".to_string()));
        }
        self.inner.append(run_id, records)
    }

    fn latest_results(&self) -> LedgerResult<Vec<ResultRecord>> {
        self.inner.latest_results()
    }

    fn results_for_run(&self, run_id: i64) -> LedgerResult<Vec<ResultRecord>> {
        self.inner.results_for_run(run_id)
    }

    fn pending_failures(&self) -> LedgerResult<Vec<FailureRecord>> {
        self.inner.pending_failures()
    }

    fn checkpoint(
        &mut self,
        run_id: i64,
        cursor_index: usize,
        result_count: u64,
    ) -> LedgerResult<Checkpoint> {
        self.inner.checkpoint(run_id, cursor_index, result_count)
    }

    fn load_latest(&self) -> LedgerResult<Option<Checkpoint>> {
        self.inner.load_latest()
    }

    fn checkpoints_for_run(&self, run_id: i64) -> LedgerResult<Vec<Checkpoint>> {
        self.inner.checkpoints_for_run(run_id)
    }

    fn counts(&self) -> LedgerResult<LedgerCounts> {
        self.inner.counts()
    }
}

pub fn flaky_orchestrator(
    config: Config,
    factory: &Arc<MockFactory>,
    extractor: &Arc<MockExtractor>,
    ledger: &Arc<Mutex<FlakyLedger>>,
) -> Orchestrator<MockFactory, MockExtractor, FlakyLedger> {
    Orchestrator::new(
        config,
        "test-config",
        factory.clone(),
        extractor.clone(),
        ledger.clone(),
    )
}
