use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Ripple-Harvest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub source: SourceConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

/// Where a run starts in the work item list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawResumeFrom")]
pub enum ResumeFrom {
    /// Continue from the latest checkpoint in the ledger (or 0 without one)
    #[default]
    Auto,

    /// Start at an explicit index, ignoring any checkpoint
    Index(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResumeFrom {
    Index(usize),
    Keyword(String),
}

impl TryFrom<RawResumeFrom> for ResumeFrom {
    type Error = String;

    fn try_from(raw: RawResumeFrom) -> Result<Self, Self::Error> {
        match raw {
            RawResumeFrom::Index(index) => Ok(Self::Index(index)),
            RawResumeFrom::Keyword(word) if word.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            RawResumeFrom::Keyword(word) => Err(format!(
                "resume-from-index must be \"auto\" or a non-negative integer, got \"{}\"",
                word
            )),
        }
    }
}

/// Run cadences and orchestration limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,

    /// Recycle the session after this many processed items (0 = never)
    pub session_recycle_every: u64,

    /// Flush buffered results and write a checkpoint every N items
    pub checkpoint_every: u64,

    /// Log a progress line every N items
    pub progress_every: u64,

    /// Resume cursor selection
    pub resume_from_index: ResumeFrom,

    /// Stop after this many items past the resume point
    pub max_items: Option<usize>,

    /// Number of concurrent workers, each owning its own session
    pub workers: usize,

    /// Take a long cooldown pause every N items (0 = never)
    pub cooldown_every: u64,

    /// Cooldown pause range (seconds)
    pub cooldown_min_secs: f64,
    pub cooldown_max_secs: f64,

    /// Optional completion target used for pace warnings
    pub target_hours: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            session_recycle_every: 300,
            checkpoint_every: 25,
            progress_every: 25,
            resume_from_index: ResumeFrom::Auto,
            max_items: None,
            workers: 1,
            cooldown_every: 100,
            cooldown_min_secs: 60.0,
            cooldown_max_secs: 120.0,
            target_hours: None,
        }
    }
}

/// Adaptive inter-request delay policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PacingConfig {
    /// Base delay range (seconds)
    pub base_delay_min_secs: f64,
    pub base_delay_max_secs: f64,

    /// Below this success rate the range is widened
    pub low_threshold: f64,

    /// Above this success rate the range is narrowed
    pub high_threshold: f64,

    /// Multipliers applied to the base range when slowing down
    pub slow_down_min_factor: f64,
    pub slow_down_max_factor: f64,

    /// Multiplier applied to both bounds when speeding up
    pub speed_up_factor: f64,

    /// Trailing window of results for the success rate (0 = whole run)
    pub window: usize,

    /// Hard lower bound for any delay (seconds)
    pub floor_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay_min_secs: 2.0,
            base_delay_max_secs: 5.0,
            low_threshold: 0.8,
            high_threshold: 0.95,
            slow_down_min_factor: 1.5,
            slow_down_max_factor: 2.0,
            speed_up_factor: 0.8,
            window: 0,
            floor_secs: 0.0,
        }
    }
}

/// Backoff between retry attempts
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Backoff window before the first retry (seconds)
    pub backoff_min_secs: f64,
    pub backoff_max_secs: f64,

    /// Added to both bounds for every further retry (seconds)
    pub backoff_step_secs: f64,

    /// Field values starting with one of these mark a transient failure
    pub transient_markers: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_min_secs: 5.0,
            backoff_max_secs: 10.0,
            backoff_step_secs: 5.0,
            transient_markers: vec!["Error".to_string()],
        }
    }
}

/// Session lifecycle and transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Attempts to acquire a session before the run is aborted
    pub acquire_attempts: u32,

    /// Pause between failed acquisition attempts (seconds)
    pub acquire_backoff_secs: f64,

    /// Pause between releasing and re-acquiring during a recycle (seconds)
    pub recycle_pause_secs: f64,

    /// User agent sent by the HTTP session
    pub user_agent: String,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,

    /// Page requested once on acquire to establish cookies
    pub warmup_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            acquire_attempts: 3,
            acquire_backoff_secs: 5.0,
            recycle_pause_secs: 10.0,
            user_agent: format!("ripple-harvest/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            warmup_url: None,
        }
    }
}

/// Remote source description for the selector extractor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Item URL with an `{id}` placeholder
    pub url_template: String,

    /// Value stored when a field's selector matches nothing
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Fields to pull out of each item page
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template: String::new(),
            placeholder: default_placeholder(),
            fields: Vec::new(),
        }
    }
}

fn default_placeholder() -> String {
    "Not found".to_string()
}

/// One extracted field
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldRule {
    /// Field name in the result record
    pub name: String,

    /// CSS selector locating the element(s)
    pub selector: String,

    /// Read this attribute instead of the element text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Collect every match, one per line
    #[serde(default)]
    pub multiple: bool,
}

/// Work item list location
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputConfig {
    /// Path to the CSV file
    pub path: String,

    /// Column holding the item id
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column holding the display label
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            id_column: default_id_column(),
            label_column: default_label_column(),
        }
    }
}

fn default_id_column() -> String {
    "track_id".to_string()
}

fn default_label_column() -> String {
    "track_name".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite ledger
    pub database_path: String,
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

impl RunConfig {
    /// Maximum attempts per item
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// End of this run's slice of an item list of length `total`
    pub fn end_index(&self, start_index: usize, total: usize) -> usize {
        match self.max_items {
            Some(limit) => start_index.saturating_add(limit).min(total),
            None => total,
        }
    }

    /// Cooldown pause range as durations
    pub fn cooldown_range(&self) -> (Duration, Duration) {
        (secs(self.cooldown_min_secs), secs(self.cooldown_max_secs))
    }
}

impl RetryConfig {
    /// Backoff window before the given retry (1-based)
    pub fn backoff_window(&self, retry: u32) -> (Duration, Duration) {
        let extra = self.backoff_step_secs * f64::from(retry.saturating_sub(1));
        (
            secs(self.backoff_min_secs + extra),
            secs(self.backoff_max_secs + extra),
        )
    }
}

impl SessionConfig {
    pub fn acquire_backoff(&self) -> Duration {
        secs(self.acquire_backoff_secs)
    }

    pub fn recycle_pause(&self) -> Duration {
        secs(self.recycle_pause_secs)
    }
}
