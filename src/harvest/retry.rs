//! Bounded retry with backoff around one extraction
//!
//! # Retry Logic
//!
//! | Outcome | Action |
//! |---------|--------|
//! | `Failure` | Retry after backoff |
//! | `ExtractionError` | Treated as `Failure` |
//! | `Success` flagged by the classifier | Retry after backoff |
//! | any other `Success` | Return immediately |
//!
//! At most `max_retries + 1` attempts are made. The backoff window before
//! retry `n` is `[backoff-min + (n-1) * step, backoff-max + (n-1) * step]`.
//! Cancellation is checked while waiting between attempts.

use crate::config::RetryConfig;
use crate::extractor::Extractor;
use crate::harvest::pacing::random_between;
use crate::session::Session;
use crate::state::{ExtractionOutcome, WorkItem};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Whether an outcome should be attempted again
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Final,
    Retry { reason: String },
}

/// Decides which outcomes are transient
pub trait RetryClassifier: Send + Sync {
    fn classify(&self, outcome: &ExtractionOutcome) -> Verdict;
}

/// Default classifier
///
/// Every `Failure` is retried. A `Success` is retried when one of its field
/// values starts with a configured marker (e.g. an `"Error: ..."` string the
/// extractor stored instead of real data).
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl MarkerClassifier {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl RetryClassifier for MarkerClassifier {
    fn classify(&self, outcome: &ExtractionOutcome) -> Verdict {
        match outcome {
            ExtractionOutcome::Failure { reason, .. } => Verdict::Retry {
                reason: reason.clone(),
            },
            ExtractionOutcome::Success { fields, .. } => {
                for (name, value) in fields {
                    let value = value.trim_start();
                    if self.markers.iter().any(|m| value.starts_with(m.as_str())) {
                        return Verdict::Retry {
                            reason: format!("transient value in '{}': {}", name, value),
                        };
                    }
                }
                Verdict::Final
            }
        }
    }
}

/// How an attempt sequence ended
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptReport {
    /// The sequence terminated; the outcome is ready to record
    Finished {
        outcome: ExtractionOutcome,
        attempt_count: u32,
    },

    /// Cancellation arrived between attempts; nothing is recorded
    Cancelled { attempt_count: u32 },
}

/// Runs extraction attempts for one item
pub struct RetryController {
    max_retries: u32,
    config: RetryConfig,
    classifier: Arc<dyn RetryClassifier>,
}

impl RetryController {
    pub fn new(max_retries: u32, config: RetryConfig) -> Self {
        let classifier = Arc::new(MarkerClassifier::new(config.transient_markers.clone()));
        Self {
            max_retries,
            config,
            classifier,
        }
    }

    /// Replaces the default classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before the given retry (1-based)
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let (min, max) = self.config.backoff_window(retry);
        random_between(min, max)
    }

    /// Attempts `item` until it succeeds, attempts run out or `cancel` fires
    pub async fn attempt<S, E>(
        &self,
        extractor: &E,
        session: &mut S,
        item: &WorkItem,
        cancel: &CancellationToken,
    ) -> AttemptReport
    where
        S: Session,
        E: Extractor<S> + ?Sized,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let started = Instant::now();
            let outcome = match extractor.extract(session, item).await {
                Ok(outcome) => outcome,
                Err(e) => ExtractionOutcome::failure(
                    e.to_string(),
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                ),
            };

            let reason = match self.classifier.classify(&outcome) {
                Verdict::Final => {
                    return AttemptReport::Finished {
                        outcome,
                        attempt_count: attempt,
                    }
                }
                Verdict::Retry { reason } => reason,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    item,
                    attempt,
                    reason
                );
                return AttemptReport::Finished {
                    outcome: ExtractionOutcome::failure(
                        format!("{} (after {} attempts)", reason, attempt),
                        outcome.elapsed_millis(),
                    ),
                    attempt_count: attempt,
                };
            }

            let delay = self.backoff_delay(attempt);
            tracing::info!(
                "Attempt {}/{} for {} failed ({}), retrying in {:.1}s",
                attempt,
                max_attempts,
                item,
                reason,
                delay.as_secs_f64()
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return AttemptReport::Cancelled { attempt_count: attempt };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
