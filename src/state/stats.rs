use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Counters for the current run, reset on every start
///
/// Used to derive the success rate, throughput and ETA reported on the
/// progress cadence. Never persisted.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            completed: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    /// Records one finalized item
    pub fn record(&mut self, success: bool) {
        self.completed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Fraction of finalized items that succeeded (0 before any result)
    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.completed as f64
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Items per second since the run started
    pub fn throughput(&self) -> f64 {
        throughput(self.completed, self.elapsed())
    }

    /// Estimated time to finish `remaining` items at the observed rate
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        eta(remaining, self.throughput())
    }

    /// Compares the observed rate against a completion target
    ///
    /// Returns `Some((current, target))` items/second when the run has been
    /// going for at least 30 minutes and is more than 20% behind.
    pub fn pace_shortfall(&self, total_items: u64, target_hours: f64) -> Option<(f64, f64)> {
        pace_shortfall(self.completed, self.elapsed(), total_items, target_hours)
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

fn throughput(completed: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        completed as f64 / secs
    }
}

fn eta(remaining: u64, rate: f64) -> Option<Duration> {
    if rate <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / rate))
}

fn pace_shortfall(
    completed: u64,
    elapsed: Duration,
    total_items: u64,
    target_hours: f64,
) -> Option<(f64, f64)> {
    if elapsed < Duration::from_secs(30 * 60) || target_hours <= 0.0 {
        return None;
    }
    let target = total_items as f64 / (target_hours * 3600.0);
    let current = throughput(completed, elapsed);
    (current < target * 0.8).then_some((current, target))
}

/// Formats an ETA as `"Xh Ym"`, or `"Unknown"` without one
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => {
            let secs = d.as_secs();
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
        None => "Unknown".to_string(),
    }
}
