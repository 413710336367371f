//! Adaptive inter-request pacing
//!
//! The delay between items is drawn uniformly from a range that depends on
//! the rolling success rate:
//!
//! | Success rate | Range |
//! |--------------|-------|
//! | below `low-threshold` | `[min * slow-down-min-factor, max * slow-down-max-factor]` |
//! | above `high-threshold` | `[min * speed-up-factor, max * speed-up-factor]` |
//! | otherwise | `[min, max]` |
//!
//! Every bound is clamped to `floor-secs`.

use crate::config::PacingConfig;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;

/// Which delay range is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceBand {
    SlowDown,
    Base,
    SpeedUp,
}

/// Tracks the rolling success rate and derives the next delay
#[derive(Debug)]
pub struct RateController {
    config: PacingConfig,
    window: VecDeque<bool>,
    total: u64,
    succeeded: u64,
}

impl RateController {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            total: 0,
            succeeded: 0,
        }
    }

    /// Records one finalized item
    pub fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.succeeded += 1;
        }

        if self.config.window > 0 {
            if self.window.len() == self.config.window {
                self.window.pop_front();
            }
            self.window.push_back(success);
        }
    }

    /// Success rate over the trailing window, or the whole run without one
    ///
    /// Before any result the rate is 1.0 so the first delays use the fast band.
    pub fn rolling_success_rate(&self) -> f64 {
        if self.config.window > 0 {
            if self.window.is_empty() {
                return 1.0;
            }
            let ok = self.window.iter().filter(|s| **s).count();
            ok as f64 / self.window.len() as f64
        } else if self.total == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    pub fn band(&self, rate: f64) -> PaceBand {
        if rate < self.config.low_threshold {
            PaceBand::SlowDown
        } else if rate > self.config.high_threshold {
            PaceBand::SpeedUp
        } else {
            PaceBand::Base
        }
    }

    /// Active delay range for a given success rate
    pub fn delay_range(&self, rate: f64) -> (Duration, Duration) {
        let c = &self.config;
        let (min, max) = match self.band(rate) {
            PaceBand::SlowDown => (
                c.base_delay_min_secs * c.slow_down_min_factor,
                c.base_delay_max_secs * c.slow_down_max_factor,
            ),
            PaceBand::SpeedUp => (
                c.base_delay_min_secs * c.speed_up_factor,
                c.base_delay_max_secs * c.speed_up_factor,
            ),
            PaceBand::Base => (c.base_delay_min_secs, c.base_delay_max_secs),
        };

        let floor = c.floor_secs.max(0.0);
        let min = min.max(floor);
        let max = max.max(min);
        (Duration::from_secs_f64(min), Duration::from_secs_f64(max))
    }

    /// Draws the next delay for a given success rate
    pub fn next_delay(&self, rate: f64) -> Duration {
        let (min, max) = self.delay_range(rate);
        random_between(min, max)
    }

    /// Draws the next delay from the current rolling rate
    pub fn current_delay(&self) -> Duration {
        self.next_delay(self.rolling_success_rate())
    }
}

/// Uniform draw from `[min, max]`
pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}
