//! Progress animator
//!
//! Converts engine `(current_time, duration)` samples into the `[0, 1]`
//! ratio that drives the thin progress bar.
//!
//! Two strategies share one contract:
//! - `Sampled`: the ratio is the latest sample, taken on each tick.
//! - `Interpolated`: each start of playback anchors a linear run from the
//!   current ratio to 1 over the remaining wall-clock time; samples are
//!   only used to detect loop-wraps and seeks.
//!
//! Either way the ratio never decreases while playing continuously (loop
//! wraps excepted), never exceeds 1, and is 0 after `reset()`.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::ProgressStrategy;

/// What a sample did to the ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Normal forward progress (or no change)
    Advanced,
    /// Previous sample near the end, new one near the start
    LoopWrapped,
    /// Backward jump that is not a loop-wrap
    Seeked,
    /// Duration unknown or sample not a number
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    ratio: f64,
    at: Instant,
    remaining: Duration,
}

/// Per-cell progress state
#[derive(Debug)]
pub struct ProgressAnimator {
    strategy: ProgressStrategy,
    wrap_high: f64,
    wrap_low: f64,
    /// Last value handed out; floor for monotonicity
    ratio: f64,
    last_sample: Option<f64>,
    anchor: Option<Anchor>,
}

impl ProgressAnimator {
    pub fn new(strategy: ProgressStrategy, wrap_high: f64, wrap_low: f64) -> Self {
        Self {
            strategy,
            wrap_high,
            wrap_low,
            ratio: 0.0,
            last_sample: None,
            anchor: None,
        }
    }

    pub fn strategy(&self) -> ProgressStrategy {
        self.strategy
    }

    /// Playback (re)started at `current_time` of `duration`
    ///
    /// Never moves the displayed ratio backward; use `reset()` first for that.
    pub fn start(&mut self, current_time: f64, duration: f64, now: Instant) {
        let Some(sample) = to_ratio(current_time, duration) else {
            return;
        };
        self.last_sample = Some(sample);
        self.ratio = self.ratio.max(sample);
        if self.strategy == ProgressStrategy::Interpolated {
            self.anchor = Some(Anchor {
                ratio: sample,
                at: now,
                remaining: stance_common::time::secs_f64_to_duration(duration - current_time),
            });
        }
    }

    /// Playback paused: freeze the ratio where it is
    pub fn pause(&mut self, now: Instant) {
        self.ratio = self.ratio_at(now);
        self.anchor = None;
    }

    /// Back to 0 (deactivation)
    pub fn reset(&mut self) {
        self.ratio = 0.0;
        self.last_sample = None;
        self.anchor = None;
    }

    /// Feed one engine sample taken while playing
    pub fn sample(&mut self, current_time: f64, duration: f64, now: Instant) -> SampleOutcome {
        let Some(sample) = to_ratio(current_time, duration) else {
            return SampleOutcome::Ignored;
        };
        let previous = self.last_sample.replace(sample);

        if let Some(prev) = previous {
            if prev > self.wrap_high && sample < self.wrap_low {
                self.ratio = 0.0;
                self.anchor = None;
                if self.strategy == ProgressStrategy::Interpolated {
                    self.start(current_time, duration, now);
                    self.ratio = 0.0;
                    if let Some(anchor) = self.anchor.as_mut() {
                        anchor.ratio = 0.0;
                    }
                }
                return SampleOutcome::LoopWrapped;
            }
        }

        let current = self.ratio_at(now);
        match self.strategy {
            ProgressStrategy::Sampled => {
                if sample >= current {
                    self.ratio = sample;
                    SampleOutcome::Advanced
                } else {
                    self.ratio = sample;
                    SampleOutcome::Seeked
                }
            }
            ProgressStrategy::Interpolated => {
                if previous.is_some_and(|prev| sample < prev) {
                    // Re-anchor at the new position
                    self.ratio = 0.0;
                    self.start(current_time, duration, now);
                    SampleOutcome::Seeked
                } else {
                    if self.anchor.is_none() {
                        self.start(current_time, duration, now);
                        self.ratio = self.ratio.max(current);
                    }
                    SampleOutcome::Advanced
                }
            }
        }
    }

    /// Ratio to display at `now`
    pub fn ratio_at(&self, now: Instant) -> f64 {
        let value = match self.anchor {
            Some(anchor) if !anchor.remaining.is_zero() => {
                let elapsed = now.saturating_duration_since(anchor.at).as_secs_f64();
                let fraction = (elapsed / anchor.remaining.as_secs_f64()).min(1.0);
                anchor.ratio + (1.0 - anchor.ratio) * fraction
            }
            Some(_) => 1.0,
            None => self.ratio,
        };
        value.max(self.ratio).clamp(0.0, 1.0)
    }
}

fn to_ratio(current_time: f64, duration: f64) -> Option<f64> {
    if !(duration.is_finite() && duration > 0.0 && current_time.is_finite()) {
        return None;
    }
    Some((current_time / duration).clamp(0.0, 1.0))
}
