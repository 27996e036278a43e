//! Frame scheduling
//!
//! The scheduler decides, once per display refresh, whether the session may
//! call `infer`. It is the only caller, so it alone enforces one call in flight
//! and strictly increasing timestamps. The loop is self-paced: the next
//! refresh is only taken after the previous inference and render complete.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::camera::{Frame, VideoSink};
use crate::error::PipelineError;
use crate::result::InferenceResult;

/// Scheduler lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    WaitingForFirstFrame,
    Looping,
    Stopped,
}

/// Decision for one refresh callback.
#[derive(Debug)]
pub enum Admission {
    /// The scheduler has stopped; do nothing.
    Stopped,
    /// No open model or no video data yet.
    Waiting,
    /// This tick is skipped and retried on the next one.
    Skip,
    /// Run inference on this frame.
    Infer(Frame),
}

/// What to do with a finished inference.
#[derive(Debug)]
pub enum Completion {
    Render(InferenceResult),
    Skip,
    Stop,
}

/// Frame counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Frames handed to `infer`
    pub submitted: u64,
    /// Results drawn
    pub rendered: u64,
    /// Ticks skipped (frame not ready, stale timestamp, failed inference)
    pub skipped: u64,
}

/// Per-frame inference state machine.
#[derive(Debug)]
pub struct FrameScheduler {
    state: SchedulerState,
    last_timestamp: Option<f64>,
    stats: SchedulerStats,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::WaitingForFirstFrame,
            last_timestamp: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Last timestamp passed to `infer`.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Gate one refresh callback.
    pub fn admit(&mut self, timestamp_ms: f64, sink: &VideoSink, model_open: bool) -> Admission {
        match self.state {
            SchedulerState::Stopped => return Admission::Stopped,
            SchedulerState::WaitingForFirstFrame => {
                if !model_open || !sink.has_data() {
                    return Admission::Waiting;
                }
                log::info!("First frame received, starting inference loop");
                self.state = SchedulerState::Looping;
            }
            SchedulerState::Looping => {
                if !model_open {
                    return Admission::Waiting;
                }
            }
        }

        let Some(frame) = sink.current_frame() else {
            return Admission::Waiting;
        };

        let dims = frame.dims();
        if dims.is_empty() {
            let err = PipelineError::Frame {
                width: dims.width,
                height: dims.height,
            };
            log::debug!("Skipping tick: {}", err);
            self.stats.skipped += 1;
            return Admission::Skip;
        }

        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                log::warn!(
                    "Skipping tick: timestamp {:.3} is not after {:.3}",
                    timestamp_ms,
                    last
                );
                self.stats.skipped += 1;
                return Admission::Skip;
            }
        }

        self.last_timestamp = Some(timestamp_ms);
        self.stats.submitted += 1;
        Admission::Infer(frame.clone())
    }

    /// Classify a finished inference.
    ///
    /// A result that arrives after `stop()` is discarded.
    pub fn complete(&mut self, outcome: Result<InferenceResult, PipelineError>) -> Completion {
        if self.state == SchedulerState::Stopped {
            return Completion::Stop;
        }

        match outcome {
            Ok(result) => {
                self.stats.rendered += 1;
                Completion::Render(result)
            }
            Err(PipelineError::Closed) => {
                log::debug!("Model handle closed, stopping frame loop");
                self.stop();
                Completion::Stop
            }
            Err(err) => {
                log::warn!("Skipping tick: {}", err);
                self.stats.skipped += 1;
                Completion::Skip
            }
        }
    }

    /// Enter `Stopped`. Idempotent.
    pub fn stop(&mut self) {
        if self.state != SchedulerState::Stopped {
            log::debug!(
                "Frame loop stopped ({} submitted, {} rendered, {} skipped)",
                self.stats.submitted,
                self.stats.rendered,
                self.stats.skipped
            );
            self.state = SchedulerState::Stopped;
        }
    }
}

/// Source of display refresh callbacks.
pub trait RefreshClock {
    /// Wait for the next refresh and return its timestamp in milliseconds.
    fn next_frame(&mut self) -> impl Future<Output = f64> + Send;
}

/// Refresh clock ticking at a fixed rate.
///
/// Timestamps are milliseconds since the clock was created and strictly
/// increase. A late tick is delayed rather than bursted, so a slow model lowers
/// the effective frame rate.
pub struct IntervalClock {
    interval: Interval,
    origin: Instant,
    last: f64,
}

impl IntervalClock {
    /// Must be called from within a tokio runtime.
    pub fn new(hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            origin: Instant::now(),
            last: f64::NEG_INFINITY,
        }
    }
}

impl RefreshClock for IntervalClock {
    async fn next_frame(&mut self) -> f64 {
        let tick = self.interval.tick().await;
        let mut timestamp = tick.saturating_duration_since(self.origin).as_secs_f64() * 1000.0;
        if timestamp <= self.last {
            timestamp = self.last + 0.001;
        }
        self.last = timestamp;
        timestamp
    }
}
