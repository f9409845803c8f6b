//! Fixed-step clock
//!
//! Converts variable wall-clock frame deltas into a whole number of fixed
//! logic steps. Time is kept as `Duration` (integer nanoseconds), so the time
//! consumed by steps is always exactly `steps * step` and nothing drifts.
//!
//! Per frame: `begin_frame(delta)`, then `try_step()` until it returns false,
//! then `end_frame()`. When the step cap is hit with a full step or more still
//! pending, the whole backlog is dropped instead of carried into the next
//! frame, so a long stall can't snowball into ever longer frames.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Idle,
    /// Frame time added, no step taken yet
    Accumulating,
    /// At least one step taken this frame
    Stepping,
}

/// What happened during one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameReport {
    pub steps: u32,
    /// Backlog thrown away because the step cap was reached
    pub dropped: Duration,
    /// Leftover fraction of a step, for render interpolation
    pub alpha: f32,
}

#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step: Duration,
    max_steps: u32,
    accumulator: Duration,
    state: ClockState,
    steps_this_frame: u32,
    total_steps: u64,
    consumed: Duration,
    dropped: Duration,
}

impl FixedStepClock {
    /// A zero step is bumped to one nanosecond so the step loop always terminates.
    pub fn new(step: Duration, max_steps: u32) -> Self {
        Self {
            step: step.max(Duration::from_nanos(1)),
            max_steps,
            accumulator: Duration::ZERO,
            state: ClockState::Idle,
            steps_this_frame: 0,
            total_steps: 0,
            consumed: Duration::ZERO,
            dropped: Duration::ZERO,
        }
    }

    /// Add a frame's worth of wall-clock time. Negative, NaN and infinite deltas count as zero.
    pub fn begin_frame(&mut self, delta_secs: f64) {
        let delta = Duration::try_from_secs_f64(delta_secs).unwrap_or(Duration::ZERO);
        self.accumulator = self.accumulator.saturating_add(delta);
        self.steps_this_frame = 0;
        self.state = ClockState::Accumulating;
    }

    /// Consume one step if a full step is pending and the cap allows it.
    pub fn try_step(&mut self) -> bool {
        if self.state == ClockState::Idle
            || self.accumulator < self.step
            || self.steps_this_frame >= self.max_steps
        {
            return false;
        }
        self.accumulator -= self.step;
        self.steps_this_frame += 1;
        self.total_steps += 1;
        self.consumed += self.step;
        self.state = ClockState::Stepping;
        true
    }

    pub fn end_frame(&mut self) -> FrameReport {
        let mut dropped = Duration::ZERO;
        if self.steps_this_frame >= self.max_steps && self.accumulator >= self.step {
            dropped = std::mem::take(&mut self.accumulator);
            self.dropped += dropped;
        }
        self.state = ClockState::Idle;
        FrameReport {
            steps: self.steps_this_frame,
            dropped,
            alpha: self.alpha(),
        }
    }

    /// Throw away pending time (nothing to simulate)
    pub fn discard(&mut self) {
        self.accumulator = Duration::ZERO;
        self.steps_this_frame = 0;
        self.state = ClockState::Idle;
    }

    /// Pending time as a fraction of a step, in `[0, 1)` between frames
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.step.as_secs_f64()) as f32
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn step_secs(&self) -> f32 {
        self.step.as_secs_f32()
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn consumed(&self) -> Duration {
        self.consumed
    }

    pub fn dropped(&self) -> Duration {
        self.dropped
    }
}
