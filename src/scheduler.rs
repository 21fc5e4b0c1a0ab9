//! Adaptive sampling scheduler
//!
//! Reconciles the interrupt tick count against the number of completed main
//! loop passes and retunes the tick source so sampling neither falls behind
//! nor leaves throughput on the table.
//!
//! ## Slowing down
//!
//! The backlog (`tick_count - completed_count`) is measured at the start of
//! every pass. When it exceeds the hysteresis budget the rate is halved and
//! the remaining backlog is dropped instead of being caught up.
//!
//! ## Speeding up
//!
//! After each pass the achievable rate is estimated from the pass duration.
//! Only a streak of `loops_before_adjust` favourable passes doubles the rate,
//! so a single quick pass never causes oscillation.

use log::{debug, info, warn};

use crate::config::RecorderConfig;
use crate::error::CommandError;
use crate::tick::{TickCounter, TickSource};

/// Outcome of a frequency change request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrequencyChange {
    /// Out of bounds or already active; nothing happened.
    Unchanged,
    /// The tick source confirmed the new rate.
    Applied(f32),
    /// The tick source refused the rate. The scheduler still adopts it so the
    /// next adjustment steps on from there; the timer keeps its old period.
    Rejected(f32),
}

/// What the scheduler decided at the end of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Steady,
    SlowedDown(FrequencyChange),
    SpedUp(FrequencyChange),
}

/// One claimed tick. Returned by [`AdaptiveScheduler::begin_pass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    /// Backlog observed before this pass claimed its tick
    pub behind: u32,
}

pub struct AdaptiveScheduler<'t, T> {
    ticks: &'t TickCounter,
    source: T,
    config: RecorderConfig,
    target_hz: f32,
    /// Last requested rate, 0.0 before the first request
    current_hz: f32,
    loops_before_adjust: u32,
    completed: u32,
    speedup_streak: u32,
    running: bool,
}

impl<'t, T: TickSource> AdaptiveScheduler<'t, T> {
    pub fn new(ticks: &'t TickCounter, source: T, config: RecorderConfig) -> Self {
        Self {
            ticks,
            source,
            target_hz: config.target_frequency_hz,
            current_hz: 0.0,
            loops_before_adjust: config.min_loops_before_adjust,
            completed: ticks.count(),
            speedup_streak: 0,
            running: false,
            config,
        }
    }

    pub fn tick_count(&self) -> u32 {
        self.ticks.count()
    }

    pub fn completed_count(&self) -> u32 {
        self.completed
    }

    /// Ticks fired but not yet matched by a completed pass.
    pub fn behind_count(&self) -> u32 {
        self.ticks.count().wrapping_sub(self.completed)
    }

    pub fn current_frequency(&self) -> f32 {
        self.current_hz
    }

    pub fn target_frequency(&self) -> f32 {
        self.target_hz
    }

    pub fn min_frequency(&self) -> f32 {
        self.config.min_frequency_hz
    }

    pub fn idle_frequency(&self) -> f32 {
        self.config.idle_frequency_hz
    }

    pub fn loops_before_adjust(&self) -> u32 {
        self.loops_before_adjust
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn tick_source(&self) -> &T {
        &self.source
    }

    pub fn tick_source_mut(&mut self) -> &mut T {
        &mut self.source
    }

    /// Hysteresis budget for a given rate: proportional to a fixed
    /// wall-clock window above 10 Hz, flat at or below it.
    pub fn budget_for(&self, frequency_hz: f32) -> u32 {
        let floor = self.config.min_loops_before_adjust;
        if frequency_hz > 10.0 {
            let loops = libm::roundf(self.config.seconds_before_adjust * frequency_hz) as u32;
            loops.max(floor)
        } else {
            floor
        }
    }

    /// Ask the tick source for a new rate within `[min_frequency, target_frequency]`.
    ///
    /// Any attempt adopts the rate and resynchronizes `completed_count` to
    /// `tick_count`, since the backlog measured at the old rate says nothing
    /// about the new one. Only a confirmed rate recomputes the budget.
    pub fn set_frequency(&mut self, frequency_hz: f32) -> FrequencyChange {
        let in_bounds =
            self.config.min_frequency_hz <= frequency_hz && frequency_hz <= self.target_hz;
        if !in_bounds || frequency_hz == self.current_hz {
            debug!(
                "Frequency {} Hz ignored (current {} Hz, bounds [{}, {}])",
                frequency_hz, self.current_hz, self.config.min_frequency_hz, self.target_hz
            );
            return FrequencyChange::Unchanged;
        }

        let change = if self.source.configure(frequency_hz) {
            self.loops_before_adjust = self.budget_for(frequency_hz);
            info!(
                "Sampling at {} Hz (adjust after {} loops)",
                frequency_hz, self.loops_before_adjust
            );
            FrequencyChange::Applied(frequency_hz)
        } else {
            warn!("Tick source rejected {} Hz", frequency_hz);
            FrequencyChange::Rejected(frequency_hz)
        };

        self.current_hz = frequency_hz;
        self.resync();
        self.speedup_streak = 0;
        change
    }

    /// Set the operator's requested rate and switch to it right away.
    pub fn set_target_frequency(
        &mut self,
        frequency_hz: f32,
    ) -> Result<FrequencyChange, CommandError> {
        if !frequency_hz.is_finite() || frequency_hz < self.config.min_frequency_hz {
            return Err(CommandError::FrequencyOutOfRange {
                requested: frequency_hz,
                min: self.config.min_frequency_hz,
                max: f32::INFINITY,
            });
        }
        self.target_hz = frequency_hz;
        Ok(self.set_frequency(frequency_hz))
    }

    /// Drop any backlog.
    pub fn resync(&mut self) {
        self.completed = self.ticks.count();
    }

    /// Leave exactly one pending tick so the next pass runs immediately.
    pub fn prime(&mut self) {
        self.completed = self.ticks.count().wrapping_sub(1);
    }

    pub fn start(&mut self) -> FrequencyChange {
        self.running = true;
        self.set_frequency(self.target_hz)
    }

    pub fn stop(&mut self) -> FrequencyChange {
        self.running = false;
        self.enter_idle()
    }

    /// Make sure the idle rate is active.
    pub fn enter_idle(&mut self) -> FrequencyChange {
        if self.current_hz == self.config.idle_frequency_hz {
            return FrequencyChange::Unchanged;
        }
        self.set_frequency(self.config.idle_frequency_hz)
    }

    /// Claim one pending tick, or `None` if the tick source has not fired
    /// since the last pass.
    pub fn begin_pass(&mut self) -> Option<Pass> {
        let behind = self.behind_count();
        if behind == 0 {
            return None;
        }
        self.completed = self.completed.wrapping_add(1);
        Some(Pass { behind })
    }

    /// Judge backlog and slack of a finished recording pass.
    pub fn finish_pass(&mut self, pass: Pass, pass_duration_us: u64) -> Adjustment {
        let mut adjustment = Adjustment::Steady;

        if pass.behind > self.loops_before_adjust {
            let halved = (self.current_hz / 2.0).max(self.config.min_frequency_hz);
            debug!(
                "Behind by {} loops (budget {}), slowing down",
                pass.behind, self.loops_before_adjust
            );
            adjustment = Adjustment::SlowedDown(self.set_frequency(halved));
            self.resync();
        }

        let achievable_hz = 1_000_000 / (pass_duration_us + self.config.speedup_epsilon_us);
        let doubled = self.current_hz * 2.0;
        if achievable_hz as f32 > doubled && doubled <= self.target_hz {
            self.speedup_streak += 1;
            if self.speedup_streak >= self.loops_before_adjust {
                adjustment = Adjustment::SpedUp(self.set_frequency(doubled));
            }
        } else {
            self.speedup_streak = 0;
        }

        adjustment
    }
}
