//! Fixed-rate game clock for Bombforge.
//!
//! One [`GameClock`] drives the whole server. It interleaves two cadences:
//!
//! - **ticks** at a fixed rate (default 60 Hz), each of which runs one
//!   simulation step over every room
//! - **sweeps** at a much slower interval (default 30 s), which evict idle
//!   players and empty rooms
//!
//! # Integration
//!
//! ```ignore
//! let mut clock = GameClock::new(ClockConfig::default());
//! loop {
//!     match clock.next().await {
//!         ClockEvent::Tick(info) => {
//!             engine.tick(info.at);
//!             clock.record_tick_end();
//!         }
//!         ClockEvent::Sweep { at } => engine.sweep(at),
//!     }
//! }
//! ```
//!
//! The instants handed out come from Tokio's clock, so tests running with
//! a paused runtime see perfectly deterministic time.

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// The current time as seen by the game: Tokio's clock, as a std instant.
///
/// Under `#[tokio::test(start_paused = true)]` this follows the paused
/// clock, which keeps timers and the room state machine in step.
pub fn now() -> Instant {
    TokioInstant::now().into_std()
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Skip the missed tick(s) and resume from now.
    #[default]
    Skip,
    /// Keep the original cadence; the next tick fires at its originally
    /// scheduled time, even if that is already in the past.
    Drop,
}

/// Configuration for the game clock.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// Tick rate in Hz, clamped to `1..=128`.
    pub tick_rate_hz: u32,
    /// Interval between idle sweeps.
    pub sweep_interval: Duration,
    pub policy: TickPolicy,
    /// Budget warning threshold (0.0–1.0). A warning is logged when a
    /// tick's work exceeds this fraction of the tick duration.
    pub budget_warn_threshold: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            sweep_interval: Duration::from_secs(30),
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
        }
    }
}

impl ClockConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`GameClock::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        if clamped != self.tick_rate_hz {
            warn!(
                rate = self.tick_rate_hz,
                clamped, "tick_rate_hz out of range, clamping"
            );
            self.tick_rate_hz = clamped;
        }
        if self.sweep_interval < self.tick_duration() {
            self.sweep_interval = self.tick_duration();
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Information about one tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// When the tick fired.
    pub at: Instant,
    pub dt: Duration,
    /// `true` if the tick fired more than 10% of a tick late.
    pub overrun: bool,
    /// Ticks skipped due to the overrun (always 0 under [`TickPolicy::Drop`]).
    pub ticks_skipped: u64,
}

/// What the clock woke up for.
#[derive(Debug, Clone)]
pub enum ClockEvent {
    Tick(TickInfo),
    Sweep { at: Instant },
}

/// Runtime metrics.
///
/// Timing values refer to the work reported via
/// [`GameClock::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct ClockMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    pub total_sweeps: u64,
    /// Exponential moving average of tick work time (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last tick's work as a fraction of the budget. >1.0 means overrun.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct GameClock {
    config: ClockConfig,
    tick_duration: Duration,
    tick_count: u64,
    next_tick: TokioInstant,
    next_sweep: TokioInstant,
    /// Set when a tick is handed out, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
    metrics: ClockMetrics,
}

impl GameClock {
    pub fn new(config: ClockConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();
        let start = TokioInstant::now();

        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = tick_duration.as_secs_f64() * 1000.0,
            sweep_secs = config.sweep_interval.as_secs_f64(),
            policy = ?config.policy,
            "game clock created"
        );

        Self {
            next_tick: start + tick_duration,
            next_sweep: start + config.sweep_interval,
            config,
            tick_duration,
            tick_count: 0,
            tick_start: None,
            metrics: ClockMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(ClockConfig::with_rate(tick_rate_hz))
    }

    /// Waits for whichever comes first: the next tick or the next sweep.
    /// A sweep due at the same instant as a tick is reported first.
    pub async fn next(&mut self) -> ClockEvent {
        if self.next_sweep <= self.next_tick {
            time::sleep_until(self.next_sweep).await;
            let now = TokioInstant::now();
            self.next_sweep = now + self.config.sweep_interval;
            self.metrics.total_sweeps += 1;
            trace!("sweep fired");
            return ClockEvent::Sweep { at: now.into_std() };
        }

        let next = self.next_tick;
        let tick_dur = self.tick_duration;
        time::sleep_until(next).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.tick_start = Some(Instant::now());

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > tick_dur / 10;
        let mut ticks_skipped = 0u64;

        self.next_tick = match self.config.policy {
            TickPolicy::Skip => {
                if overrun {
                    ticks_skipped = (late_by.as_nanos() / tick_dur.as_nanos()) as u64;
                    if ticks_skipped > 0 {
                        warn!(
                            tick = self.tick_count,
                            skipped = ticks_skipped,
                            late_ms = late_by.as_secs_f64() * 1000.0,
                            "tick overrun, skipping ahead"
                        );
                    }
                }
                now + tick_dur
            }
            TickPolicy::Drop => {
                if overrun {
                    warn!(
                        tick = self.tick_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "tick overrun, keeping original cadence"
                    );
                }
                next + tick_dur
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        ClockEvent::Tick(TickInfo {
            tick: self.tick_count,
            at: now.into_std(),
            dt: tick_dur,
            overrun,
            ticks_skipped,
        })
    }

    /// Records that the work for the current tick has finished, for budget
    /// monitoring. A no-op if no tick is outstanding.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.tick_duration.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.tick_duration.as_secs_f64() * 1000.0,
                "tick exceeded budget"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick approaching budget limit"
            );
        }

        if elapsed > self.metrics.max_tick_time {
            self.metrics.max_tick_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time =
            Duration::from_secs_f64(prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha);
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &ClockMetrics {
        &self.metrics
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn sweep_interval(&self) -> Duration {
        self.config.sweep_interval
    }
}
