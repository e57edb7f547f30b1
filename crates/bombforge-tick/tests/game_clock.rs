//! Integration tests for the game clock.
//!
//! All async tests run on a paused Tokio clock, so `sleep_until` resolves
//! as soon as the runtime is idle and elapsed times are exact.

use std::time::Duration;

use bombforge_tick::{ClockConfig, ClockEvent, GameClock, TickInfo, TickPolicy};
use tokio::time::Instant;

fn expect_tick(event: ClockEvent) -> TickInfo {
    match event {
        ClockEvent::Tick(info) => info,
        other => panic!("expected a tick, got {other:?}"),
    }
}

// =========================================================================
// ClockConfig
// =========================================================================

#[test]
fn test_default_config() {
    let cfg = ClockConfig::default();
    assert_eq!(cfg.tick_rate_hz, 60);
    assert_eq!(cfg.sweep_interval, Duration::from_secs(30));
    assert_eq!(cfg.policy, TickPolicy::Skip);
    assert!((cfg.budget_warn_threshold - 0.8).abs() < f64::EPSILON);
}

#[test]
fn test_tick_duration_60hz() {
    let cfg = ClockConfig::with_rate(60);
    assert_eq!(cfg.tick_duration(), Duration::from_secs_f64(1.0 / 60.0));
}

#[test]
fn test_validated_clamps_rate() {
    assert_eq!(ClockConfig::with_rate(0).validated().tick_rate_hz, 1);
    assert_eq!(ClockConfig::with_rate(500).validated().tick_rate_hz, 128);
}

#[test]
fn test_validated_sweep_never_shorter_than_a_tick() {
    let cfg = ClockConfig {
        tick_rate_hz: 10,
        sweep_interval: Duration::from_millis(1),
        ..Default::default()
    }
    .validated();
    assert_eq!(cfg.sweep_interval, Duration::from_millis(100));
}

#[test]
fn test_validated_clamps_threshold() {
    let cfg = ClockConfig {
        budget_warn_threshold: 3.0,
        ..Default::default()
    }
    .validated();
    assert!((cfg.budget_warn_threshold - 1.0).abs() < f64::EPSILON);
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticks_fire_at_fixed_rate() {
    let start = Instant::now();
    let mut clock = GameClock::with_rate(20);

    for expected in 1..=3u64 {
        let info = expect_tick(clock.next().await);
        assert_eq!(info.tick, expected);
        assert_eq!(info.dt, Duration::from_millis(50));
        assert!(!info.overrun);
    }
    assert_eq!(start.elapsed(), Duration::from_millis(150));
    assert_eq!(clock.tick_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sweeps_interleave_with_ticks() {
    let mut clock = GameClock::new(ClockConfig {
        tick_rate_hz: 10,
        sweep_interval: Duration::from_millis(250),
        ..Default::default()
    });

    let mut kinds = Vec::new();
    for _ in 0..4 {
        kinds.push(match clock.next().await {
            ClockEvent::Tick(info) => format!("tick{}", info.tick),
            ClockEvent::Sweep { .. } => "sweep".to_string(),
        });
    }
    assert_eq!(kinds, ["tick1", "tick2", "sweep", "tick3"]);
    assert_eq!(clock.metrics().total_sweeps, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_wins_a_tie() {
    let mut clock = GameClock::new(ClockConfig {
        tick_rate_hz: 10,
        sweep_interval: Duration::from_millis(100),
        ..Default::default()
    });
    assert!(matches!(clock.next().await, ClockEvent::Sweep { .. }));
    assert!(matches!(clock.next().await, ClockEvent::Tick(_)));
}

#[tokio::test(start_paused = true)]
async fn test_tick_instant_follows_paused_clock() {
    let before = bombforge_tick::now();
    let mut clock = GameClock::with_rate(10);
    let info = expect_tick(clock.next().await);
    assert_eq!(info.at.duration_since(before), Duration::from_millis(100));
}

// =========================================================================
// Overrun policies
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_skips_missed_ticks() {
    let mut clock = GameClock::with_rate(10);
    expect_tick(clock.next().await);

    // The loop stalls for half a second.
    tokio::time::advance(Duration::from_millis(500)).await;
    let late = expect_tick(clock.next().await);
    assert!(late.overrun);
    assert_eq!(late.ticks_skipped, 4);

    // The following tick is a full period after the late one.
    let resumed_at = Instant::now();
    let next = expect_tick(clock.next().await);
    assert!(!next.overrun);
    assert_eq!(resumed_at.elapsed(), Duration::from_millis(100));
    assert_eq!(clock.metrics().total_overruns, 1);
    assert_eq!(clock.metrics().total_skipped, 4);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_cadence() {
    let mut clock = GameClock::new(ClockConfig {
        tick_rate_hz: 10,
        policy: TickPolicy::Drop,
        ..Default::default()
    });
    expect_tick(clock.next().await);

    tokio::time::advance(Duration::from_millis(250)).await;
    let late = expect_tick(clock.next().await);
    assert!(late.overrun);
    assert_eq!(late.ticks_skipped, 0);

    // The original schedule (t=300ms) is already past, so the next tick
    // fires without waiting.
    let before = Instant::now();
    expect_tick(clock.next().await);
    assert_eq!(before.elapsed(), Duration::ZERO);
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_updates_metrics() {
    let mut clock = GameClock::with_rate(20);
    expect_tick(clock.next().await);
    clock.record_tick_end();

    let m = clock.metrics();
    assert_eq!(m.total_ticks, 1);
    assert!(m.budget_utilization >= 0.0);
    assert!(m.max_tick_time >= m.avg_tick_time);
}

#[test]
fn test_record_tick_end_without_tick_is_noop() {
    let mut clock = GameClock::with_rate(20);
    clock.record_tick_end();
    assert_eq!(clock.metrics().total_ticks, 0);
    assert_eq!(clock.metrics().max_tick_time, Duration::ZERO);
}
