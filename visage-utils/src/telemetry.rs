//! Scoped timing logs for detection, training and prediction.
//!
//! A [`TimingGuard`] measures the lifetime of a scope and reports it under the
//! `visage::telemetry` target when dropped. Guards only report when telemetry
//! has been switched on through [`configure`] and the requested level is within
//! both the telemetry threshold and the active log filter.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used for every telemetry record.
pub const TELEMETRY_TARGET: &str = "visage::telemetry";

static ENABLED: AtomicBool = AtomicBool::new(false);
static THRESHOLD: AtomicU8 = AtomicU8::new(0);

/// RAII guard that logs how long a scope took.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Returns `true` when the guard will report on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Time elapsed since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the guard without logging and return the elapsed time.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            let elapsed = self.start.elapsed();
            log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} took {:.3} ms",
                self.label,
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }
}

/// Guard that reports whenever telemetry allows `level`.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    timing_guard_if(label, level, true)
}

/// Guard that additionally requires the caller's own `enabled` switch.
pub fn timing_guard_if(
    label: impl Into<Cow<'static, str>>,
    level: Level,
    enabled: bool,
) -> TimingGuard {
    let active =
        enabled && telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Switch telemetry on or off and set its level threshold.
pub fn configure(enabled: bool, level: LevelFilter) {
    ENABLED.store(enabled, Ordering::Relaxed);
    THRESHOLD.store(rank(level), Ordering::Relaxed);
}

/// Whether telemetry is currently switched on.
pub fn telemetry_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Whether a guard at `level` would pass the telemetry threshold.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && rank(level.to_level_filter()) <= THRESHOLD.load(Ordering::Relaxed)
}

fn rank(filter: LevelFilter) -> u8 {
    match filter {
        LevelFilter::Off => 0,
        LevelFilter::Error => 1,
        LevelFilter::Warn => 2,
        LevelFilter::Info => 3,
        LevelFilter::Debug => 4,
        LevelFilter::Trace => 5,
    }
}
