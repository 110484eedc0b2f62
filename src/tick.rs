//! Shared tick counter and its wall-clock driver.
//!
//! The tick counter is the single source of truth for time-based logic:
//! sleep expiry, execution pacing, and batch spacing all read it. Wall clock
//! is sampled only for display timestamps, never for decisions.
//!
//! [`TickClock`] is the counter handle; tests advance it manually.
//! [`TickDriver`] is a thread that advances one tick per fixed period
//! (~100 ms by default), tolerating overshoot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

/// Default wall-clock period of one tick.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(100);

/// Sleep slice used once a backoff spin has been exhausted.
const WAIT_SLICE: Duration = Duration::from_micros(100);

/// Cloneable handle to the monotonically increasing tick counter.
#[derive(Clone, Debug, Default)]
pub struct TickClock {
    ticks: Arc<AtomicU64>,
}

impl TickClock {
    /// New clock at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick.
    #[inline]
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advance by `n` ticks. Called by the driver thread, or directly by
    /// tests that pump time manually.
    #[inline]
    pub fn advance(&self, n: u64) {
        self.ticks.fetch_add(n, Ordering::AcqRel);
    }

    /// Block until the counter reaches at least `target`, or `stop` is set.
    ///
    /// Spins briefly, then degrades to short timed sleeps. The guarantee is
    /// only "at least": the caller may observe a later tick than `target`.
    pub fn wait_until_at_least(&self, target: u64, stop: &AtomicBool) {
        let backoff = Backoff::new();
        while self.now() < target {
            if stop.load(Ordering::Acquire) {
                return;
            }
            if backoff.is_completed() {
                thread::sleep(WAIT_SLICE);
            } else {
                backoff.snooze();
            }
        }
    }
}

/// Thread advancing a [`TickClock`] once per wall-clock period.
///
/// Stopping is idempotent; the driver is also stopped on drop.
#[derive(Debug)]
pub struct TickDriver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickDriver {
    /// Spawn a driver advancing `clock` every `period`.
    ///
    /// The driver measures elapsed time against `Instant` so a late wakeup
    /// produces the tick immediately rather than drifting.
    pub fn spawn(clock: TickClock, period: Duration) -> Self {
        assert!(period > Duration::ZERO, "tick period must be > 0");
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let nap = (period / 10).max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("tick-driver".into())
            .spawn(move || {
                let mut last = Instant::now();
                while !thread_stop.load(Ordering::Acquire) {
                    if last.elapsed() >= period {
                        clock.advance(1);
                        last += period;
                    }
                    thread::sleep(nap);
                }
            })
            .expect("failed to spawn tick driver");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop and join the driver thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_advance_is_visible() {
        let clock = TickClock::new();
        assert_eq!(clock.now(), 0);
        clock.advance(3);
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn wait_returns_once_target_reached() {
        let clock = TickClock::new();
        let stop = AtomicBool::new(false);
        let waiter = {
            let clock = clock.clone();
            thread::spawn(move || {
                let stop = AtomicBool::new(false);
                clock.wait_until_at_least(5, &stop);
                clock.now()
            })
        };
        thread::sleep(Duration::from_millis(10));
        clock.advance(5);
        let seen = waiter.join().unwrap();
        assert!(seen >= 5);
        // Waiting for an already-reached target returns immediately.
        clock.wait_until_at_least(1, &stop);
    }

    #[test]
    fn wait_honors_stop_flag() {
        let clock = TickClock::new();
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let clock = clock.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || clock.wait_until_at_least(u64::MAX, &stop))
        };
        thread::sleep(Duration::from_millis(10));
        stop.store(true, Ordering::Release);
        waiter.join().unwrap();
    }

    #[test]
    fn driver_advances_and_stops() {
        let clock = TickClock::new();
        let mut driver = TickDriver::spawn(clock.clone(), Duration::from_millis(1));
        let deadline = Instant::now() + Duration::from_secs(5);
        while clock.now() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(clock.now() >= 3, "driver never advanced the clock");
        driver.stop();
        driver.stop(); // idempotent
        let frozen = clock.now();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.now(), frozen);
    }
}
