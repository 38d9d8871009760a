//! Process-wide shutdown signal.
//!
//! A single [`Shutdown`] handle is cloned into every thread that sleeps:
//! refresh workers, the render loop, the wifi watchdog.  Triggering it (from
//! the Ctrl-C handler) wakes all of them immediately instead of letting them
//! run out their current sleep.  In-flight network fetches are *not*
//! interrupted — they finish on their own (bounded by the HTTP client's
//! timeout) and the worker notices the signal at its next sleep.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable shutdown flag with interruptible sleeps.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every sleeper.  Idempotent.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().unwrap_or_else(|e| e.into_inner());
        *triggered = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for up to `dur`, returning early if shutdown triggers.
    ///
    /// Returns `true` if shutdown was triggered (before or during the
    /// sleep), `false` if the full duration elapsed.
    pub fn sleep(&self, dur: Duration) -> bool {
        self.sleep_until(Instant::now() + dur)
    }

    /// Sleep until `deadline`, returning early if shutdown triggers.
    ///
    /// Returns `true` if shutdown was triggered.  A deadline in the past
    /// returns immediately with the current flag state.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if *triggered {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Condvar waits can wake spuriously; the loop re-checks both
            // the flag and the clock.
            let (guard, _timeout) = cvar
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            triggered = guard;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn untriggered_sleep_runs_full_duration() {
        let shutdown = Shutdown::new();
        let start = Instant::now();

        let triggered = shutdown.sleep(Duration::from_millis(30));

        assert!(!triggered);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn trigger_wakes_a_sleeper_early() {
        let shutdown = Shutdown::new();
        let sleeper = shutdown.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let triggered = sleeper.sleep(Duration::from_secs(60));
            (triggered, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();

        let (triggered, elapsed) = handle.join().unwrap();
        assert!(triggered);
        assert!(
            elapsed < Duration::from_secs(5),
            "sleeper should wake well before the full minute, took {elapsed:?}"
        );
    }

    #[test]
    fn sleep_after_trigger_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let start = Instant::now();
        assert!(shutdown.sleep(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn past_deadline_returns_flag_state() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.sleep_until(Instant::now()));
    }
}
