//! Background refresh workers.
//!
//! One worker per feed, each on its own thread: fetch, publish into the
//! feed's [`SharedSlot`], sleep, repeat.  Workers never talk to each other
//! and never touch the output surface; everything they learn travels
//! through their slot.
//!
//! Failures stay local.  A failed fetch is logged, recorded in the slot
//! (leaving the previous value intact) and answered with an escalating
//! backoff sleep; the cycle returns to the normal interval on the next
//! success.  The shutdown signal is honored at the top of every sleep —
//! an in-flight fetch finishes naturally, bounded by the HTTP timeout.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::shutdown::Shutdown;
use crate::slot::SharedSlot;
use crate::source::DataSource;

/// Per-feed refresh timing.  Immutable after construction.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// Sleep after a successful fetch.
    pub interval: Duration,
    /// Sleep after the first failure in a row; doubles per further failure.
    pub base_backoff: Duration,
    /// Ceiling for the doubling backoff.
    pub max_backoff: Duration,
}

impl RefreshPolicy {
    /// Sleep for the Nth consecutive failure: `base * 2^(N-1)`, capped at
    /// `max_backoff`.  `0` means "no failure" and returns the interval.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        // 2^16 overshoots any sane max_backoff already; clamping the
        // exponent keeps the shift well-defined.
        let exp = (consecutive_failures - 1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

/// Start one refresh worker on its own thread.
///
/// The worker owns the source; the caller keeps a slot handle for reading
/// and the join handle for shutdown.
pub fn spawn<S>(
    source: S,
    slot: SharedSlot<S::Output>,
    policy: RefreshPolicy,
    shutdown: Shutdown,
) -> JoinHandle<()>
where
    S: DataSource + 'static,
{
    thread::spawn(move || run(source, slot, policy, shutdown))
}

fn run<S: DataSource>(
    source: S,
    slot: SharedSlot<S::Output>,
    policy: RefreshPolicy,
    shutdown: Shutdown,
) {
    info!("{}: refresh worker started", source.name());
    let mut consecutive_failures: u32 = 0;

    while !shutdown.is_triggered() {
        let result = source.fetch();

        let sleep = match &result {
            Ok(_) => {
                if consecutive_failures > 0 {
                    info!(
                        "{}: recovered after {consecutive_failures} failed fetches",
                        source.name()
                    );
                }
                consecutive_failures = 0;
                policy.interval
            }
            Err(err) => {
                consecutive_failures += 1;
                let backoff = policy.backoff_for(consecutive_failures);
                warn!(
                    "{}: fetch failed ({err}), retrying in {}s",
                    source.name(),
                    backoff.as_secs()
                );
                backoff
            }
        };

        slot.publish(result);

        if shutdown.sleep(sleep) {
            break;
        }
    }

    debug!("{}: refresh worker stopped", source.name());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
