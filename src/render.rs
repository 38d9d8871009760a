//! The render loop.
//!
//! Single-threaded driver of the whole output side: every tick it copies
//! the current snapshot out of each feed slot, composes a frame, and hands
//! it to the sink.  Ticks are scheduled against the loop's start time
//! (`start + n * interval`) rather than by re-sleeping the interval, so a
//! slow compose or present doesn't accumulate drift.
//!
//! The loop is deliberately hard to kill: a failed present is logged and
//! retried on the next tick, and feed trouble never reaches it as anything
//! but snapshot contents.  Only the shutdown signal ends it — at which
//! point it stops the workers it owns and joins them with a bounded wait.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};

use crate::compose::Compositor;
use crate::shutdown::Shutdown;
use crate::sink::Present;
use crate::slot::SharedSlot;
use crate::source::{Departure, WeatherReport};

/// How long shutdown waits for straggling workers before abandoning them.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Read handles to every feed the compositor draws.
pub struct FeedSlots {
    pub stations: Vec<SharedSlot<Vec<Departure>>>,
    pub weather: SharedSlot<WeatherReport>,
}

/// Owns the output surface, the feed read handles, and the worker threads.
pub struct RenderLoop<P: Present> {
    compositor: Compositor,
    sink: P,
    tick_interval: Duration,
    shutdown: Shutdown,
    feeds: FeedSlots,
    workers: Vec<JoinHandle<()>>,
}

impl<P: Present> RenderLoop<P> {
    pub fn new(
        compositor: Compositor,
        sink: P,
        tick_interval: Duration,
        shutdown: Shutdown,
        feeds: FeedSlots,
        workers: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            compositor,
            sink,
            tick_interval,
            shutdown,
            feeds,
            workers,
        }
    }

    /// Tick until shutdown, then stop the workers and return.
    ///
    /// This is the only orderly-shutdown path of the process.
    pub fn run(mut self) {
        info!(
            "render loop started, {} ms per tick",
            self.tick_interval.as_millis()
        );

        let started = Instant::now();
        let mut ticks: u32 = 0;

        loop {
            let stations: Vec<_> = self.feeds.stations.iter().map(|s| s.read()).collect();
            let weather = self.feeds.weather.read();

            let frame = self.compositor.compose(Utc::now(), &stations, &weather);
            if let Err(err) = self.sink.present(&frame) {
                warn!("present failed: {err} — retrying next tick");
            }

            ticks += 1;
            if self.shutdown.sleep_until(started + self.tick_interval * ticks) {
                break;
            }
        }

        // Usually already triggered (that's why we're here), but run() can
        // only promise worker shutdown if it raises the flag itself.
        self.shutdown.trigger();
        join_with_deadline(self.workers, JOIN_TIMEOUT);
        info!("render loop stopped");
    }
}

/// Join every handle, giving the whole group at most `timeout`.  A worker
/// stuck in a network fetch longer than that is abandoned — the process is
/// exiting anyway and the HTTP timeout bounds the leak.
fn join_with_deadline(workers: Vec<JoinHandle<()>>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    for handle in workers {
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        if handle.is_finished() {
            // A worker that panicked already logged through the panic hook;
            // nothing useful left to do with the error here.
            let _ = handle.join();
        } else {
            warn!("a refresh worker did not stop within {timeout:?}, abandoning it");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, PresentError};
    use crate::frame::{Frame, PixelFormat};
    use crate::source::DataSource;
    use crate::worker::{self, RefreshPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn compositor() -> Compositor {
        Compositor::new(
            64,
            64,
            PixelFormat::Bgra,
            Duration::from_secs(120),
            None,
        )
    }

    fn empty_feeds() -> FeedSlots {
        FeedSlots {
            stations: vec![SharedSlot::new()],
            weather: SharedSlot::new(),
        }
    }

    /// Counts presents and fails on a scripted set of 1-based ticks.
    struct FlakySink {
        presents: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
    }

    impl Present for FlakySink {
        fn present(&mut self, _frame: &Frame) -> Result<(), PresentError> {
            let tick = self.presents.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&tick) {
                Err(PresentError::Device(std::io::Error::other("scripted")))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn present_failures_do_not_stop_the_loop() {
        let presents = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            presents: Arc::clone(&presents),
            fail_on: vec![2, 4],
        };
        let shutdown = Shutdown::new();

        let render = RenderLoop::new(
            compositor(),
            sink,
            Duration::from_millis(5),
            shutdown.clone(),
            empty_feeds(),
            Vec::new(),
        );
        let handle = thread::spawn(move || render.run());

        // Let it comfortably pass tick 5, then stop it.
        while presents.load(Ordering::SeqCst) < 6 {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();
        handle.join().expect("loop must survive failing ticks 2 and 4");

        assert!(presents.load(Ordering::SeqCst) >= 5);
    }

    #[test]
    fn shutdown_ends_the_loop_promptly_even_mid_sleep() {
        let presents = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            presents: Arc::clone(&presents),
            fail_on: Vec::new(),
        };
        let shutdown = Shutdown::new();

        // One-minute ticks: after the first frame the loop sits in its
        // tick wait until shutdown.
        let render = RenderLoop::new(
            compositor(),
            sink,
            Duration::from_secs(60),
            shutdown.clone(),
            empty_feeds(),
            Vec::new(),
        );
        let handle = thread::spawn(move || render.run());

        while presents.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        let start = Instant::now();
        shutdown.trigger();
        handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(presents.load(Ordering::SeqCst), 1);
    }

    /// A slow-but-cooperative source: the worker spends its life in the
    /// sleep phase, which shutdown interrupts.
    struct IdleSource;

    impl DataSource for IdleSource {
        type Output = Vec<Departure>;

        fn name(&self) -> &str {
            "idle"
        }

        fn fetch(&self) -> Result<Vec<Departure>, FetchError> {
            Err(FetchError::Empty("idle".into()))
        }
    }

    #[test]
    fn shutdown_joins_owned_workers() {
        let shutdown = Shutdown::new();
        let slot = SharedSlot::new();
        let worker = worker::spawn(
            IdleSource,
            slot.clone(),
            RefreshPolicy {
                interval: Duration::from_secs(60),
                base_backoff: Duration::from_secs(60),
                max_backoff: Duration::from_secs(60),
            },
            shutdown.clone(),
        );

        let presents = Arc::new(AtomicUsize::new(0));
        let render = RenderLoop::new(
            compositor(),
            FlakySink {
                presents: Arc::clone(&presents),
                fail_on: Vec::new(),
            },
            Duration::from_millis(5),
            shutdown.clone(),
            FeedSlots {
                stations: vec![slot],
                weather: SharedSlot::new(),
            },
            vec![worker],
        );
        let handle = thread::spawn(move || render.run());

        while presents.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        let start = Instant::now();
        shutdown.trigger();
        handle.join().unwrap();

        // run() returns only after the worker joined (or the 5 s deadline);
        // a worker parked in a 60 s backoff must be woken, not waited out.
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
