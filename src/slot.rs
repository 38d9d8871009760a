//! The per-feed mailbox between a refresh worker and the render loop.
//!
//! Each feed owns exactly one [`SharedSlot`].  The feed's worker is the only
//! writer; the render loop reads a copy of the current state once per tick.
//! The lock inside is held just long enough to copy data in or out — never
//! across a fetch, a sleep, or a frame present — so neither side can stall
//! the other.
//!
//! The key consistency rule lives in [`SharedSlot::publish`]: a failed fetch
//! records the error but leaves the last good value (and its timestamp)
//! untouched.  Stale-but-present always beats blank.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::{FetchError, FetchFailure};

/// A point-in-time copy of one feed's state.
///
/// `value` is `None` only before the feed's first successful fetch.  Once a
/// fetch has succeeded, later failures set `last_error` but never clear
/// `value` or `fetched_at`.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// Most recently fetched value, if any fetch has ever succeeded.
    pub value: Option<T>,
    /// When `value` was fetched.  `None` iff `value` is `None`.
    pub fetched_at: Option<DateTime<Utc>>,
    /// The most recent fetch failure, cleared by the next success.
    pub last_error: Option<FetchFailure>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            last_error: None,
        }
    }
}

impl<T> Snapshot<T> {
    /// Age of the held value relative to `now`, or `None` before the first
    /// successful fetch.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.fetched_at.map(|at| now - at)
    }
}

/// Concurrency-safe single-value mailbox holding the latest [`Snapshot`].
///
/// Cloning the slot clones the handle, not the data; all clones refer to
/// the same snapshot.
#[derive(Debug)]
pub struct SharedSlot<T> {
    inner: Arc<Mutex<Snapshot<T>>>,
}

impl<T> Clone for SharedSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Snapshot::default())),
        }
    }

    /// Record the outcome of one fetch cycle.
    ///
    /// On `Ok` the value and timestamp are replaced and any prior error is
    /// cleared; on `Err` only `last_error` changes.  The mutex is held for
    /// the duration of the swap only.
    pub fn publish(&self, result: Result<T, FetchError>) {
        // A poisoned mutex means a reader or writer panicked mid-copy;
        // the snapshot data itself is still a plain value, so keep going
        // with whatever state is in there rather than taking the whole
        // board down.
        let mut snap = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match result {
            Ok(value) => {
                snap.value = Some(value);
                snap.fetched_at = Some(Utc::now());
                snap.last_error = None;
            }
            Err(err) => {
                snap.last_error = Some(FetchFailure::from(&err));
            }
        }
    }
}

impl<T: Clone> SharedSlot<T> {
    /// Copy out the current state.
    ///
    /// Never blocks beyond a concurrent publish's bounded critical section,
    /// and never fails: a feed that hasn't produced data yet reads as
    /// `value: None`.
    pub fn read(&self) -> Snapshot<T> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
