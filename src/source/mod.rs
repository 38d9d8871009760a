//! Data source abstraction layer.
//!
//! This module defines the [`DataSource`] trait.  Concrete implementations
//! live in sub-modules: [`transit`] (BVG departures, one source per station)
//! and [`weather`] (Open-Meteo, one per process).
//!
//! ## For contributors — adding a new feed
//!
//! 1. Create a new file in this directory (e.g. `air_quality.rs`).
//! 2. Define a struct holding the feed's configuration and HTTP client, and
//!    a plain data type for what one fetch returns.
//! 3. Implement [`DataSource`] for the struct — keep the payload parsing in
//!    a separate pure function so it can be tested against a JSON fixture
//!    without network access.
//! 4. Re-export from this module, give the feed a slot and a worker in
//!    `main.rs`, and teach the compositor to draw it.

mod transit;
mod weather;

pub use transit::{format_table, Departure, Product, Station, TransitSource};
pub use weather::{WeatherReport, WeatherSource};

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::FetchError;

/// The one network timeout in the fetch path.  Workers rely on it to bound
/// how long an in-flight fetch can delay shutdown.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Build the blocking HTTP client shared by all feed implementations.
pub(crate) fn http_client() -> Result<Client, FetchError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Trait that every data feed must implement.
///
/// A refresh worker calls [`fetch()`](DataSource::fetch) periodically on a
/// background thread, so implementations must be [`Send`].  The call blocks
/// for the duration of the network round-trip; the HTTP client's own timeout
/// is the only timeout — the worker adds none of its own.
pub trait DataSource: Send {
    /// What one successful fetch produces.
    type Output: Clone + Send + 'static;

    /// Short label used in thread names, logs, and on-screen diagnostics.
    fn name(&self) -> &str;

    /// Fetch one update.
    ///
    /// Errors are recovered by the worker (logged, backed off, recorded in
    /// the feed's slot) — implementations should return them rather than
    /// retry internally.
    fn fetch(&self) -> Result<Self::Output, FetchError>;
}
