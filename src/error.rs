//! Error taxonomy.
//!
//! Three families, with strictly separated blast radii:
//!
//! * [`FetchError`] — a data-source fetch failed.  Handled by the owning
//!   refresh worker (log + backoff); the render side only ever sees it as a
//!   [`FetchFailure`] stored in a feed's snapshot.
//! * [`PresentError`] — delivering a finished frame to the output surface
//!   failed.  Logged by the render loop and retried on the next tick.
//! * [`ConfigError`] — the configuration file is unreadable or invalid.
//!   Fatal at startup, before any thread is spawned.

use std::path::PathBuf;

use thiserror::Error;

/// A single fetch attempt against a data source failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure: connection, TLS, timeout, non-2xx status.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered but the body didn't have the expected shape.
    #[error("malformed payload: {0}")]
    Payload(String),

    /// The server answered with a well-formed but useless response
    /// (e.g. an empty departure list for a known-busy station).
    #[error("empty response: {0}")]
    Empty(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Http(_) => FetchErrorKind::Http,
            FetchError::Payload(_) => FetchErrorKind::Payload,
            FetchError::Empty(_) => FetchErrorKind::Empty,
        }
    }
}

/// Coarse classification of a [`FetchError`], used where the full error
/// (which is neither `Clone` nor `Eq`) can't be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Http,
    Payload,
    Empty,
}

/// Cloneable record of a feed's most recent fetch failure.
///
/// This is what lives inside a [`crate::slot::Snapshot`]: the kind for
/// programmatic decisions, the rendered message for the log and any
/// on-screen diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl From<&FetchError> for FetchFailure {
    fn from(err: &FetchError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Presenting a frame to the output surface failed.
#[derive(Debug, Error)]
pub enum PresentError {
    /// Writing raw bytes to the framebuffer device failed (this includes
    /// short writes — a partially updated panel counts as a failure).
    #[error("framebuffer write failed: {0}")]
    Device(#[from] std::io::Error),

    /// Encoding or saving the preview image failed.
    #[error("preview encode failed: {0}")]
    Preview(#[from] image::ImageError),
}

/// The configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
