//! Configuration loading.
//!
//! One TOML file (`stations.toml` next to the binary, or the first CLI
//! argument) describes everything that varies between deployments: the
//! station list, the weather location, the display geometry, and the
//! refresh policy.  It is read exactly once, before any thread starts.
//!
//! Failure handling is asymmetric on purpose: a *missing* file falls back
//! to a built-in default station so a freshly flashed device shows
//! something, but a file that exists and doesn't parse (or fails
//! validation) is fatal — a typo must not silently demote a configured
//! board to the default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::frame::PixelFormat;
use crate::source::{Product, Station};
use crate::worker::RefreshPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub wifi: WifiConfig,
    #[serde(default = "default_stations")]
    pub stations: Vec<Station>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            refresh: RefreshConfig::default(),
            weather: WeatherConfig::default(),
            wifi: WifiConfig::default(),
            stations: default_stations(),
        }
    }
}

fn default_stations() -> Vec<Station> {
    vec![Station {
        name: "Zoologischer Garten".into(),
        station_id: 900023201,
        products: vec!["bus".into()],
        interval_secs: None,
    }]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub framebuffer: PathBuf,
    /// Byte offset into the device at which the frame starts.
    pub framebuffer_offset: u64,
    pub preview_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub tick_ms: u64,
    /// Age at which a feed gets the staleness indicator.
    pub stale_after_secs: u64,
    /// Age at which a feed's data is hidden again ("loading").  Unset
    /// means stale data stays on screen indefinitely.
    pub expire_after_secs: Option<u64>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            framebuffer: PathBuf::from("/dev/fb0"),
            framebuffer_offset: 0,
            preview_path: PathBuf::from("/tmp/abfahrt-preview.png"),
            width: 720,
            height: 720,
            pixel_format: PixelFormat::Bgra,
            tick_ms: 1000,
            stale_after_secs: 120,
            expire_after_secs: None,
        }
    }
}

impl DisplayConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Default per-station fetch interval; stations may override it.
    pub interval_secs: u64,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            base_backoff_secs: 5,
            max_backoff_secs: 300,
        }
    }
}

impl RefreshConfig {
    pub fn policy_with_interval(&self, interval: Duration) -> RefreshPolicy {
        RefreshPolicy {
            interval,
            base_backoff: Duration::from_secs(self.base_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    pub fn station_policy(&self, station: &Station) -> RefreshPolicy {
        let interval = station.interval_secs.unwrap_or(self.interval_secs);
        self.policy_with_interval(Duration::from_secs(interval))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub interval_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            latitude: 52.513568,
            longitude: 13.326526,
            timezone: "Europe/Berlin".into(),
            interval_secs: 900,
        }
    }
}

impl WeatherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_secs: 30,
        }
    }
}

impl WifiConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Config {
    /// Strict load: the file must exist, parse, and validate.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load, treating only a missing file as "use the defaults".
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            warn!(
                "no config at {}, using the built-in default station",
                path.display()
            );
            return Ok(Config::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(ConfigError::Invalid("display dimensions must be non-zero".into()));
        }
        if self.display.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be non-zero".into()));
        }
        if self.refresh.base_backoff_secs == 0 {
            return Err(ConfigError::Invalid("base_backoff_secs must be non-zero".into()));
        }
        if self.stations.is_empty() {
            return Err(ConfigError::Invalid("at least one station is required".into()));
        }
        for station in &self.stations {
            if station.products.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "station {:?} requests no products",
                    station.name
                )));
            }
            for product in &station.products {
                if Product::from_api(product) == Product::Other {
                    return Err(ConfigError::Invalid(format!(
                        "station {:?}: unknown product {product:?}",
                        station.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
