//! abfahrt — a framebuffer departure board.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌────────────┐  publish   ┌────────────┐  read()   ┌────────────┐
//! │ worker.rs  │ ─────────► │  slot.rs   │ ────────► │ render.rs  │
//! │ (N threads)│ (per feed) │ (mailbox)  │ (per tick)│ (tick loop)│
//! └────────────┘            └────────────┘           └─────┬──────┘
//!       │                                                  │
//!  ┌────┴─────┐                            compose() ┌─────▼──────┐
//!  │ source/  │                                      │ compose.rs │
//!  │ transit  │                                      └─────┬──────┘
//!  │ weather  │                            present() ┌─────▼──────┐
//!  └──────────┘                                      │  sink.rs   │
//!                                                    │ fb0 / png  │
//!                                                    └────────────┘
//! ```
//!
//! * **`source/`** — the `DataSource` trait and the two feed clients
//!   (BVG departures, Open-Meteo weather).
//! * **`slot`** — one latest-value mailbox per feed; the only shared
//!   mutable state in the process.
//! * **`worker`** — one background thread per feed: fetch, publish, sleep
//!   with backoff.
//! * **`compose`** — pure snapshot-to-pixels layout.
//! * **`sink`** — the output surface: framebuffer device or PNG preview,
//!   chosen once at startup.
//! * **`render`** — the fixed-cadence tick loop; owns the workers.
//! * **`main`** — wires everything together: parse args, load config,
//!   install the Ctrl-C handler, run.

mod compose;
mod config;
mod error;
mod frame;
mod render;
mod shutdown;
mod sink;
mod slot;
mod source;
mod wifi;
mod worker;

use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};

use compose::Compositor;
use config::Config;
use render::{FeedSlots, RenderLoop};
use shutdown::Shutdown;
use sink::Sink;
use slot::SharedSlot;
use source::{format_table, DataSource, TransitSource, WeatherSource};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // -- parse arguments -----------------------------------------------------
    let mut table_mode = false;
    let mut config_path = PathBuf::from("stations.toml");
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--table" => table_mode = true,
            path => config_path = PathBuf::from(path),
        }
    }

    // Fatal on a malformed file; a missing file means defaults.
    let config = Config::load_or_default(&config_path)?;

    if table_mode {
        return run_table_mode(&config);
    }

    // -- shutdown signal -----------------------------------------------------
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            shutdown.trigger();
        })?;
    }

    // -- feeds: one slot + worker per station, plus weather ------------------
    let mut station_slots = Vec::new();
    let mut workers = Vec::new();
    for station in &config.stations {
        let slot = SharedSlot::new();
        workers.push(worker::spawn(
            TransitSource::new(station.clone()),
            slot.clone(),
            config.refresh.station_policy(station),
            shutdown.clone(),
        ));
        station_slots.push(slot);
    }

    let weather_slot = SharedSlot::new();
    workers.push(worker::spawn(
        WeatherSource::new(
            config.weather.latitude,
            config.weather.longitude,
            config.weather.timezone.clone(),
        ),
        weather_slot.clone(),
        config.refresh.policy_with_interval(config.weather.interval()),
        shutdown.clone(),
    ));

    if config.wifi.enabled {
        workers.push(wifi::spawn(config.wifi.check_interval(), shutdown.clone()));
    }

    // -- output surface (one-time decision) ----------------------------------
    let sink = Sink::probe(
        &config.display.framebuffer,
        config.display.framebuffer_offset,
        &config.display.preview_path,
    );

    let compositor = Compositor::new(
        config.display.width,
        config.display.height,
        config.display.pixel_format,
        config.display.stale_after(),
        config.display.expire_after(),
    );

    // -- run until Ctrl-C ----------------------------------------------------
    RenderLoop::new(
        compositor,
        sink,
        config.display.tick_interval(),
        shutdown,
        FeedSlots {
            stations: station_slots,
            weather: weather_slot,
        },
        workers,
    )
    .run();

    Ok(())
}

/// `--table`: fetch every station once and print a plain departure table.
fn run_table_mode(config: &Config) -> Result<()> {
    let mut departures = Vec::new();
    for station in &config.stations {
        match TransitSource::new(station.clone()).fetch() {
            Ok(mut list) => departures.append(&mut list),
            Err(err) => warn!("{}: {err}", station.name),
        }
    }
    departures.sort_by_key(|d| d.when);
    print!("{}", format_table(&departures));
    Ok(())
}
