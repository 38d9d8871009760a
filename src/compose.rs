//! Frame composition.
//!
//! [`Compositor::compose`] turns the current feed snapshots into one
//! finished [`Frame`].  It is a pure function of its inputs plus the layout
//! constants below: no network, no locks, no hidden state.  It must produce
//! a frame for *any* combination of feed states — missing data renders as a
//! placeholder, errors and staleness as small header indicators overlaid on
//! the last-known content, never as a blank screen.
//!
//! The layout matches the 720×720 panel the board was built for: a two-row
//! header (clock, weather, indicators), then 18 departure rows of 40 px in
//! three columns — product-colored line badge, destination, departure time.

use std::convert::Infallible;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use embedded_graphics::mono_font::iso_8859_1::{FONT_6X13, FONT_10X20};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle, RoundedRectangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};

use crate::frame::{Frame, PixelFormat};
use crate::slot::Snapshot;
use crate::source::{Departure, Product, WeatherReport};

// -- layout ------------------------------------------------------------------

const ROW_HEIGHT: i32 = 40;
const NUM_ROWS: usize = 18;
const COL_WIDTHS: [i32; 3] = [80, 540, 100];
/// Rows reserved at the top for clock, weather, and indicators.
const HEADER_ROWS: i32 = 2;
const BADGE_PADDING: i32 = 5;
const BADGE_CORNER: u32 = 7;
const INDICATOR_SIZE: u32 = 12;
/// Glyph width of the row font, for destination truncation.
const CHAR_WIDTH: i32 = 10;

// -- palette -----------------------------------------------------------------

const SBAHN_GREEN: Rgb888 = Rgb888::new(64, 131, 53);
const METROBUS_YELLOW: Rgb888 = Rgb888::new(233, 208, 33);
const BUS_PURPLE: Rgb888 = Rgb888::new(160, 1, 121);
const OTHER_GREY: Rgb888 = Rgb888::new(128, 128, 128);
const LATE_RED: Rgb888 = Rgb888::new(255, 0, 0);
const EARLY_YELLOW: Rgb888 = Rgb888::new(255, 255, 0);
const WHITE: Rgb888 = Rgb888::new(255, 255, 255);
const BLACK: Rgb888 = Rgb888::new(0, 0, 0);
const ERROR_RED: Rgb888 = Rgb888::new(200, 30, 30);
const STALE_AMBER: Rgb888 = Rgb888::new(255, 176, 0);

/// Lays out the full frame from whatever snapshots are available.
#[derive(Debug, Clone)]
pub struct Compositor {
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Age beyond which a feed gets the staleness indicator.
    stale_after: Duration,
    /// Age beyond which a feed's value is treated as absent again.
    /// `None` (the default) keeps stale data on screen indefinitely.
    expire_after: Option<Duration>,
}

impl Compositor {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        stale_after: Duration,
        expire_after: Option<Duration>,
    ) -> Self {
        Self {
            width,
            height,
            format,
            stale_after,
            expire_after,
        }
    }

    /// Compose one frame.  Infallible by contract: partial or missing data
    /// degrades the content, never the frame.
    pub fn compose(
        &self,
        now: DateTime<Utc>,
        stations: &[Snapshot<Vec<Departure>>],
        weather: &Snapshot<WeatherReport>,
    ) -> Frame {
        let mut frame = Frame::new(self.width, self.height, self.format);
        match self.draw_into(&mut frame, now, stations, weather) {
            Ok(()) => {}
            // Drawing into a Frame is Infallible.
            Err(never) => match never {},
        }
        frame
    }

    fn draw_into(
        &self,
        frame: &mut Frame,
        now: DateTime<Utc>,
        stations: &[Snapshot<Vec<Departure>>],
        weather: &Snapshot<WeatherReport>,
    ) -> Result<(), Infallible> {
        self.draw_clock(frame, now)?;
        self.draw_weather(frame, now, weather)?;
        self.draw_indicators(frame, now, stations, weather)?;
        self.draw_board(frame, now, stations)?;
        Ok(())
    }

    // -- freshness policy ----------------------------------------------------

    fn age_of<T>(&self, snap: &Snapshot<T>, now: DateTime<Utc>) -> Option<Duration> {
        // A negative age (server clock ahead of ours) counts as fresh.
        snap.age(now).and_then(|a| a.to_std().ok())
    }

    fn is_stale<T>(&self, snap: &Snapshot<T>, now: DateTime<Utc>) -> bool {
        self.age_of(snap, now)
            .is_some_and(|age| age > self.stale_after)
    }

    /// The snapshot's value, unless the expiry policy says it is too old
    /// to show.
    fn effective_value<'a, T>(&self, snap: &'a Snapshot<T>, now: DateTime<Utc>) -> Option<&'a T> {
        let value = snap.value.as_ref()?;
        if let Some(expire_after) = self.expire_after {
            if self.age_of(snap, now).is_some_and(|age| age > expire_after) {
                return None;
            }
        }
        Some(value)
    }

    // -- header --------------------------------------------------------------

    fn draw_clock(&self, frame: &mut Frame, now: DateTime<Utc>) -> Result<(), Infallible> {
        let label = now.with_timezone(&Local).format("%H:%M").to_string();
        centered_text(
            frame,
            &label,
            Point::new(self.width as i32 / 2, ROW_HEIGHT),
            MonoTextStyle::new(&FONT_10X20, WHITE),
        )
    }

    fn draw_weather(
        &self,
        frame: &mut Frame,
        now: DateTime<Utc>,
        weather: &Snapshot<WeatherReport>,
    ) -> Result<(), Infallible> {
        let right = self.width as i32 - 8;
        let style = TextStyleBuilder::new()
            .alignment(Alignment::Right)
            .baseline(Baseline::Middle)
            .build();

        match self.effective_value(weather, now) {
            Some(report) => {
                let current = format!("{:.1}°C", report.temperature);
                Text::with_text_style(
                    &current,
                    Point::new(right, ROW_HEIGHT - 10),
                    MonoTextStyle::new(&FONT_10X20, WHITE),
                    style,
                )
                .draw(frame)?;

                let daily = format!(
                    "{:.1}° - {:.1}°  UV {:.1}",
                    report.temperature_daily_min,
                    report.temperature_daily_max,
                    report.uv_index_daily_max
                );
                Text::with_text_style(
                    &daily,
                    Point::new(right, ROW_HEIGHT + 12),
                    MonoTextStyle::new(&FONT_6X13, OTHER_GREY),
                    style,
                )
                .draw(frame)?;
            }
            None => {
                Text::with_text_style(
                    "...",
                    Point::new(right, ROW_HEIGHT),
                    MonoTextStyle::new(&FONT_10X20, OTHER_GREY),
                    style,
                )
                .draw(frame)?;
            }
        }
        Ok(())
    }

    /// Error and staleness dots in the top-left corner.  They overlay the
    /// header only — the board below keeps showing the last-known data.
    fn draw_indicators(
        &self,
        frame: &mut Frame,
        now: DateTime<Utc>,
        stations: &[Snapshot<Vec<Departure>>],
        weather: &Snapshot<WeatherReport>,
    ) -> Result<(), Infallible> {
        let any_error = stations.iter().any(|s| s.last_error.is_some())
            || weather.last_error.is_some();
        let any_stale = stations.iter().any(|s| self.is_stale(s, now))
            || self.is_stale(weather, now);

        if any_error {
            Rectangle::new(Point::new(4, 4), Size::new(INDICATOR_SIZE, INDICATOR_SIZE))
                .into_styled(PrimitiveStyle::with_fill(ERROR_RED))
                .draw(frame)?;
        }
        if any_stale {
            Rectangle::new(Point::new(20, 4), Size::new(INDICATOR_SIZE, INDICATOR_SIZE))
                .into_styled(PrimitiveStyle::with_fill(STALE_AMBER))
                .draw(frame)?;
        }
        Ok(())
    }

    // -- departure board -----------------------------------------------------

    fn draw_board(
        &self,
        frame: &mut Frame,
        now: DateTime<Utc>,
        stations: &[Snapshot<Vec<Departure>>],
    ) -> Result<(), Infallible> {
        let mut departures: Vec<&Departure> = Vec::new();
        let mut any_value = false;
        for snap in stations {
            if let Some(list) = self.effective_value(snap, now) {
                any_value = true;
                departures.extend(list.iter());
            }
        }

        if !any_value {
            let board_middle =
                HEADER_ROWS * ROW_HEIGHT + (self.height as i32 - HEADER_ROWS * ROW_HEIGHT) / 2;
            return centered_text(
                frame,
                "loading departures ...",
                Point::new(self.width as i32 / 2, board_middle),
                MonoTextStyle::new(&FONT_10X20, OTHER_GREY),
            );
        }

        departures.sort_by_key(|d| d.when);

        for (row, departure) in departures.iter().take(NUM_ROWS).enumerate() {
            let y = (row as i32 + HEADER_ROWS) * ROW_HEIGHT;
            let mut x = 0;
            self.draw_badge(frame, departure, x, y, COL_WIDTHS[0])?;
            x += COL_WIDTHS[0];
            self.draw_destination(frame, departure, x, y, COL_WIDTHS[1])?;
            x += COL_WIDTHS[1];
            self.draw_departure_time(frame, departure, x, y, COL_WIDTHS[2])?;
        }
        Ok(())
    }

    fn draw_badge(
        &self,
        frame: &mut Frame,
        departure: &Departure,
        x: i32,
        y: i32,
        col_width: i32,
    ) -> Result<(), Infallible> {
        let (background, text_color) = badge_colors(departure);

        let rect = Rectangle::new(
            Point::new(x + BADGE_PADDING, y + BADGE_PADDING),
            Size::new(
                (col_width - 2 * BADGE_PADDING) as u32,
                (ROW_HEIGHT - 2 * BADGE_PADDING) as u32,
            ),
        );
        RoundedRectangle::with_equal_corners(rect, Size::new(BADGE_CORNER, BADGE_CORNER))
            .into_styled(PrimitiveStyle::with_fill(background))
            .draw(frame)?;

        // Nudged one pixel right and down; even cell dimensions have no
        // exact center and this reads better.
        centered_text(
            frame,
            &fit_text(&departure.line, (col_width / CHAR_WIDTH) as usize),
            Point::new(x + col_width / 2 + 1, y + ROW_HEIGHT / 2 + 1),
            MonoTextStyle::new(&FONT_10X20, text_color),
        )
    }

    fn draw_destination(
        &self,
        frame: &mut Frame,
        departure: &Departure,
        x: i32,
        y: i32,
        col_width: i32,
    ) -> Result<(), Infallible> {
        let max_chars = ((col_width - 10) / CHAR_WIDTH) as usize;
        let text = fit_text(&departure.destination, max_chars);

        let style = TextStyleBuilder::new()
            .alignment(Alignment::Left)
            .baseline(Baseline::Middle)
            .build();
        Text::with_text_style(
            &text,
            Point::new(x + 5, y + ROW_HEIGHT / 2),
            MonoTextStyle::new(&FONT_10X20, WHITE),
            style,
        )
        .draw(frame)?;
        Ok(())
    }

    fn draw_departure_time(
        &self,
        frame: &mut Frame,
        departure: &Departure,
        x: i32,
        y: i32,
        col_width: i32,
    ) -> Result<(), Infallible> {
        let color = match departure.delay_minutes {
            d if d > 0 => LATE_RED,
            d if d < 0 => EARLY_YELLOW,
            _ => WHITE,
        };

        let label = if departure.delay_minutes == 0 {
            departure.time_label()
        } else {
            format!("{} {}", departure.time_label(), departure.delay_label())
        };

        centered_text(
            frame,
            &fit_text(&label, (col_width / CHAR_WIDTH) as usize),
            Point::new(x + col_width / 2, y + ROW_HEIGHT / 2),
            MonoTextStyle::new(&FONT_10X20, color),
        )
    }
}

fn badge_colors(departure: &Departure) -> (Rgb888, Rgb888) {
    match departure.product {
        Product::Suburban => (SBAHN_GREEN, WHITE),
        Product::Bus if departure.line.starts_with('M') => (METROBUS_YELLOW, BLACK),
        Product::Bus => (BUS_PURPLE, WHITE),
        _ => (OTHER_GREY, WHITE),
    }
}

fn centered_text(
    frame: &mut Frame,
    text: &str,
    center: Point,
    character_style: MonoTextStyle<'_, Rgb888>,
) -> Result<(), Infallible> {
    let style = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Middle)
        .build();
    Text::with_text_style(text, center, character_style, style).draw(frame)?;
    Ok(())
}

/// Clamp text to the mono font's glyph set and to `max_chars` columns,
/// ellipsizing when it doesn't fit.
fn fit_text(text: &str, max_chars: usize) -> String {
    let sanitized: String = text.chars().map(renderable).collect();
    if sanitized.chars().count() <= max_chars {
        return sanitized;
    }
    let mut out: String = sanitized
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    out.push_str("...");
    out
}

/// The row font covers ISO 8859-1; map the ring-line arrows onto their
/// closest Latin-1 stand-ins and anything else unknown onto '?'.
fn renderable(c: char) -> char {
    match c {
        '⟳' => '»',
        '⟲' => '«',
        c if (c as u32) <= 0xFF => c,
        _ => '?',
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
