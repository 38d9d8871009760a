//! Open-Meteo weather feed.
//!
//! One fetch returns the current conditions plus today's extremes — exactly
//! what the header of the board shows.  Like the transit feed, parsing is a
//! pure function over the response body.

use chrono::NaiveDateTime;
use serde::Deserialize;

use super::{http_client, DataSource};
use crate::error::FetchError;

const API_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// One weather snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    /// Server-side timestamp of the current conditions (local to the
    /// configured timezone, no offset in the payload).
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub uv_index: f64,
    pub temperature_daily_min: f64,
    pub temperature_daily_max: f64,
    pub uv_index_daily_max: f64,
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    current: RawCurrent,
    daily: RawDaily,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    time: String,
    temperature_2m: f64,
    uv_index: f64,
}

#[derive(Debug, Deserialize)]
struct RawDaily {
    temperature_2m_min: Vec<f64>,
    temperature_2m_max: Vec<f64>,
    uv_index_max: Vec<f64>,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Parse one forecast response body into a [`WeatherReport`].
pub fn parse_payload(body: &str) -> Result<WeatherReport, FetchError> {
    let payload: ForecastPayload =
        serde_json::from_str(body).map_err(|e| FetchError::Payload(format!("weather: {e}")))?;

    let timestamp = NaiveDateTime::parse_from_str(&payload.current.time, "%Y-%m-%dT%H:%M")
        .map_err(|e| {
            FetchError::Payload(format!(
                "weather: bad timestamp {:?}: {e}",
                payload.current.time
            ))
        })?;

    let daily = &payload.daily;
    let (Some(&min), Some(&max), Some(&uv_max)) = (
        daily.temperature_2m_min.first(),
        daily.temperature_2m_max.first(),
        daily.uv_index_max.first(),
    ) else {
        return Err(FetchError::Payload("weather: empty daily arrays".into()));
    };

    Ok(WeatherReport {
        timestamp,
        temperature: round1(payload.current.temperature_2m),
        uv_index: round1(payload.current.uv_index),
        temperature_daily_min: round1(min),
        temperature_daily_max: round1(max),
        uv_index_daily_max: round1(uv_max),
    })
}

// ---------------------------------------------------------------------------
// The data source
// ---------------------------------------------------------------------------

/// Weather feed for one fixed location.
pub struct WeatherSource {
    latitude: f64,
    longitude: f64,
    timezone: String,
}

impl WeatherSource {
    pub fn new(latitude: f64, longitude: f64, timezone: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            timezone: timezone.into(),
        }
    }
}

impl DataSource for WeatherSource {
    type Output = WeatherReport;

    fn name(&self) -> &str {
        "weather"
    }

    fn fetch(&self) -> Result<WeatherReport, FetchError> {
        let params: [(&str, String); 6] = [
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("timezone", self.timezone.clone()),
            ("current", "temperature_2m,uv_index".into()),
            (
                "daily",
                "temperature_2m_min,temperature_2m_max,uv_index_max".into(),
            ),
            ("forecast_days", "1".into()),
        ];

        let body = http_client()?
            .get(API_URL)
            .query(&params)
            .send()?
            .error_for_status()?
            .text()?;

        parse_payload(&body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    const SAMPLE: &str = r#"{
        "current": {
            "time": "2026-08-06T14:15",
            "temperature_2m": 24.63,
            "uv_index": 5.25
        },
        "daily": {
            "temperature_2m_min": [16.4],
            "temperature_2m_max": [27.81],
            "uv_index_max": [6.08]
        }
    }"#;

    #[test]
    fn parses_current_and_daily_values() {
        let report = parse_payload(SAMPLE).unwrap();

        assert_eq!(report.temperature, 24.6);
        assert_eq!(report.uv_index, 5.3);
        assert_eq!(report.temperature_daily_min, 16.4);
        assert_eq!(report.temperature_daily_max, 27.8);
        assert_eq!(report.uv_index_daily_max, 6.1);
    }

    #[test]
    fn parses_server_timestamp() {
        let report = parse_payload(SAMPLE).unwrap();

        assert_eq!(
            report.timestamp.date(),
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
        );
        assert_eq!(report.timestamp.hour(), 14);
        assert_eq!(report.timestamp.minute(), 15);
    }

    #[test]
    fn empty_daily_arrays_are_a_payload_error() {
        let body = r#"{
            "current": { "time": "2026-08-06T14:15", "temperature_2m": 20.0, "uv_index": 1.0 },
            "daily": { "temperature_2m_min": [], "temperature_2m_max": [], "uv_index_max": [] }
        }"#;

        let err = parse_payload(body).unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }

    #[test]
    fn bad_timestamp_is_a_payload_error() {
        let body = r#"{
            "current": { "time": "yesterday-ish", "temperature_2m": 20.0, "uv_index": 1.0 },
            "daily": { "temperature_2m_min": [1.0], "temperature_2m_max": [2.0], "uv_index_max": [3.0] }
        }"#;

        let err = parse_payload(body).unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }
}
