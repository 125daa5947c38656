//! Open-Meteo forecast API (no key required).

use super::{fetch_json, trim_base, UpstreamError};
use crate::validate::Coordinates;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER: &str = "open-meteo";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,precipitation,weather_code,\
cloud_cover,pressure_msl,wind_speed_10m,wind_direction_10m,wind_gusts_10m";

const HOURLY_FIELDS: &str = "temperature_2m,relative_humidity_2m,precipitation,weather_code,\
cloud_cover,wind_speed_10m,wind_direction_10m";

/// Current conditions, knots / celsius / millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub latitude: f64,
    pub longitude: f64,
    pub time: String,
    pub temperature_c: f64,
    pub humidity_percent: f64,
    pub precipitation_mm: f64,
    pub weather_code: i64,
    pub cloud_cover_percent: f64,
    pub pressure_msl_hpa: f64,
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    pub wind_gusts_kts: f64,
    #[serde(default)]
    pub units: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub time: String,
    pub temperature_c: f64,
    pub humidity_percent: f64,
    pub precipitation_mm: f64,
    pub weather_code: i64,
    pub cloud_cover_percent: f64,
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub latitude: f64,
    pub longitude: f64,
    pub hours: Vec<HourlyPoint>,
    #[serde(default)]
    pub units: BTreeMap<String, String>,
}

// -- Raw provider shapes ------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawCurrentResponse {
    latitude: f64,
    longitude: f64,
    current: RawCurrent,
    #[serde(default)]
    current_units: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    #[serde(default)]
    time: String,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    precipitation: Option<f64>,
    weather_code: Option<i64>,
    cloud_cover: Option<f64>,
    pressure_msl: Option<f64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
    wind_gusts_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawHourlyResponse {
    latitude: f64,
    longitude: f64,
    hourly: RawHourly,
    #[serde(default)]
    hourly_units: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    weather_code: Vec<Option<i64>>,
    cloud_cover: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
}

fn at<T: Copy>(values: &[Option<T>], i: usize, default: T) -> T {
    values.get(i).copied().flatten().unwrap_or(default)
}

impl From<RawCurrentResponse> for CurrentConditions {
    fn from(raw: RawCurrentResponse) -> Self {
        let c = raw.current;
        Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            time: c.time,
            temperature_c: c.temperature_2m.unwrap_or(0.0),
            humidity_percent: c.relative_humidity_2m.unwrap_or(50.0),
            precipitation_mm: c.precipitation.unwrap_or(0.0),
            weather_code: c.weather_code.unwrap_or(0),
            cloud_cover_percent: c.cloud_cover.unwrap_or(0.0),
            pressure_msl_hpa: c.pressure_msl.unwrap_or(1013.0),
            wind_speed_kts: c.wind_speed_10m.unwrap_or(0.0),
            wind_direction_deg: c.wind_direction_10m.unwrap_or(0.0),
            wind_gusts_kts: c.wind_gusts_10m.unwrap_or(0.0),
            units: raw.current_units,
        }
    }
}

impl From<RawHourlyResponse> for HourlyForecast {
    fn from(raw: RawHourlyResponse) -> Self {
        let h = &raw.hourly;
        let hours = h
            .time
            .iter()
            .enumerate()
            .map(|(i, time)| HourlyPoint {
                time: time.clone(),
                temperature_c: at(&h.temperature_2m, i, 15.0),
                humidity_percent: at(&h.relative_humidity_2m, i, 50.0),
                precipitation_mm: at(&h.precipitation, i, 0.0),
                weather_code: at(&h.weather_code, i, 0),
                cloud_cover_percent: at(&h.cloud_cover, i, 0.0),
                wind_speed_kts: at(&h.wind_speed_10m, i, 0.0),
                wind_direction_deg: at(&h.wind_direction_10m, i, 0.0),
            })
            .collect();
        Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            hours,
            units: raw.hourly_units,
        }
    }
}

/// Open-Meteo REST adapter.
#[derive(Debug, Clone)]
pub struct OpenMeteoApi {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl OpenMeteoApi {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: trim_base(base_url),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    fn forecast_request(&self, coords: Coordinates) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/v1/forecast", self.base_url))
            .timeout(self.timeout)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("temperature_unit", "celsius".to_string()),
                ("wind_speed_unit", "kn".to_string()),
                ("precipitation_unit", "mm".to_string()),
                ("timezone", "GMT".to_string()),
            ])
    }

    /// Current conditions at a point.
    pub async fn current(&self, coords: Coordinates) -> Result<CurrentConditions, UpstreamError> {
        debug!("Open-Meteo current: {}", coords.to_query());
        let request = self
            .forecast_request(coords)
            .query(&[("current", CURRENT_FIELDS), ("forecast_days", "1")]);
        let raw: RawCurrentResponse = fetch_json(PROVIDER, request).await?;
        Ok(raw.into())
    }

    /// Hourly forecast covering `days` days from today.
    pub async fn forecast(
        &self,
        coords: Coordinates,
        days: u32,
    ) -> Result<HourlyForecast, UpstreamError> {
        debug!("Open-Meteo forecast: {} for {} days", coords.to_query(), days);
        let request = self.forecast_request(coords).query(&[
            ("hourly", HOURLY_FIELDS.to_string()),
            ("forecast_days", days.to_string()),
        ]);
        let raw: RawHourlyResponse = fetch_json(PROVIDER, request).await?;
        Ok(raw.into())
    }
}
