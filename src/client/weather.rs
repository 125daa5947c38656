//! Weather client (Open-Meteo). No API key; results are memoized in
//! process only.

use super::{serve_with_fallback, ServerLink};
use crate::cache::MemoCache;
use crate::clock::{system_clock, SharedClock};
use crate::config::{TimeoutConfig, WeatherConfig};
use crate::ratelimit::{services, RateLimiter, RateLimiterRegistry};
use crate::tools::args::{CurrentWeatherArgs, ForecastArgs, MAX_FORECAST_DAYS};
use crate::types::{
    visibility_from_weather_code, ForecastSummary, HealthStatus, HourlyWeather, PrecipitationType,
    RiskLevel, Served, WeatherBriefing, WeatherReading,
};
use crate::upstream::openmeteo::{CurrentConditions, HourlyPoint};
use crate::upstream::{OpenMeteoApi, UpstreamError};
use crate::validate::{in_range, AirportCode, Coordinates, ValidationError};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const MAX_FORECAST_HOURS: u32 = 168;

/// Airports with known coordinates.
const AIRPORTS: &[(&str, f64, f64)] = &[
    ("DXB", 25.2532, 55.3657),
    ("LHR", 51.4700, -0.4543),
    ("JFK", 40.6413, -73.7781),
    ("LAX", 33.9416, -118.4085),
    ("SIN", 1.3644, 103.9915),
    ("FRA", 50.0379, 8.5622),
    ("NRT", 35.7720, 140.3929),
    ("DEL", 28.5562, 77.1000),
    ("CDG", 49.0097, 2.5479),
    ("AMS", 52.3105, 4.7683),
    ("HKG", 22.3080, 113.9185),
    ("SYD", -33.9399, 151.1753),
    ("ORD", 41.9742, -87.9073),
    ("ATL", 33.6407, -84.4277),
    ("DFW", 32.8998, -97.0403),
];

pub fn airport_coordinates(code: &AirportCode) -> Option<Coordinates> {
    AIRPORTS
        .iter()
        .find(|(c, _, _)| *c == code.as_str())
        .map(|&(_, latitude, longitude)| Coordinates { latitude, longitude })
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no coordinates known for airport {0}")]
    UnsupportedAirport(String),

    #[error("open-meteo rate limit exceeded, retry later")]
    RateLimited,

    #[error("weather lookup failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("no forecast data available for {0}")]
    NoData(String),
}

impl WeatherError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Upstream(e) => e.is_retryable(),
            Self::Validation(_) | Self::UnsupportedAirport(_) | Self::NoData(_) => false,
        }
    }
}

pub struct WeatherClient {
    link: ServerLink,
    api: OpenMeteoApi,
    limiter: Arc<dyn RateLimiter>,
    clock: SharedClock,
    current: MemoCache<Served<WeatherReading>>,
    forecasts: MemoCache<Served<Vec<HourlyWeather>>>,
}

impl WeatherClient {
    pub async fn connect(
        config: &WeatherConfig,
        timeouts: &TimeoutConfig,
        limiters: &RateLimiterRegistry,
    ) -> Self {
        Self::connect_with_clock(config, timeouts, limiters, system_clock()).await
    }

    pub async fn connect_with_clock(
        config: &WeatherConfig,
        timeouts: &TimeoutConfig,
        limiters: &RateLimiterRegistry,
        clock: SharedClock,
    ) -> Self {
        let link = ServerLink::connect_with_clock(
            &config.tool_server_url,
            timeouts.health(),
            timeouts.tool(),
            clock.clone(),
        )
        .await;
        let memo_ttl = Duration::from_secs(config.memo_ttl_seconds);
        Self {
            link,
            api: OpenMeteoApi::new(&config.upstream_url, timeouts.direct()),
            limiter: limiters.limiter_for(services::OPEN_METEO, config.rate_limit.budget()),
            clock,
            current: MemoCache::new(memo_ttl, 1_000),
            forecasts: MemoCache::new(memo_ttl, 1_000),
        }
    }

    pub fn link(&self) -> &ServerLink {
        &self.link
    }

    pub fn health(&self) -> HealthStatus {
        self.link.health()
    }

    fn admit(&self) -> Result<(), WeatherError> {
        if self.limiter.admit() {
            Ok(())
        } else {
            Err(WeatherError::RateLimited)
        }
    }

    fn locate(code: &str) -> Result<(AirportCode, Coordinates), WeatherError> {
        let code = AirportCode::parse(code)?;
        let coords = airport_coordinates(&code)
            .ok_or_else(|| WeatherError::UnsupportedAirport(code.to_string()))?;
        Ok((code, coords))
    }

    /// Current conditions at an airport.
    pub async fn get_current_weather(
        &self,
        airport_code: &str,
    ) -> Result<Served<WeatherReading>, WeatherError> {
        let (code, coords) = Self::locate(airport_code)?;
        let key = MemoCache::<Served<WeatherReading>>::key("current", &[code.as_str()]);
        if let Some(hit) = self.current.get(&key) {
            debug!("Weather cache hit for {}", code);
            return Ok(Served::cached(hit.data, hit.path));
        }

        let args = CurrentWeatherArgs::at(coords);
        let served = serve_with_fallback("weather", &self.link, &args, || async move {
            self.admit()?;
            Ok::<_, WeatherError>(self.api.current(coords).await?)
        })
        .await?;

        let now = self.clock.utc();
        let served = served.map(|c| to_reading(&code, &c, now));
        self.current.insert(key, served.clone());
        Ok(served)
    }

    /// The next `hours` hours of forecast (1-168), starting with the hour
    /// that contains now.
    pub async fn get_hourly_forecast(
        &self,
        airport_code: &str,
        hours: u32,
    ) -> Result<Served<Vec<HourlyWeather>>, WeatherError> {
        let (code, coords) = Self::locate(airport_code)?;
        let hours = in_range("hours", hours, 1, MAX_FORECAST_HOURS)?;
        let now = self.clock.utc();
        let until = now + chrono::Duration::hours(i64::from(hours));

        let window = self.forecast_window(&code, coords, days_covering(now, until)).await?;
        let earliest = now - chrono::Duration::hours(1);
        Ok(window.map(|points| {
            points
                .into_iter()
                .filter(|p| hour_start(&p.time).is_some_and(|t| t > earliest))
                .take(hours as usize)
                .collect()
        }))
    }

    /// Forecast hour closest to `target`. Past targets and targets beyond
    /// 168 hours are rejected.
    pub async fn get_weather_at_time(
        &self,
        airport_code: &str,
        target: DateTime<Utc>,
    ) -> Result<Served<HourlyWeather>, WeatherError> {
        let now = self.clock.utc();
        let ahead = target - now;
        if ahead < chrono::Duration::zero() {
            return Err(ValidationError::new("target_time", "cannot forecast past weather").into());
        }
        if ahead.num_hours() > i64::from(MAX_FORECAST_HOURS) {
            return Err(ValidationError::new("target_time", "forecast limited to 168 hours").into());
        }

        let (code, coords) = Self::locate(airport_code)?;
        let window = self.forecast_window(&code, coords, days_covering(now, target)).await?;
        let Served { data, path, from_cache } = window;
        let closest = data
            .into_iter()
            .filter_map(|p| hour_start(&p.time).map(|t| ((t - target).num_seconds().abs(), p)))
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, p)| p)
            .ok_or_else(|| WeatherError::NoData(code.to_string()))?;
        Ok(Served {
            data: closest,
            path,
            from_cache,
        })
    }

    /// Every hour the provider returns for `days` days from the start of
    /// today (UTC), memoized per airport and day count.
    async fn forecast_window(
        &self,
        code: &AirportCode,
        coords: Coordinates,
        days: u32,
    ) -> Result<Served<Vec<HourlyWeather>>, WeatherError> {
        let days_key = days.to_string();
        let key = MemoCache::<Served<Vec<HourlyWeather>>>::key(
            "forecast",
            &[code.as_str(), days_key.as_str()],
        );
        if let Some(hit) = self.forecasts.get(&key) {
            debug!("Forecast cache hit for {} ({} days)", code, days);
            return Ok(Served::cached(hit.data, hit.path));
        }

        let args = ForecastArgs {
            latitude: coords.latitude,
            longitude: coords.longitude,
            forecast_days: Some(days),
        };
        let served = serve_with_fallback("weather", &self.link, &args, || async move {
            self.admit()?;
            Ok::<_, WeatherError>(self.api.forecast(coords, days).await?)
        })
        .await?;

        let served = served.map(|forecast| {
            forecast
                .hours
                .iter()
                .map(|point| to_hourly(code, point))
                .collect::<Vec<_>>()
        });
        self.forecasts.insert(key, served.clone());
        Ok(served)
    }

    /// Current conditions, a 24-hour worst-case summary and a risk rating.
    pub async fn get_aviation_weather_briefing(
        &self,
        airport_code: &str,
    ) -> Result<Served<WeatherBriefing>, WeatherError> {
        let current = self.get_current_weather(airport_code).await?;
        let forecast = self.get_hourly_forecast(airport_code, 24).await?;

        let reading = current.data;
        let concerns = operational_concerns(&reading);
        let summary = summarize(&forecast.data, &reading);
        let risk_level = RiskLevel::from_concern_count(concerns.len());

        let briefing = WeatherBriefing {
            airport_code: reading.airport_code.clone(),
            briefing_time: self.clock.utc(),
            current_conditions: reading,
            forecast_24h_summary: summary,
            operational_concerns: concerns,
            risk_level,
            recommendation: risk_level.recommendation().to_string(),
        };
        Ok(Served {
            data: briefing,
            path: current.path,
            from_cache: current.from_cache && forecast.from_cache,
        })
    }
}

fn to_reading(code: &AirportCode, c: &CurrentConditions, now: DateTime<Utc>) -> WeatherReading {
    WeatherReading {
        airport_code: code.to_string(),
        timestamp: now,
        temperature_c: c.temperature_c,
        wind_speed_kts: c.wind_speed_kts,
        wind_direction_deg: c.wind_direction_deg,
        wind_gust_kts: c.wind_gusts_kts,
        visibility_km: visibility_from_weather_code(c.weather_code),
        cloud_coverage_percent: c.cloud_cover_percent,
        precipitation_type: PrecipitationType::classify(c.precipitation_mm, c.temperature_c),
        precipitation_mm: c.precipitation_mm,
        pressure_mb: c.pressure_msl_hpa,
        humidity_percent: c.humidity_percent,
    }
}

/// Forecast days (from the start of today, UTC) needed to reach `until`.
fn days_covering(now: DateTime<Utc>, until: DateTime<Utc>) -> u32 {
    let days = (until.date_naive() - now.date_naive()).num_days() + 1;
    days.clamp(1, i64::from(MAX_FORECAST_DAYS)) as u32
}

/// Start of a provider hour, `YYYY-MM-DDTHH:MM` in UTC.
fn hour_start(time: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M").ok().map(|t| t.and_utc())
}

fn to_hourly(code: &AirportCode, p: &HourlyPoint) -> HourlyWeather {
    HourlyWeather {
        airport_code: code.to_string(),
        time: p.time.clone(),
        temperature_c: p.temperature_c,
        wind_speed_kts: p.wind_speed_kts,
        wind_direction_deg: p.wind_direction_deg,
        visibility_km: visibility_from_weather_code(p.weather_code),
        cloud_coverage_percent: p.cloud_cover_percent,
        precipitation_type: PrecipitationType::classify(p.precipitation_mm, p.temperature_c),
        precipitation_mm: p.precipitation_mm,
        humidity_percent: p.humidity_percent,
    }
}

fn operational_concerns(r: &WeatherReading) -> Vec<String> {
    let checks = [
        (r.wind_speed_kts > 25.0, "Strong winds"),
        (r.wind_gust_kts > 35.0, "Strong gusts"),
        (r.visibility_km < 5.0, "Reduced visibility"),
        (r.precipitation_mm > 5.0, "Heavy precipitation"),
        (r.cloud_coverage_percent > 75.0, "Low ceiling expected"),
    ];
    checks
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, concern)| concern.to_string())
        .collect()
}

/// Worst values across the forecast; falls back to current conditions
/// when the forecast is empty.
fn summarize(hours: &[HourlyWeather], current: &WeatherReading) -> ForecastSummary {
    if hours.is_empty() {
        return ForecastSummary {
            max_wind_speed_kts: current.wind_speed_kts,
            min_visibility_km: current.visibility_km,
            max_precipitation_mm: current.precipitation_mm,
        };
    }
    ForecastSummary {
        max_wind_speed_kts: hours.iter().map(|h| h.wind_speed_kts).fold(f64::MIN, f64::max),
        min_visibility_km: hours.iter().map(|h| h.visibility_km).fold(f64::MAX, f64::min),
        max_precipitation_mm: hours.iter().map(|h| h.precipitation_mm).fold(f64::MIN, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::clock::Clock;
    use crate::config::RateLimitConfig;
    use crate::ratelimit::{RateBudget, SlidingWindowLimiter};
    use crate::server::{router, ToolServerState, WeatherTools};
    use crate::testing::{self, FakeUpstream};
    use crate::types::DataPath;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHORT: Duration = Duration::from_secs(2);

    /// A clock on the first day of the fake provider's forecast.
    fn june_first(hour: u32, minute: u32) -> Arc<ManualClock> {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap())
    }

    struct Harness {
        client: WeatherClient,
        /// Upstream behind the tool server.
        served: FakeUpstream,
        /// Upstream the client calls directly.
        direct: FakeUpstream,
    }

    async fn tool_server(upstream: &FakeUpstream) -> String {
        let base = testing::spawn(testing::open_meteo(upstream.clone())).await;
        let tools = WeatherTools::from_limiter(
            OpenMeteoApi::new(&base, SHORT),
            SlidingWindowLimiter::new(services::OPEN_METEO, RateBudget::per_minute(100)),
        );
        testing::spawn(router(ToolServerState::new(Arc::new(tools)))).await
    }

    fn config(tool_server_url: String, upstream_url: String, max_calls: u32) -> WeatherConfig {
        WeatherConfig {
            tool_server_url,
            upstream_url,
            rate_limit: RateLimitConfig::per_minute(max_calls),
            memo_ttl_seconds: 300,
        }
    }

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig {
            health_seconds: 2,
            tool_seconds: 2,
            direct_seconds: 2,
        }
    }

    async fn harness(server_up: bool, clock: SharedClock) -> Harness {
        let served = FakeUpstream::new();
        let direct = FakeUpstream::new();
        let server_url = if server_up {
            tool_server(&served).await
        } else {
            testing::dead_url().await
        };
        let direct_url = testing::spawn(testing::open_meteo(direct.clone())).await;
        let client = WeatherClient::connect_with_clock(
            &config(server_url, direct_url, 100),
            &timeouts(),
            &RateLimiterRegistry::new(),
            clock,
        )
        .await;
        Harness { client, served, direct }
    }

    #[tokio::test]
    async fn healthy_server_serves_via_mcp_then_cache() {
        let h = harness(true, system_clock()).await;
        let first = h.client.get_current_weather("dxb").await.unwrap();
        assert_eq!(first.path, DataPath::Mcp);
        assert!(!first.from_cache);
        assert_eq!(first.data.airport_code, "DXB");
        assert_eq!(first.data.temperature_c, 36.4);
        assert_eq!(first.data.visibility_km, 10.0);
        assert_eq!(first.data.precipitation_type, PrecipitationType::None);

        let second = h.client.get_current_weather("DXB").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.path, DataPath::Mcp);
        assert_eq!(h.served.calls(), 1);
        assert_eq!(h.direct.calls(), 0);
    }

    #[tokio::test]
    async fn unhealthy_at_construction_never_calls_tool() {
        let tool_calls = Arc::new(AtomicUsize::new(0));
        let counter = tool_calls.clone();
        let sick = Router::new()
            .route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route(
                "/call-tool",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }),
            );
        let server_url = testing::spawn(sick).await;
        let direct = FakeUpstream::new();
        let direct_url = testing::spawn(testing::open_meteo(direct.clone())).await;
        let client = WeatherClient::connect(
            &config(server_url, direct_url, 100),
            &timeouts(),
            &RateLimiterRegistry::new(),
        )
        .await;
        assert!(!client.health().healthy);

        for code in ["DXB", "LHR", "JFK"] {
            let served = client.get_current_weather(code).await.unwrap();
            assert_eq!(served.path, DataPath::Direct);
        }
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
        assert_eq!(direct.calls(), 3);
    }

    #[tokio::test]
    async fn single_tool_failure_degrades_one_request() {
        let h = harness(true, system_clock()).await;
        h.served.set_failing(true);
        let degraded = h.client.get_current_weather("DXB").await.unwrap();
        assert_eq!(degraded.path, DataPath::Direct);
        assert_eq!(h.direct.calls(), 1);

        h.served.set_failing(false);
        let next = h.client.get_current_weather("LHR").await.unwrap();
        assert_eq!(next.path, DataPath::Mcp);
        assert_eq!(h.direct.calls(), 1);
    }

    #[tokio::test]
    async fn both_paths_failing_is_upstream_error() {
        let h = harness(true, system_clock()).await;
        h.served.set_failing(true);
        h.direct.set_failing(true);
        let err = h.client.get_current_weather("DXB").await.unwrap_err();
        assert!(matches!(err, WeatherError::Upstream(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn bad_codes_rejected_before_network() {
        let h = harness(true, system_clock()).await;
        let err = h.client.get_current_weather("D").await.unwrap_err();
        assert!(matches!(err, WeatherError::Validation(ref v) if v.field == "airport_code"));
        let err = h.client.get_current_weather("XYZ").await.unwrap_err();
        assert!(matches!(err, WeatherError::UnsupportedAirport(ref c) if c == "XYZ"));
        assert!(!err.is_retryable());
        assert_eq!(h.served.calls() + h.direct.calls(), 0);
    }

    #[tokio::test]
    async fn forecast_truncated_to_requested_hours() {
        let h = harness(false, june_first(0, 0)).await;
        let forecast = h.client.get_hourly_forecast("LHR", 30).await.unwrap();
        assert_eq!(forecast.path, DataPath::Direct);
        assert_eq!(forecast.data.len(), 30);
        assert_eq!(forecast.data[0].visibility_km, 7.0);
        assert_eq!(forecast.data[0].time, "2024-06-01T00:00");
        assert_eq!(forecast.data[29].time, "2024-06-02T05:00");

        assert!(h.client.get_hourly_forecast("LHR", 0).await.is_err());
        let err = h.client.get_hourly_forecast("LHR", 169).await.unwrap_err();
        assert!(matches!(err, WeatherError::Validation(ref v) if v.field == "hours"));
    }

    #[tokio::test]
    async fn forecast_skips_hours_already_past() {
        let clock = june_first(15, 20);
        let h = harness(false, clock.clone()).await;
        let forecast = h.client.get_hourly_forecast("LHR", 30).await.unwrap();
        assert_eq!(forecast.data.len(), 30);
        assert_eq!(forecast.data[0].time, "2024-06-01T15:00");
        assert_eq!(forecast.data[0].wind_speed_kts, 25.0);
        assert_eq!(forecast.data[29].time, "2024-06-02T20:00");

        // Same window from the memo, re-sliced at the later hour.
        clock.advance(chrono::Duration::hours(2));
        let later = h.client.get_hourly_forecast("LHR", 30).await.unwrap();
        assert!(later.from_cache);
        assert_eq!(later.data[0].time, "2024-06-01T17:00");
        assert_eq!(h.direct.calls(), 1);
    }

    #[tokio::test]
    async fn weather_at_time_picks_closest_hour() {
        let clock = june_first(15, 0);
        let h = harness(true, clock.clone()).await;
        let now = clock.utc();

        let err = h
            .client
            .get_weather_at_time("DXB", now - chrono::Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::Validation(ref v) if v.field == "target_time"));
        let err = h
            .client
            .get_weather_at_time("DXB", now + chrono::Duration::hours(200))
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::Validation(_)));
        assert_eq!(h.served.calls(), 0);

        let hour = h
            .client
            .get_weather_at_time("DXB", now + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(hour.data.time, "2024-06-01T16:00");
        assert_eq!(hour.data.wind_speed_kts, 26.0);
        assert_eq!(hour.path, DataPath::Mcp);

        let target = now + chrono::Duration::minutes(20);
        let hour = h.client.get_weather_at_time("DXB", target).await.unwrap();
        assert_eq!(hour.data.time, "2024-06-01T15:00");
        assert!(hour.from_cache);

        let target = Utc.with_ymd_and_hms(2024, 6, 2, 8, 40, 0).unwrap();
        let hour = h.client.get_weather_at_time("DXB", target).await.unwrap();
        assert_eq!(hour.data.time, "2024-06-02T09:00");
        assert_eq!(hour.data.wind_speed_kts, 19.0);
    }

    #[test]
    fn provider_hours_parse_as_utc() {
        let start = hour_start("2024-06-01T16:00").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 1, 16, 0, 0).unwrap());
        assert!(hour_start("2024-06-01").is_none());

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap();
        assert_eq!(days_covering(now, now + chrono::Duration::hours(8)), 1);
        assert_eq!(days_covering(now, now + chrono::Duration::hours(9)), 2);
        assert_eq!(days_covering(now, now + chrono::Duration::hours(168)), 8);
    }

    #[tokio::test]
    async fn briefing_summarises_next_day() {
        let h = harness(true, june_first(0, 0)).await;
        let briefing = h.client.get_aviation_weather_briefing("DXB").await.unwrap();
        let b = &briefing.data;
        assert_eq!(b.airport_code, "DXB");
        assert!(b.operational_concerns.is_empty());
        assert_eq!(b.risk_level, RiskLevel::Low);
        assert_eq!(b.recommendation, "Normal operations expected");
        assert_eq!(b.forecast_24h_summary.max_wind_speed_kts, 33.0);
        assert_eq!(b.forecast_24h_summary.min_visibility_km, 7.0);
        assert_eq!(b.forecast_24h_summary.max_precipitation_mm, 0.0);
        assert_eq!(briefing.path, DataPath::Mcp);
    }

    #[test]
    fn concerns_follow_thresholds() {
        let reading = WeatherReading {
            airport_code: "ORD".into(),
            timestamp: Utc::now(),
            temperature_c: -2.0,
            wind_speed_kts: 30.0,
            wind_direction_deg: 270.0,
            wind_gust_kts: 40.0,
            visibility_km: 2.0,
            cloud_coverage_percent: 90.0,
            precipitation_type: PrecipitationType::Snow,
            precipitation_mm: 6.0,
            pressure_mb: 990.0,
            humidity_percent: 95.0,
        };
        let concerns = operational_concerns(&reading);
        assert_eq!(
            concerns,
            vec![
                "Strong winds",
                "Strong gusts",
                "Reduced visibility",
                "Heavy precipitation",
                "Low ceiling expected"
            ]
        );
        assert_eq!(RiskLevel::from_concern_count(concerns.len()), RiskLevel::Critical);
        assert_eq!(summarize(&[], &reading).min_visibility_km, 2.0);
    }

    #[tokio::test]
    async fn exhausted_budget_is_retryable() {
        let served = FakeUpstream::new();
        let direct_url = testing::spawn(testing::open_meteo(served.clone())).await;
        let client = WeatherClient::connect(
            &config(testing::dead_url().await, direct_url, 1),
            &timeouts(),
            &RateLimiterRegistry::new(),
        )
        .await;
        client.get_current_weather("DXB").await.unwrap();
        let err = client.get_current_weather("LHR").await.unwrap_err();
        assert!(matches!(err, WeatherError::RateLimited));
        assert!(err.is_retryable());
        assert_eq!(served.calls(), 1);
    }

    #[test]
    fn airport_table_lookup() {
        let coords = airport_coordinates(&AirportCode::parse("syd").unwrap()).unwrap();
        assert_eq!(coords.latitude, -33.9399);
        assert!(airport_coordinates(&AirportCode::parse("ZZZ").unwrap()).is_none());
    }
}
