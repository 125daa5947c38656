//! Flight-tracking client (AviationStack).
//!
//! The API key is only needed for the direct path; without one the client
//! still works while its tool server does.

use super::{serve_with_fallback, ServerLink};
use crate::cache::MemoCache;
use crate::clock::{system_clock, SharedClock};
use crate::config::{FlightsConfig, TimeoutConfig};
use crate::ratelimit::{services, RateLimiter, RateLimiterRegistry};
use crate::tools::args::{
    AirportInfoArgs, HistoricalFlightsArgs, RealTimeFlightsArgs, MAX_FLIGHT_LIMIT,
};
use crate::tools::ToolArgs;
use crate::types::{AirportInfo, DataPath, FlightRecord, HealthStatus, RouteStatistics, Served};
use crate::upstream::aviationstack::FlightQuery;
use crate::upstream::{AviationStackApi, UpstreamError};
use crate::validate::{in_range, AirportCode, FlightDate, ValidationError};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_DAYS_BACK: u32 = 90;

/// A flight counts as on time up to this many minutes late.
pub const ON_TIME_THRESHOLD_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum FlightError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("flight tracking not configured: tool server unavailable and AVIATIONSTACK_API_KEY not set")]
    NotConfigured,

    #[error("aviationstack rate limit exceeded, retry later")]
    RateLimited,

    #[error("{0}")]
    NotFound(String),

    #[error("flight lookup failed: {0}")]
    Upstream(UpstreamError),
}

impl From<UpstreamError> for FlightError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound { message, .. } => Self::NotFound(message),
            UpstreamError::RateLimited(_) => Self::RateLimited,
            other => Self::Upstream(other),
        }
    }
}

impl FlightError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Upstream(e) => e.is_retryable(),
            Self::Validation(_) | Self::NotConfigured | Self::NotFound(_) => false,
        }
    }
}

pub struct FlightClient {
    link: ServerLink,
    api: Option<AviationStackApi>,
    limiter: Arc<dyn RateLimiter>,
    clock: SharedClock,
    historical: MemoCache<Served<Vec<FlightRecord>>>,
    airports: MemoCache<Served<AirportInfo>>,
}

impl FlightClient {
    pub async fn connect(
        config: &FlightsConfig,
        timeouts: &TimeoutConfig,
        limiters: &RateLimiterRegistry,
    ) -> Self {
        Self::connect_with_clock(config, timeouts, limiters, system_clock()).await
    }

    pub async fn connect_with_clock(
        config: &FlightsConfig,
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
        let api = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|key| AviationStackApi::new(&config.upstream_url, key, timeouts.direct()));
        if api.is_none() {
            info!("AVIATIONSTACK_API_KEY not set, direct flight lookups disabled");
        }

        let memo_ttl = Duration::from_secs(config.memo_ttl_seconds);
        Self {
            link,
            api,
            limiter: limiters.limiter_for(services::AVIATIONSTACK, config.rate_limit.budget()),
            clock,
            historical: MemoCache::new(memo_ttl, 1_000),
            airports: MemoCache::new(memo_ttl, 1_000),
        }
    }

    pub fn health(&self) -> HealthStatus {
        self.link.health()
    }

    /// The direct adapter, after taking one unit of budget.
    fn direct(&self) -> Result<&AviationStackApi, FlightError> {
        let api = self.api.as_ref().ok_or(FlightError::NotConfigured)?;
        if !self.limiter.admit() {
            return Err(FlightError::RateLimited);
        }
        Ok(api)
    }

    /// Flights currently tracked, filtered by `query`. `limit` is 1-100.
    pub async fn get_real_time_flights(
        &self,
        query: &FlightQuery,
        limit: u32,
    ) -> Result<Served<Vec<FlightRecord>>, FlightError> {
        let args = RealTimeFlightsArgs {
            query: query.clone(),
            limit: Some(limit),
        }
        .checked()?;

        let (query, limit) = (&args.query, args.limit());
        let served = serve_with_fallback("flights", &self.link, &args, || async move {
            let api = self.direct()?;
            Ok::<_, FlightError>(api.flights(query, None, limit).await?)
        })
        .await?;
        debug!("{} real-time flights via {}", served.data.data.len(), served.path);
        Ok(served.map(|page| page.data))
    }

    /// Flights on `flight_date` (YYYY-MM-DD), memoized per query.
    pub async fn get_historical_flights(
        &self,
        flight_date: &str,
        query: &FlightQuery,
    ) -> Result<Served<Vec<FlightRecord>>, FlightError> {
        let args = HistoricalFlightsArgs {
            flight_date: FlightDate::parse(flight_date)?,
            query: query.clone(),
            limit: Some(MAX_FLIGHT_LIMIT),
        }
        .checked()?;

        let date = args.flight_date.to_string();
        let field = |v: &Option<String>| v.clone().unwrap_or_default();
        let (flight, dep, arr) = (
            field(&args.query.flight_iata),
            field(&args.query.dep_iata),
            field(&args.query.arr_iata),
        );
        let key = MemoCache::<Served<Vec<FlightRecord>>>::key(
            "historical",
            &[date.as_str(), flight.as_str(), dep.as_str(), arr.as_str()],
        );
        if let Some(hit) = self.historical.get(&key) {
            debug!("Historical flights cache hit for {}", key);
            return Ok(Served::cached(hit.data, hit.path));
        }

        let (query, day, limit) = (&args.query, args.flight_date, args.limit());
        let served = serve_with_fallback("flights", &self.link, &args, || async move {
            let api = self.direct()?;
            Ok::<_, FlightError>(api.flights(query, Some(day), limit).await?)
        })
        .await?;

        let served = served.map(|page| page.data);
        self.historical.insert(key, served.clone());
        Ok(served)
    }

    /// Flights on the route over the last `days_back` days (1-90), today
    /// included. Days that fail are logged and skipped; the call only
    /// fails when every day failed.
    pub async fn get_flight_route_history(
        &self,
        dep_iata: &str,
        arr_iata: &str,
        days_back: u32,
    ) -> Result<Served<Vec<FlightRecord>>, FlightError> {
        let dep = AirportCode::parse_field(dep_iata, "dep_iata")?;
        let arr = AirportCode::parse_field(arr_iata, "arr_iata")?;
        let days_back = in_range("days_back", days_back, 1, MAX_DAYS_BACK)?;
        let query = FlightQuery::route(dep.as_str(), arr.as_str());
        let today = self.clock.utc().date_naive();

        let mut flights = Vec::new();
        let mut all_mcp = true;
        let mut all_cached = true;
        let mut succeeded = 0;
        let mut last_error = None;

        for offset in 0..days_back {
            let date = (today - ChronoDuration::days(offset as i64)).format("%Y-%m-%d").to_string();
            match self.get_historical_flights(&date, &query).await {
                Ok(day) => {
                    succeeded += 1;
                    all_mcp &= day.path == DataPath::Mcp;
                    all_cached &= day.from_cache;
                    flights.extend(day.data);
                }
                Err(e) => {
                    warn!("Failed to fetch {} → {} flights for {}: {}", dep, arr, date, e);
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        info!("{} → {}: {} flights over {} days", dep, arr, flights.len(), days_back);
        let path = if all_mcp { DataPath::Mcp } else { DataPath::Direct };
        Ok(Served {
            data: flights,
            path,
            from_cache: all_cached,
        })
    }

    /// Delay statistics over a set of flights; `None` when there are none.
    pub fn calculate_route_statistics(flights: &[FlightRecord]) -> Option<RouteStatistics> {
        let first = flights.first()?;
        let delays: Vec<i64> = flights.iter().filter_map(|f| f.delay_minutes).collect();
        let on_time = delays.iter().filter(|d| **d <= ON_TIME_THRESHOLD_MINUTES).count();
        let delayed = delays.len() - on_time;

        let (avg, on_time_pct, delayed_pct) = if delays.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let n = delays.len() as f64;
            (
                delays.iter().sum::<i64>() as f64 / n,
                on_time as f64 / n * 100.0,
                delayed as f64 / n * 100.0,
            )
        };

        Some(RouteStatistics {
            route: format!("{} → {}", first.departure_airport, first.arrival_airport),
            total_flights: flights.len(),
            avg_delay_minutes: round2(avg),
            max_delay_minutes: delays.iter().copied().max().unwrap_or(0),
            on_time_percentage: round2(on_time_pct),
            delay_percentage: round2(delayed_pct),
            total_delayed: delayed,
            total_on_time: on_time,
        })
    }

    /// Reference data for one airport, memoized.
    pub async fn get_airport_info(
        &self,
        airport_iata: &str,
    ) -> Result<Served<AirportInfo>, FlightError> {
        let args = AirportInfoArgs {
            airport_iata: airport_iata.to_string(),
        }
        .checked()?;

        let key = MemoCache::<Served<AirportInfo>>::key("airport", &[args.airport_iata.as_str()]);
        if let Some(hit) = self.airports.get(&key) {
            return Ok(Served::cached(hit.data, hit.path));
        }

        let code = args.airport_iata.as_str();
        let served = serve_with_fallback("flights", &self.link, &args, || async move {
            let api = self.direct()?;
            Ok::<_, FlightError>(api.airport(code).await?)
        })
        .await?;
        self.airports.insert(key, served.clone());
        Ok(served)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::config::RateLimitConfig;
    use crate::ratelimit::{RateBudget, SlidingWindowLimiter};
    use crate::server::{router, FlightTools, ToolServerState};
    use crate::testing::{self, FakeUpstream, AVIATIONSTACK_KEY};
    use chrono::{TimeZone, Utc};

    const SHORT: Duration = Duration::from_secs(2);

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig {
            health_seconds: 2,
            tool_seconds: 2,
            direct_seconds: 2,
        }
    }

    async fn tool_server(upstream: &FakeUpstream) -> String {
        let base = testing::spawn(testing::aviationstack(upstream.clone())).await;
        let limiter = Arc::new(SlidingWindowLimiter::new(
            services::AVIATIONSTACK,
            RateBudget::per_minute(500),
        ));
        let tools = FlightTools::new(&base, Some(AVIATIONSTACK_KEY), SHORT, limiter).unwrap();
        testing::spawn(router(ToolServerState::new(Arc::new(tools)))).await
    }

    struct Harness {
        client: FlightClient,
        served: FakeUpstream,
        direct: FakeUpstream,
    }

    async fn harness(server_up: bool, api_key: Option<&str>, clock: SharedClock) -> Harness {
        let served = FakeUpstream::new();
        let direct = FakeUpstream::new();
        let tool_server_url = if server_up {
            tool_server(&served).await
        } else {
            testing::dead_url().await
        };
        let config = FlightsConfig {
            tool_server_url,
            upstream_url: testing::spawn(testing::aviationstack(direct.clone())).await,
            api_key: api_key.map(String::from),
            rate_limit: RateLimitConfig::per_minute(500),
            memo_ttl_seconds: 600,
        };
        let client = FlightClient::connect_with_clock(
            &config,
            &timeouts(),
            &RateLimiterRegistry::new(),
            clock,
        )
        .await;
        Harness { client, served, direct }
    }

    fn record(dep: &str, arr: &str, delay: Option<i64>) -> FlightRecord {
        FlightRecord {
            flight_number: "EK1".into(),
            airline: "Emirates".into(),
            departure_airport: dep.into(),
            arrival_airport: arr.into(),
            scheduled_departure: None,
            actual_departure: None,
            scheduled_arrival: None,
            actual_arrival: None,
            flight_status: "landed".into(),
            delay_minutes: delay,
            terminal: None,
            gate: None,
        }
    }

    #[tokio::test]
    async fn real_time_via_server_then_direct() {
        let h = harness(true, Some(AVIATIONSTACK_KEY), system_clock()).await;
        let served = h
            .client
            .get_real_time_flights(&FlightQuery::route("dxb", "lhr"), 10)
            .await
            .unwrap();
        assert_eq!(served.path, DataPath::Mcp);
        assert_eq!(served.data.len(), 2);
        assert_eq!(served.data[0].departure_airport, "DXB");
        assert_eq!(served.data[1].delay_minutes, Some(40));

        h.served.set_failing(true);
        let served = h
            .client
            .get_real_time_flights(&FlightQuery::flight("EK1"), 10)
            .await
            .unwrap();
        assert_eq!(served.path, DataPath::Direct);
        assert_eq!(h.direct.calls(), 1);
    }

    #[tokio::test]
    async fn no_key_and_no_server_fails_fast() {
        let h = harness(false, None, system_clock()).await;
        let err = h
            .client
            .get_real_time_flights(&FlightQuery::default(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, FlightError::NotConfigured));
        assert!(!err.is_retryable());
        assert_eq!(h.direct.calls(), 0);
    }

    #[tokio::test]
    async fn server_path_works_without_key() {
        let h = harness(true, None, system_clock()).await;
        let info = h.client.get_airport_info("DXB").await.unwrap();
        assert_eq!(info.path, DataPath::Mcp);
        assert_eq!(info.data.icao_code.as_deref(), Some("OMDB"));
    }

    #[tokio::test]
    async fn limit_and_codes_validated_locally() {
        let h = harness(true, Some(AVIATIONSTACK_KEY), system_clock()).await;
        let err = h
            .client
            .get_real_time_flights(&FlightQuery::default(), 101)
            .await
            .unwrap_err();
        assert!(matches!(err, FlightError::Validation(ref v) if v.field == "limit"));
        let err = h
            .client
            .get_historical_flights("2024-13-01", &FlightQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FlightError::Validation(ref v) if v.field == "flight_date"));
        let err = h.client.get_airport_info("D").await.unwrap_err();
        assert!(matches!(err, FlightError::Validation(_)));
        assert_eq!(h.served.calls() + h.direct.calls(), 0);
    }

    #[tokio::test]
    async fn historical_is_memoized() {
        let h = harness(false, Some(AVIATIONSTACK_KEY), system_clock()).await;
        let query = FlightQuery::route("DXB", "LHR");
        let first = h.client.get_historical_flights("2024-02-10", &query).await.unwrap();
        assert_eq!(first.path, DataPath::Direct);
        assert_eq!(first.data[0].scheduled_departure.as_deref(), Some("2024-02-10T10:00:00+00:00"));
        let again = h.client.get_historical_flights("2024-02-10", &query).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(h.direct.calls(), 1);
    }

    #[tokio::test]
    async fn route_history_covers_each_day() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        let h = harness(true, Some(AVIATIONSTACK_KEY), clock).await;
        let history = h.client.get_flight_route_history("DXB", "LHR", 3).await.unwrap();
        assert_eq!(history.data.len(), 6);
        assert_eq!(history.path, DataPath::Mcp);
        let dates: Vec<_> = history
            .data
            .iter()
            .filter_map(|f| f.scheduled_departure.as_deref().map(|s| &s[..10]))
            .collect();
        assert!(dates.contains(&"2024-03-10"));
        assert!(dates.contains(&"2024-03-08"));
        assert!(!dates.contains(&"2024-03-07"));

        let err = h.client.get_flight_route_history("DXB", "LHR", 91).await.unwrap_err();
        assert!(matches!(err, FlightError::Validation(ref v) if v.field == "days_back"));
    }

    #[tokio::test]
    async fn route_history_fails_only_when_every_day_fails() {
        let h = harness(false, Some(AVIATIONSTACK_KEY), system_clock()).await;
        h.direct.set_failing(true);
        let err = h.client.get_flight_route_history("DXB", "LHR", 2).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_airport_is_not_found() {
        let h = harness(false, Some(AVIATIONSTACK_KEY), system_clock()).await;
        let err = h.client.get_airport_info("ZZZ").await.unwrap_err();
        assert!(matches!(err, FlightError::NotFound(ref m) if m.contains("ZZZ")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_rate_limit_maps_to_rate_limited() {
        let err = FlightError::from(UpstreamError::RateLimited("aviationstack"));
        assert!(matches!(err, FlightError::RateLimited));
        assert!(err.is_retryable());
        let err = FlightError::from(UpstreamError::provider("aviationstack", "invalid_access_key"));
        assert!(matches!(err, FlightError::Upstream(_)));
    }

    #[test]
    fn statistics_round_and_count() {
        let flights = vec![
            record("DXB", "LHR", Some(5)),
            record("DXB", "LHR", Some(40)),
            record("DXB", "LHR", Some(16)),
            record("DXB", "LHR", None),
        ];
        let stats = FlightClient::calculate_route_statistics(&flights).unwrap();
        assert_eq!(stats.route, "DXB → LHR");
        assert_eq!(stats.total_flights, 4);
        assert_eq!(stats.avg_delay_minutes, 20.33);
        assert_eq!(stats.max_delay_minutes, 40);
        assert_eq!(stats.total_on_time, 1);
        assert_eq!(stats.total_delayed, 2);
        assert_eq!(stats.on_time_percentage, 33.33);
        assert_eq!(stats.delay_percentage, 66.67);

        assert!(FlightClient::calculate_route_statistics(&[]).is_none());
        let no_delays =
            FlightClient::calculate_route_statistics(&[record("A1", "B2", None)]).unwrap();
        assert_eq!(no_delays.on_time_percentage, 0.0);
    }
}
