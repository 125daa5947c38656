//! Flight-tracking tool server backed by AviationStack. Refuses to start
//! without an API key.

use super::{admit, to_result};
use crate::ratelimit::RateLimiter;
use crate::tools::args::{AirportInfoArgs, HistoricalFlightsArgs, RealTimeFlightsArgs};
use crate::tools::{ToolArgs, ToolDescriptor, ToolError, ToolProvider};
use crate::upstream::aviationstack::{self, AviationStackApi};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct FlightTools {
    api: AviationStackApi,
    limiter: Arc<dyn RateLimiter>,
}

impl FlightTools {
    /// Build the provider. An absent or blank key is a startup error.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        let key = match api_key.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => bail!("AVIATIONSTACK_API_KEY is not configured; the flights tool server cannot start"),
        };
        Ok(Self {
            api: AviationStackApi::new(base_url, key, timeout),
            limiter,
        })
    }

    async fn real_time(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = RealTimeFlightsArgs::parse(arguments)?;
        admit(self.limiter.as_ref(), aviationstack::PROVIDER)?;
        to_result(self.api.flights(&args.query, None, args.limit()).await?)
    }

    async fn historical(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = HistoricalFlightsArgs::parse(arguments)?;
        admit(self.limiter.as_ref(), aviationstack::PROVIDER)?;
        to_result(
            self.api
                .flights(&args.query, Some(args.flight_date), args.limit())
                .await?,
        )
    }

    async fn airport_info(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = AirportInfoArgs::parse(arguments)?;
        admit(self.limiter.as_ref(), aviationstack::PROVIDER)?;
        to_result(self.api.airport(&args.airport_iata).await?)
    }
}

#[async_trait]
impl ToolProvider for FlightTools {
    fn service(&self) -> &'static str {
        "aviationstack-tools"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            RealTimeFlightsArgs::descriptor(),
            HistoricalFlightsArgs::descriptor(),
            AirportInfoArgs::descriptor(),
        ]
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            n if n == RealTimeFlightsArgs::NAME => self.real_time(arguments).await,
            n if n == HistoricalFlightsArgs::NAME => self.historical(arguments).await,
            n if n == AirportInfoArgs::NAME => self.airport_info(arguments).await,
            _ => Err(self.unknown_tool(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{RateBudget, SlidingWindowLimiter};
    use crate::server::{router, ToolServerState};
    use crate::testing::{self, FakeUpstream, AVIATIONSTACK_KEY};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn limiter() -> Arc<dyn RateLimiter> {
        Arc::new(SlidingWindowLimiter::new(aviationstack::PROVIDER, RateBudget::per_minute(100)))
    }

    async fn tools_with_key(key: &str) -> (FlightTools, FakeUpstream) {
        let upstream = FakeUpstream::new();
        let base = testing::spawn(testing::aviationstack(upstream.clone())).await;
        let tools = FlightTools::new(&base, Some(key), Duration::from_secs(5), limiter()).unwrap();
        (tools, upstream)
    }

    #[test]
    fn refuses_to_start_without_key() {
        let timeout = Duration::from_secs(1);
        assert!(FlightTools::new("http://localhost", None, timeout, limiter()).is_err());
        assert!(FlightTools::new("http://localhost", Some("  "), timeout, limiter()).is_err());
    }

    #[tokio::test]
    async fn real_time_flights_carry_pagination_and_records() {
        let (tools, _) = tools_with_key(AVIATIONSTACK_KEY).await;
        let result = tools
            .call(
                "get_real_time_flights",
                json!({"dep_iata": "dxb", "arr_iata": "LHR", "limit": 5}),
            )
            .await
            .unwrap();
        assert_eq!(result["pagination"]["count"], 2);
        assert_eq!(result["data"][0]["departure_airport"], "DXB");
        assert_eq!(result["data"][1]["delay_minutes"], 40);
    }

    #[tokio::test]
    async fn historical_requires_date() {
        let (tools, upstream) = tools_with_key(AVIATIONSTACK_KEY).await;
        let err = tools
            .call("get_historical_flights", json!({"dep_iata": "DXB"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("flight_date"));
        assert_eq!(upstream.calls(), 0);

        let result = tools
            .call("get_historical_flights", json!({"flight_date": "2024-02-10", "dep_iata": "DXB"}))
            .await
            .unwrap();
        assert_eq!(result["data"][0]["scheduled_departure"], "2024-02-10T10:00:00+00:00");
    }

    #[tokio::test]
    async fn provider_error_body_is_structured_failure() {
        let (tools, _) = tools_with_key("wrong-key").await;
        let err = tools.call("get_real_time_flights", json!({})).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("invalid_access_key"));
    }

    #[tokio::test]
    async fn unknown_airport_is_not_found_over_http() {
        let (tools, _) = tools_with_key(AVIATIONSTACK_KEY).await;
        let app = router(ToolServerState::new(Arc::new(tools)));
        let request = Request::builder()
            .method("POST")
            .uri("/call-tool")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({"name": "get_airport_info", "arguments": {"airport_iata": "ZZZ"}})
                    .to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["tool"], "get_airport_info");
        assert!(body["error"].as_str().unwrap().contains("ZZZ"));
    }

    #[tokio::test]
    async fn airport_info_found() {
        let (tools, _) = tools_with_key(AVIATIONSTACK_KEY).await;
        let result = tools.call("get_airport_info", json!({"airport_iata": "dxb"})).await.unwrap();
        assert_eq!(result["iata_code"], "DXB");
        assert_eq!(result["latitude"], 25.252778);
    }
}
