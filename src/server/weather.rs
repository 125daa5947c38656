//! Weather tool server backed by Open-Meteo.

use super::{admit, to_result};
use crate::ratelimit::{RateLimiter, SlidingWindowLimiter};
use crate::tools::args::{CurrentWeatherArgs, ForecastArgs};
use crate::tools::{ToolArgs, ToolDescriptor, ToolError, ToolProvider};
use crate::upstream::openmeteo::{self, OpenMeteoApi};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct WeatherTools {
    api: OpenMeteoApi,
    limiter: Arc<dyn RateLimiter>,
}

impl WeatherTools {
    pub fn new(api: OpenMeteoApi, limiter: Arc<dyn RateLimiter>) -> Self {
        Self { api, limiter }
    }

    pub fn from_limiter(api: OpenMeteoApi, limiter: SlidingWindowLimiter) -> Self {
        Self::new(api, Arc::new(limiter))
    }

    async fn current(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = CurrentWeatherArgs::parse(arguments)?;
        admit(self.limiter.as_ref(), openmeteo::PROVIDER)?;
        to_result(self.api.current(args.coordinates()?).await?)
    }

    async fn forecast(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = ForecastArgs::parse(arguments)?;
        admit(self.limiter.as_ref(), openmeteo::PROVIDER)?;
        to_result(self.api.forecast(args.coordinates()?, args.days()).await?)
    }
}

#[async_trait]
impl ToolProvider for WeatherTools {
    fn service(&self) -> &'static str {
        "openmeteo-tools"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![CurrentWeatherArgs::descriptor(), ForecastArgs::descriptor()]
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            n if n == CurrentWeatherArgs::NAME => self.current(arguments).await,
            n if n == ForecastArgs::NAME => self.forecast(arguments).await,
            _ => Err(self.unknown_tool(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateBudget;
    use crate::testing::{self, FakeUpstream};
    use serde_json::json;
    use std::time::Duration;

    async fn tools(budget: u32) -> (WeatherTools, FakeUpstream) {
        let upstream = FakeUpstream::new();
        let base = testing::spawn(testing::open_meteo(upstream.clone())).await;
        let api = OpenMeteoApi::new(&base, Duration::from_secs(5));
        let limiter =
            SlidingWindowLimiter::new(openmeteo::PROVIDER, RateBudget::per_minute(budget));
        (WeatherTools::from_limiter(api, limiter), upstream)
    }

    #[tokio::test]
    async fn current_weather_is_normalised() {
        let (tools, upstream) = tools(10).await;
        let result = tools
            .call("get_current_weather", json!({"latitude": 25.2532, "longitude": 55.3657}))
            .await
            .unwrap();
        assert_eq!(result["temperature_c"], 36.4);
        assert_eq!(result["wind_speed_kts"], 14.0);
        assert_eq!(result["units"]["wind_speed_10m"], "kn");
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn forecast_honours_days() {
        let (tools, _) = tools(10).await;
        let result = tools
            .call(
                "get_forecast",
                json!({"latitude": 51.47, "longitude": -0.4543, "forecast_days": 2}),
            )
            .await
            .unwrap();
        assert_eq!(result["hours"].as_array().unwrap().len(), 48);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_upstream() {
        let (tools, upstream) = tools(10).await;
        let err = tools
            .call("get_current_weather", json!({"latitude": 95.0, "longitude": 0.0}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(ref v) if v.field == "latitude"));
        let err = tools.call("get_forecast", json!({"longitude": 0.0})).await.unwrap_err();
        assert!(err.to_string().contains("latitude"));
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let (tools, upstream) = tools(10).await;
        upstream.set_failing(true);
        let err = tools
            .call("get_current_weather", json!({"latitude": 1.0, "longitude": 1.0}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_rate_limited() {
        let (tools, upstream) = tools(1).await;
        let args = json!({"latitude": 1.0, "longitude": 1.0});
        tools.call("get_current_weather", args.clone()).await.unwrap();
        let err = tools.call("get_current_weather", args).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(upstream.calls(), 1);
    }
}
