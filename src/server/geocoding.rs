//! Geocoding tool server backed by Google Maps. Refuses to start without
//! an API key.

use super::{admit, to_result};
use crate::ratelimit::RateLimiter;
use crate::tools::args::{DistanceMatrixArgs, GeocodeArgs, ReverseGeocodeArgs, TimezoneArgs};
use crate::tools::{ToolArgs, ToolDescriptor, ToolError, ToolProvider};
use crate::upstream::googlemaps::{self, GoogleMapsApi};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct GeocodingTools {
    api: GoogleMapsApi,
    limiter: Arc<dyn RateLimiter>,
}

impl GeocodingTools {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
        limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        let key = match api_key.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => bail!("GOOGLE_MAPS_API_KEY is not configured; the geocoding tool server cannot start"),
        };
        Ok(Self {
            api: GoogleMapsApi::new(base_url, key, timeout),
            limiter,
        })
    }

    fn admit(&self) -> Result<(), ToolError> {
        admit(self.limiter.as_ref(), googlemaps::PROVIDER)
    }

    async fn geocode(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = GeocodeArgs::parse(arguments)?;
        self.admit()?;
        to_result(self.api.geocode(&args.address).await?)
    }

    async fn reverse_geocode(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = ReverseGeocodeArgs::parse(arguments)?;
        self.admit()?;
        to_result(self.api.reverse_geocode(args.coordinates()?).await?)
    }

    async fn timezone(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = TimezoneArgs::parse(arguments)?;
        self.admit()?;
        to_result(self.api.timezone(args.coordinates()?, args.timestamp).await?)
    }

    async fn distance_matrix(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = DistanceMatrixArgs::parse(arguments)?;
        self.admit()?;
        to_result(
            self.api
                .distance_matrix(&args.origins, &args.destinations, args.mode())
                .await?,
        )
    }
}

#[async_trait]
impl ToolProvider for GeocodingTools {
    fn service(&self) -> &'static str {
        "googlemaps-tools"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            GeocodeArgs::descriptor(),
            ReverseGeocodeArgs::descriptor(),
            TimezoneArgs::descriptor(),
            DistanceMatrixArgs::descriptor(),
        ]
    }

    async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            n if n == GeocodeArgs::NAME => self.geocode(arguments).await,
            n if n == ReverseGeocodeArgs::NAME => self.reverse_geocode(arguments).await,
            n if n == TimezoneArgs::NAME => self.timezone(arguments).await,
            n if n == DistanceMatrixArgs::NAME => self.distance_matrix(arguments).await,
            _ => Err(self.unknown_tool(name)),
        }
    }
}
