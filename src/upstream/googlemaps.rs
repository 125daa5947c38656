//! Google Maps Platform: geocoding, timezone and distance matrix.

use super::{fetch_json, trim_base, UpstreamError};
use crate::types::{
    AddressComponent, DistanceElement, DistanceMatrix, GeocodeResult, ReverseGeocodeResult,
    TimezoneInfo,
};
use crate::validate::Coordinates;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER: &str = "google-maps";

/// Travel modes accepted by the distance matrix.
pub const TRAVEL_MODES: &[&str] = &["driving", "walking", "bicycling", "transit"];

// -- Raw provider shapes ------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<RawGeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct RawGeocodeResult {
    formatted_address: String,
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    geometry: RawGeometry,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    location: RawLatLng,
    #[serde(default)]
    location_type: Option<String>,
    #[serde(default)]
    viewport: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTimezoneResponse {
    status: String,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
    #[serde(default)]
    time_zone_id: Option<String>,
    #[serde(default)]
    time_zone_name: Option<String>,
    #[serde(default)]
    raw_offset: i64,
    #[serde(default)]
    dst_offset: i64,
}

#[derive(Debug, Deserialize)]
struct RawMatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    origin_addresses: Vec<String>,
    #[serde(default)]
    destination_addresses: Vec<String>,
    #[serde(default)]
    rows: Vec<RawMatrixRow>,
}

#[derive(Debug, Deserialize)]
struct RawMatrixRow {
    #[serde(default)]
    elements: Vec<RawMatrixElement>,
}

#[derive(Debug, Deserialize)]
struct RawMatrixElement {
    status: String,
    #[serde(default)]
    distance: Option<RawTextValue>,
    #[serde(default)]
    duration: Option<RawTextValue>,
}

#[derive(Debug, Deserialize)]
struct RawTextValue {
    text: String,
    value: i64,
}

/// Map a non-`OK` API status to an error. `ZERO_RESULTS` means the lookup
/// was valid but matched nothing.
fn check_status(
    status: &str,
    error_message: Option<&str>,
    what: &str,
) -> Result<(), UpstreamError> {
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" | "NOT_FOUND" => Err(UpstreamError::not_found(
            PROVIDER,
            format!("{what}: no results"),
        )),
        "OVER_QUERY_LIMIT" => Err(UpstreamError::RateLimited(PROVIDER)),
        other => Err(UpstreamError::provider(
            PROVIDER,
            format!("{what} failed: {}", error_message.unwrap_or(other)),
        )),
    }
}

impl From<RawGeocodeResult> for GeocodeResult {
    fn from(raw: RawGeocodeResult) -> Self {
        Self {
            latitude: raw.geometry.location.lat,
            longitude: raw.geometry.location.lng,
            formatted_address: raw.formatted_address,
            place_id: raw.place_id,
            location_type: raw.geometry.location_type,
            address_components: raw.address_components,
            viewport: raw.geometry.viewport,
        }
    }
}

impl From<RawMatrixElement> for DistanceElement {
    fn from(raw: RawMatrixElement) -> Self {
        let ok = raw.status == "OK";
        let (distance_meters, distance_text) = match raw.distance.filter(|_| ok) {
            Some(d) => (Some(d.value), Some(d.text)),
            None => (None, None),
        };
        let (duration_seconds, duration_text) = match raw.duration.filter(|_| ok) {
            Some(d) => (Some(d.value), Some(d.text)),
            None => (None, None),
        };
        Self {
            status: raw.status,
            distance_meters,
            distance_text,
            duration_seconds,
            duration_text,
        }
    }
}

/// Google Maps REST adapter.
#[derive(Debug, Clone)]
pub struct GoogleMapsApi {
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl GoogleMapsApi {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            base_url: trim_base(base_url),
            api_key: api_key.to_string(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/maps/api/{}/json", self.base_url, path))
            .timeout(self.timeout)
            .query(&[("key", self.api_key.as_str())])
    }

    /// Best match for a free-text address.
    pub async fn geocode(&self, address: &str) -> Result<GeocodeResult, UpstreamError> {
        debug!("Google geocode: {}", address);
        let request = self.get("geocode").query(&[("address", address)]);
        let raw: RawGeocodeResponse = fetch_json(PROVIDER, request).await?;
        check_status(&raw.status, raw.error_message.as_deref(), "Geocoding")?;

        raw.results
            .into_iter()
            .next()
            .map(GeocodeResult::from)
            .ok_or_else(|| {
                UpstreamError::not_found(PROVIDER, format!("No geocoding result for '{address}'"))
            })
    }

    pub async fn reverse_geocode(
        &self,
        coords: Coordinates,
    ) -> Result<ReverseGeocodeResult, UpstreamError> {
        debug!("Google reverse geocode: {}", coords.to_query());
        let request = self.get("geocode").query(&[("latlng", coords.to_query())]);
        let raw: RawGeocodeResponse = fetch_json(PROVIDER, request).await?;
        check_status(&raw.status, raw.error_message.as_deref(), "Reverse geocoding")?;

        let first = raw
            .results
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::not_found(PROVIDER, "No reverse geocoding result"))?;
        Ok(ReverseGeocodeResult {
            formatted_address: first.formatted_address,
            place_id: first.place_id,
            location_type: first.geometry.location_type,
            address_components: first.address_components,
        })
    }

    /// Timezone at a point; `timestamp` (Unix seconds) defaults to now.
    pub async fn timezone(
        &self,
        coords: Coordinates,
        timestamp: Option<i64>,
    ) -> Result<TimezoneInfo, UpstreamError> {
        let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let request = self.get("timezone").query(&[
            ("location", coords.to_query()),
            ("timestamp", timestamp.to_string()),
        ]);
        let raw: RawTimezoneResponse = fetch_json(PROVIDER, request).await?;
        check_status(&raw.status, raw.error_message.as_deref(), "Timezone lookup")?;

        match (raw.time_zone_id, raw.time_zone_name) {
            (Some(timezone_id), Some(timezone_name)) => Ok(TimezoneInfo {
                timezone_id,
                timezone_name,
                raw_offset: raw.raw_offset,
                dst_offset: raw.dst_offset,
            }),
            _ => Err(UpstreamError::decode(PROVIDER, "timezone response missing timeZoneId")),
        }
    }

    pub async fn distance_matrix(
        &self,
        origins: &[String],
        destinations: &[String],
        mode: &str,
    ) -> Result<DistanceMatrix, UpstreamError> {
        debug!(
            "Google distance matrix: {} origins x {} destinations ({})",
            origins.len(),
            destinations.len(),
            mode
        );
        let request = self.get("distancematrix").query(&[
            ("origins", origins.join("|")),
            ("destinations", destinations.join("|")),
            ("mode", mode.to_string()),
            ("units", "metric".to_string()),
        ]);
        let raw: RawMatrixResponse = fetch_json(PROVIDER, request).await?;
        check_status(&raw.status, raw.error_message.as_deref(), "Distance matrix")?;

        Ok(DistanceMatrix {
            origin_addresses: raw.origin_addresses,
            destination_addresses: raw.destination_addresses,
            rows: raw
                .rows
                .into_iter()
                .map(|row| row.elements.into_iter().map(DistanceElement::from).collect())
                .collect(),
        })
    }
}
